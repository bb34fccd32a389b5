//! Hardware interface vocabulary.
//!
//! This module contains the types shared between the host framework and
//! the EtherCAT hardware interface:
//! - [`types`] - Joints, interfaces, command modes and network states
//! - [`config`] - Joint declarations and fieldbus settings
//! - [`driver`] - The `SystemInterface` lifecycle trait and `HalError`
//! - [`error`] - Bring-up, per-cycle and mode-switch errors
//! - [`status`] - CiA-402 status word decoding

pub mod config;
pub mod driver;
pub mod error;
pub mod status;
pub mod types;
