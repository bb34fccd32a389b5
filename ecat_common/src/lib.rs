//! ECAT Common Library
//!
//! This crate provides the shared vocabulary of the EtherCAT hardware
//! interface: joint and interface types, the lifecycle trait the host
//! framework drives, the error taxonomy, configuration loading and the
//! CiA-402 status word decoder.
//!
//! # Module Structure
//!
//! - [`hal`] - Hardware interface types, errors, configuration and status decoding
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecat_common::hal::status::{interpret, DriveCondition};
//!
//! assert_eq!(interpret(0x0250), DriveCondition::SwitchOnDisabled);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
