//! # ECAT HAL Library
//!
//! Hardware interface for servo drives on an EtherCAT fieldbus.
//!
//! The crate brings the fieldbus to OPERATIONAL, runs the cyclic process
//! data exchange, and arbitrates which command channel (velocity or effort)
//! governs each joint. The host lifecycle framework drives it through
//! `ecat_common::hal::driver::SystemInterface`.
//!
//! # Module Structure
//!
//! - [`master`] - `MasterStack` trait, the primitive set of the master library
//! - [`session`] - Fieldbus bring-up, exchange and teardown
//! - [`monitor`] - Background link health monitor
//! - [`pdo`] - Drive process data codec
//! - [`registry`] - Joint state/command storage and interface handles
//! - [`arbitrator`] - Command mode switching
//! - [`system`] - `EcatSystem`, the `SystemInterface` implementation
//! - [`core`] - Standalone host loop
//! - [`drivers`] - Master stack implementations (simulation)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         ecat_hal                                  │
//! │  ┌────────────┐    ┌──────────────┐    ┌──────────────────────┐   │
//! │  │  HalCore   │───►│  EcatSystem  │───►│  JointRegistry       │   │
//! │  │ (host loop)│    │  (lifecycle) │    │  + arbitrator        │   │
//! │  └────────────┘    └──────┬───────┘    └──────────────────────┘   │
//! │                           │                                       │
//! │                           ▼                                       │
//! │                  ┌────────────────┐       ┌──────────────┐        │
//! │                  │ FieldbusSession│◄ ─ ─ ─│ LinkMonitor  │ (Weak) │
//! │                  └───────┬────────┘       └──────────────┘        │
//! │                          ▼                                        │
//! │                  ┌────────────────┐                               │
//! │                  │  MasterStack   │ (trait)                       │
//! │                  └────────────────┘                               │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod arbitrator;
pub mod core;
pub mod drivers;
pub mod master;
pub mod monitor;
pub mod pdo;
pub mod registry;
pub mod session;
pub mod system;

// Re-export key types for convenience
pub use crate::core::HalCore;
pub use crate::drivers::simulation::{SimulatedMaster, SimulationConfig, SimulationControl};
pub use crate::master::MasterStack;
pub use crate::session::{FieldbusSession, NetworkHandle};
pub use crate::system::EcatSystem;
