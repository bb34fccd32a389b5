//! Simulation master stack.
//!
//! Software stand-in for the EtherCAT master library, used for development
//! without hardware and by the test suite.

mod drive;
mod master;

pub use drive::{SimulatedDrive, DEFAULT_STATUS_WORD};
pub use master::{SimulatedMaster, SimulationConfig, SimulationControl};
