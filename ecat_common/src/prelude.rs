//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecat_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{load_hardware, ConfigError, ConfigLoader, SharedConfig};
pub use crate::hal::config::{HardwareInfo, JointInfo, JointScaling, StatusGate, SystemConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CYCLE_TIME_US, MAX_JOINTS};

// ─── Hardware Interface ─────────────────────────────────────────────
pub use crate::hal::driver::{DriverDiagnostics, HalError, SystemInterface};
pub use crate::hal::error::{CycleError, InitError, IoError, ModeSwitchError};
pub use crate::hal::status::{interpret, DriveCondition, StatusWord};
pub use crate::hal::types::{
    CommandMode, InterfaceDescriptor, InterfaceKind, JointCommand, JointState, LifecyclePhase,
    NetworkState,
};

/// Default control cycle as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(CYCLE_TIME_US);
