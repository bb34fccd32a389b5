//! Hardware interface trait and error types.
//!
//! This module defines:
//! - `SystemInterface` trait - Lifecycle hooks the host framework invokes
//! - `HalError` enum - Error type returned by every hook
//! - `DriverDiagnostics` struct - Cycle and link counters

use crate::hal::config::HardwareInfo;
use crate::hal::error::{CycleError, InitError, ModeSwitchError};
use crate::hal::types::{InterfaceDescriptor, LifecyclePhase};
use std::time::Duration;
use thiserror::Error;

/// Error types for hardware interface operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// Joint or fieldbus configuration rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Fieldbus bring-up failed
    #[error("Initialization failed: {0}")]
    Init(#[from] InitError),

    /// Control cycle failed (recoverable)
    #[error("Cycle failed: {0}")]
    Cycle(#[from] CycleError),

    /// Command mode batch rejected
    #[error("Mode switch rejected: {0}")]
    ModeSwitch(#[from] ModeSwitchError),

    /// Interface handle does not belong to this hardware interface
    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    /// Hook called in the wrong lifecycle phase
    #[error("Lifecycle violation: {operation} requires {required}, component is {current}")]
    Lifecycle {
        /// Hook that was called
        operation: &'static str,
        /// Phase the hook needs
        required: LifecyclePhase,
        /// Phase the component is in
        current: LifecyclePhase,
    },
}

impl HalError {
    /// True for failures the host may retry on the next cycle.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Cycle(_) | Self::ModeSwitch(_))
    }
}

/// Cycle and link diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverDiagnostics {
    /// Number of write cycles attempted
    pub cycle_count: u64,
    /// Number of cycles that returned an error
    pub failed_cycles: u64,
    /// Exchanges that timed out
    pub timeouts: u64,
    /// Exchanges with a wrong working counter
    pub wkc_mismatches: u64,
    /// Cycles refused because of the drive status
    pub status_rejections: u64,
    /// Working counter expected from the topology
    pub expected_wkc: u32,
    /// Working counter of the last exchange
    pub last_wkc: u32,
    /// Slaves the link monitor found outside OP
    pub link_lost_events: u64,
    /// Slaves the link monitor brought back
    pub link_recoveries: u64,
}

/// Trait defining the hooks the host lifecycle framework calls.
///
/// # Lifecycle
///
/// ```text
/// Unconfigured --on_init--> Inactive --on_activate--> Active
///       ^                      ^  |                     |
///       |                      |  +----on_shutdown------+--> Unconfigured
///       |                      +------on_deactivate-----+
/// ```
///
/// # Timing Contracts
///
/// | Operation | Max Duration | RT Constraint |
/// |-----------|--------------|---------------|
/// | `on_init()` | seconds (bring-up) | None (pre-RT) |
/// | `read()` | microseconds, no I/O | **HARD** |
/// | `write()` | one receive timeout | **HARD** |
/// | `on_shutdown()` | 1 second | None (post-RT) |
///
/// The host guarantees `read`/`write` are never called concurrently with
/// each other or with the other hooks.
pub trait SystemInterface: Send {
    /// Returns the interface's unique identifier (e.g., "ecat_servo").
    fn name(&self) -> &'static str;

    /// Returns the interface's semantic version.
    fn version(&self) -> &'static str;

    /// Validate the joint declarations and bring the fieldbus up.
    ///
    /// # Errors
    /// `HalError::ConfigError` before any I/O if a declaration is invalid,
    /// `HalError::Init` if bring-up fails. Both are fatal.
    fn on_init(&mut self, info: &HardwareInfo) -> Result<(), HalError>;

    /// Give every unknown state and command a defined value and release
    /// every joint's command mode.
    fn on_activate(&mut self) -> Result<(), HalError>;

    /// Stop expecting cyclic writes. The fieldbus stays open.
    fn on_deactivate(&mut self) -> Result<(), HalError>;

    /// Close the fieldbus and return to unconfigured. Safe in any phase.
    fn on_shutdown(&mut self) -> Result<(), HalError>;

    /// Handles to every joint's state interfaces.
    fn export_state_interfaces(&self) -> Vec<InterfaceDescriptor>;

    /// Handles to every joint's command interfaces.
    fn export_command_interfaces(&self) -> Vec<InterfaceDescriptor>;

    /// Validate and apply a batch of command interface starts and stops.
    ///
    /// Either the whole batch is applied or nothing changes.
    fn prepare_command_mode_switch(
        &mut self,
        start_interfaces: &[String],
        stop_interfaces: &[String],
    ) -> Result<(), HalError>;

    /// Publish the state decoded by the last exchange.
    ///
    /// # Arguments
    /// * `period` - Time since the previous read (for derived quantities)
    fn read(&mut self, period: Duration) -> Result<(), HalError>;

    /// Exchange process data and stage the commands for the next frame.
    ///
    /// # Arguments
    /// * `period` - Time since the previous write
    fn write(&mut self, period: Duration) -> Result<(), HalError>;

    /// Read a state value through an exported handle.
    fn state_value(&self, handle: &InterfaceDescriptor) -> Result<f64, HalError>;

    /// Write a command value through an exported handle.
    fn set_command_value(
        &mut self,
        handle: &InterfaceDescriptor,
        value: f64,
    ) -> Result<(), HalError>;

    /// Get cycle and link diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        None
    }
}
