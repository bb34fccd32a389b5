//! Hardware interface configuration types.
//!
//! This module contains the configuration consumed by the hardware interface:
//! - `HardwareInfo` - Complete description handed over by the host
//! - `SystemConfig` - Fieldbus and timing settings (`[hardware]` table)
//! - `JointInfo` - Per-joint interface declarations (`[[joints]]` array)
//! - `StatusGate` - How drive status words gate command output
//!
//! # TOML Example
//!
//! ```toml
//! [hardware]
//! interface_name = "eno0"
//! receive_timeout_us = 2000
//!
//! [[joints]]
//! name = "joint1"
//! command_interfaces = ["effort"]
//! state_interfaces = ["position", "velocity", "effort"]
//! ```

use crate::config::SharedConfig;
use crate::consts::{
    CYCLE_TIME_US, DEFAULT_INTERFACE_NAME, DEFAULT_MONITOR_PERIOD_US,
    DEFAULT_OPERATIONAL_RETRIES, DEFAULT_RECEIVE_TIMEOUT_US, DEFAULT_SAFE_OP_TIMEOUT_US,
    DEFAULT_STATE_CHECK_TIMEOUT_US, MAX_JOINTS,
};
use crate::hal::driver::HalError;
use crate::hal::status::{interpret, DriveCondition, StatusWord};
use crate::hal::types::InterfaceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

fn default_interface_name() -> String {
    DEFAULT_INTERFACE_NAME.to_string()
}

fn default_cycle_time_us() -> u64 {
    CYCLE_TIME_US
}

fn default_grace_sec() -> f64 {
    1.0
}

fn default_receive_timeout_us() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_US
}

fn default_operational_retries() -> u32 {
    DEFAULT_OPERATIONAL_RETRIES
}

fn default_state_check_timeout_us() -> u64 {
    DEFAULT_STATE_CHECK_TIMEOUT_US
}

fn default_safe_op_timeout_us() -> u64 {
    DEFAULT_SAFE_OP_TIMEOUT_US
}

fn default_monitor_period_us() -> u64 {
    DEFAULT_MONITOR_PERIOD_US
}

fn default_status_mask() -> u16 {
    StatusWord::STATE_MASK_LONG
}

fn default_status_pattern() -> u16 {
    0x0027
}

fn default_scale() -> f64 {
    1.0
}

/// Policy deciding which drive status words block command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusGate {
    /// Block on the fault branch and on `(word & status_mask) == status_pattern`.
    #[default]
    Pattern,
    /// Block unless the drive is in operation enabled.
    OperationEnabled,
}

/// Fieldbus and timing settings, `[hardware]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Network interface the master stack opens (e.g. "eno0", "eth0").
    #[serde(default = "default_interface_name")]
    pub interface_name: String,

    /// Nominal control cycle [µs], used by the host loop.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,

    /// Informational delay before activation completes [s].
    #[serde(default = "default_grace_sec")]
    pub hw_start_sec: f64,

    /// Informational delay before deactivation completes [s].
    #[serde(default = "default_grace_sec")]
    pub hw_stop_sec: f64,

    /// Receive timeout of one process data exchange [µs].
    #[serde(default = "default_receive_timeout_us")]
    pub receive_timeout_us: u64,

    /// Exchange/state-check rounds granted to reach OPERATIONAL.
    #[serde(default = "default_operational_retries")]
    pub operational_retries: u32,

    /// Per-round OPERATIONAL state check timeout [µs].
    #[serde(default = "default_state_check_timeout_us")]
    pub state_check_timeout_us: u64,

    /// SAFE-OPERATIONAL state check timeout [µs].
    #[serde(default = "default_safe_op_timeout_us")]
    pub safe_op_timeout_us: u64,

    /// Link monitor polling period [µs].
    #[serde(default = "default_monitor_period_us")]
    pub monitor_period_us: u64,

    /// Status word gating policy.
    #[serde(default)]
    pub status_gate: StatusGate,

    /// Mask applied before comparing with `status_pattern`.
    #[serde(default = "default_status_mask")]
    pub status_mask: u16,

    /// Masked status word that blocks output under `StatusGate::Pattern`.
    #[serde(default = "default_status_pattern")]
    pub status_pattern: u16,
}

impl SystemConfig {
    /// Receive timeout as `Duration`.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_micros(self.receive_timeout_us)
    }

    /// Nominal cycle as `Duration`.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us)
    }

    /// True if a drive reporting `status_word` may receive setpoints.
    pub fn admits(&self, status_word: u16, condition: DriveCondition) -> bool {
        match self.status_gate {
            StatusGate::Pattern => {
                !condition.is_fault() && status_word & self.status_mask != self.status_pattern
            }
            StatusGate::OperationEnabled => condition.is_commandable(),
        }
    }

    /// True if a drive in operation enabled would be refused setpoints.
    pub fn blocks_operation_enabled(&self) -> bool {
        let status_word = StatusWord::OPERATION_ENABLED_WORD;
        !self.admits(status_word, interpret(status_word))
    }

    /// Validate the fieldbus settings.
    ///
    /// # Validation Rules
    /// 1. `interface_name` not empty
    /// 2. `cycle_time_us`, `receive_timeout_us`, `monitor_period_us` > 0
    /// 3. `operational_retries` > 0
    /// 4. grace periods finite and >= 0
    pub fn validate(&self) -> Result<(), HalError> {
        if self.interface_name.trim().is_empty() {
            return Err(HalError::ConfigError(
                "interface_name cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("cycle_time_us", self.cycle_time_us),
            ("receive_timeout_us", self.receive_timeout_us),
            ("monitor_period_us", self.monitor_period_us),
        ] {
            if value == 0 {
                return Err(HalError::ConfigError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.operational_retries == 0 {
            return Err(HalError::ConfigError(
                "operational_retries must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [("hw_start_sec", self.hw_start_sec), ("hw_stop_sec", self.hw_stop_sec)] {
            if !value.is_finite() || value < 0.0 {
                return Err(HalError::ConfigError(format!(
                    "{name} must be a finite value >= 0 (got {value})"
                )));
            }
        }

        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            interface_name: default_interface_name(),
            cycle_time_us: default_cycle_time_us(),
            hw_start_sec: default_grace_sec(),
            hw_stop_sec: default_grace_sec(),
            receive_timeout_us: default_receive_timeout_us(),
            operational_retries: default_operational_retries(),
            state_check_timeout_us: default_state_check_timeout_us(),
            safe_op_timeout_us: default_safe_op_timeout_us(),
            monitor_period_us: default_monitor_period_us(),
            status_gate: StatusGate::default(),
            status_mask: default_status_mask(),
            status_pattern: default_status_pattern(),
        }
    }
}

/// Conversion between drive units and joint units.
///
/// Joint value = raw drive value × scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointScaling {
    /// Joint position per encoder increment.
    #[serde(default = "default_scale")]
    pub position: f64,
    /// Joint velocity per drive velocity unit.
    #[serde(default = "default_scale")]
    pub velocity: f64,
    /// Joint effort per drive torque unit (‰ of rated torque).
    #[serde(default = "default_scale")]
    pub effort: f64,
}

impl Default for JointScaling {
    fn default() -> Self {
        Self {
            position: 1.0,
            velocity: 1.0,
            effort: 1.0,
        }
    }
}

/// Joint declaration, one `[[joints]]` entry.
///
/// Interface names are kept as strings so that an unsupported name is a
/// validation error naming the joint, not a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointInfo {
    /// Joint name (unique identifier)
    pub name: String,

    /// Declared command interfaces ("velocity", "effort")
    pub command_interfaces: Vec<String>,

    /// Declared state interfaces ("position", "velocity", "acceleration", "effort")
    #[serde(default)]
    pub state_interfaces: Vec<String>,

    /// Unit conversion factors
    #[serde(default)]
    pub scaling: JointScaling,
}

impl JointInfo {
    /// Joint with the given command interfaces and every state interface.
    pub fn new(name: &str, command_interfaces: &[InterfaceKind]) -> Self {
        Self {
            name: name.to_string(),
            command_interfaces: command_interfaces.iter().map(|k| k.to_string()).collect(),
            state_interfaces: InterfaceKind::STATE.iter().map(|k| k.to_string()).collect(),
            scaling: JointScaling::default(),
        }
    }

    /// Validate the joint declaration.
    ///
    /// # Validation Rules
    /// 1. `name` not empty and without the interface separator at the ends
    /// 2. at least one command interface, each "velocity" or "effort"
    /// 3. every state interface one of "position", "velocity", "acceleration", "effort"
    /// 4. scales finite and non-zero
    pub fn validate(&self) -> Result<(), HalError> {
        if self.name.trim().is_empty() {
            return Err(HalError::ConfigError("Joint has empty name".to_string()));
        }
        if self.name.starts_with('/') || self.name.ends_with('/') {
            return Err(HalError::ConfigError(format!(
                "Joint '{}': name must not start or end with '/'",
                self.name
            )));
        }

        if self.command_interfaces.is_empty() {
            return Err(HalError::ConfigError(format!(
                "Joint '{}' has no command interface. Expected {} or {}.",
                self.name,
                InterfaceKind::Velocity,
                InterfaceKind::Effort
            )));
        }

        for interface in &self.command_interfaces {
            let accepted = interface
                .parse::<InterfaceKind>()
                .map(InterfaceKind::is_command)
                .unwrap_or(false);
            if !accepted {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}' has {} command interface. Expected {} or {}.",
                    self.name,
                    interface,
                    InterfaceKind::Velocity,
                    InterfaceKind::Effort
                )));
            }
        }

        for interface in &self.state_interfaces {
            if interface.parse::<InterfaceKind>().is_err() {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}' has {} state interface. Expected {}, {}, {}, or {}.",
                    self.name,
                    interface,
                    InterfaceKind::Position,
                    InterfaceKind::Velocity,
                    InterfaceKind::Acceleration,
                    InterfaceKind::Effort
                )));
            }
        }

        for (name, value) in [
            ("position", self.scaling.position),
            ("velocity", self.scaling.velocity),
            ("effort", self.scaling.effort),
        ] {
            if !value.is_finite() || value == 0.0 {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}': {} scale must be finite and non-zero (got {})",
                    self.name, name, value
                )));
            }
        }

        Ok(())
    }
}

/// Everything the host hands over at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct HardwareInfo {
    /// Logging and service identity (used by the standalone binary).
    #[serde(default)]
    pub shared: Option<SharedConfig>,

    /// Fieldbus and timing settings.
    #[serde(default)]
    pub hardware: SystemConfig,

    /// Joint declarations, in slave order.
    #[serde(default)]
    pub joints: Vec<JointInfo>,
}

impl HardwareInfo {
    /// Validate the whole description.
    ///
    /// Runs every joint's validation, then checks the joint count and
    /// name uniqueness. Nothing here touches the fieldbus.
    pub fn validate(&self) -> Result<(), HalError> {
        self.hardware.validate()?;

        if self.joints.len() > MAX_JOINTS {
            return Err(HalError::ConfigError(format!(
                "Too many joints: {} (max {})",
                self.joints.len(),
                MAX_JOINTS
            )));
        }

        let mut names = HashSet::new();
        for joint in &self.joints {
            joint.validate()?;
            if !names.insert(joint.name.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Duplicate joint name: {}",
                    joint.name
                )));
            }
        }

        debug!(
            "Hardware description valid: {} joints on '{}'",
            self.joints.len(),
            self.hardware.interface_name
        );
        Ok(())
    }
}
