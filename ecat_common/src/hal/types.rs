//! Joint, interface and network types.
//!
//! This module defines the data exchanged between the host framework and
//! the hardware interface:
//! - `InterfaceKind` / `InterfaceDescriptor` - Named state and command interfaces
//! - `CommandMode` - Which command channel currently governs a joint
//! - `JointState` / `JointCommand` - Per-joint values with a NaN "unknown" sentinel
//! - `NetworkState` - EtherCAT application-layer states
//! - `LifecyclePhase` - Managed-component lifecycle phases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between joint name and interface name in interface keys.
pub const INTERFACE_SEPARATOR: char = '/';

/// Physical quantity exposed by a state or command interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Joint position [rad or m]
    Position,
    /// Joint velocity [rad/s or m/s]
    Velocity,
    /// Joint acceleration [rad/s² or m/s²]
    Acceleration,
    /// Joint effort [Nm or N]
    Effort,
}

impl InterfaceKind {
    /// Interfaces a joint may export as state.
    pub const STATE: [InterfaceKind; 4] = [
        InterfaceKind::Position,
        InterfaceKind::Velocity,
        InterfaceKind::Acceleration,
        InterfaceKind::Effort,
    ];

    /// Interfaces a joint may accept as command.
    pub const COMMAND: [InterfaceKind; 2] = [InterfaceKind::Velocity, InterfaceKind::Effort];

    /// Interface name as used in interface keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Velocity => "velocity",
            Self::Acceleration => "acceleration",
            Self::Effort => "effort",
        }
    }

    /// True if the interface can be claimed as a command channel.
    pub const fn is_command(self) -> bool {
        matches!(self, Self::Velocity | Self::Effort)
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" => Ok(Self::Position),
            "velocity" => Ok(Self::Velocity),
            "acceleration" => Ok(Self::Acceleration),
            "effort" => Ok(Self::Effort),
            other => Err(format!("unknown interface '{other}'")),
        }
    }
}

/// Split an interface key (`"<joint>/<interface>"`) into its parts.
///
/// The split happens at the last separator so joint names may themselves
/// contain `/` (namespaced joints).
pub fn split_interface_key(key: &str) -> Option<(&str, InterfaceKind)> {
    let (joint, kind) = key.rsplit_once(INTERFACE_SEPARATOR)?;
    if joint.is_empty() {
        return None;
    }
    kind.parse().ok().map(|kind| (joint, kind))
}

/// Command channel currently live on a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CommandMode {
    /// No controller owns the joint
    #[default]
    Undefined = 0,
    /// Velocity command is authoritative
    Velocity = 1,
    /// Effort (torque) command is authoritative
    Effort = 2,
}

impl CommandMode {
    /// Mode claimed by starting the given command interface.
    pub const fn from_interface(kind: InterfaceKind) -> Option<Self> {
        match kind {
            InterfaceKind::Velocity => Some(Self::Velocity),
            InterfaceKind::Effort => Some(Self::Effort),
            InterfaceKind::Position | InterfaceKind::Acceleration => None,
        }
    }
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::Velocity => "velocity",
            Self::Effort => "effort",
        };
        f.write_str(name)
    }
}

/// Measured joint state. `NaN` marks a value not yet known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointState {
    /// Position [rad or m]
    pub position: f64,
    /// Velocity [rad/s or m/s]
    pub velocity: f64,
    /// Acceleration [rad/s² or m/s²]
    pub acceleration: f64,
    /// Effort [Nm or N]
    pub effort: f64,
}

impl JointState {
    /// All fields unknown.
    pub const UNKNOWN: Self = Self {
        position: f64::NAN,
        velocity: f64::NAN,
        acceleration: f64::NAN,
        effort: f64::NAN,
    };

    /// True if no field holds the unknown sentinel.
    pub fn is_defined(&self) -> bool {
        !(self.position.is_nan()
            || self.velocity.is_nan()
            || self.acceleration.is_nan()
            || self.effort.is_nan())
    }

    /// Replace every unknown field with zero, keeping defined values.
    pub fn fill_unknown(&mut self) {
        for value in [
            &mut self.position,
            &mut self.velocity,
            &mut self.acceleration,
            &mut self.effort,
        ] {
            if value.is_nan() {
                *value = 0.0;
            }
        }
    }

    /// Read the field exposed by a state interface.
    pub const fn get(&self, kind: InterfaceKind) -> f64 {
        match kind {
            InterfaceKind::Position => self.position,
            InterfaceKind::Velocity => self.velocity,
            InterfaceKind::Acceleration => self.acceleration,
            InterfaceKind::Effort => self.effort,
        }
    }
}

impl Default for JointState {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Commanded joint values. `NaN` marks a command never set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCommand {
    /// Velocity setpoint [rad/s or m/s]
    pub velocity: f64,
    /// Effort setpoint [Nm or N]
    pub effort: f64,
}

impl JointCommand {
    /// Both setpoints unknown.
    pub const UNKNOWN: Self = Self {
        velocity: f64::NAN,
        effort: f64::NAN,
    };

    /// Both setpoints zero.
    pub const ZERO: Self = Self {
        velocity: 0.0,
        effort: 0.0,
    };

    /// True if no field holds the unknown sentinel.
    pub fn is_defined(&self) -> bool {
        !(self.velocity.is_nan() || self.effort.is_nan())
    }

    /// Replace every unknown field with zero, keeping defined values.
    pub fn fill_unknown(&mut self) {
        if self.velocity.is_nan() {
            self.velocity = 0.0;
        }
        if self.effort.is_nan() {
            self.effort = 0.0;
        }
    }

    /// Read the setpoint behind a command interface.
    ///
    /// Returns `None` for interfaces that are never commanded.
    pub const fn get(&self, kind: InterfaceKind) -> Option<f64> {
        match kind {
            InterfaceKind::Velocity => Some(self.velocity),
            InterfaceKind::Effort => Some(self.effort),
            InterfaceKind::Position | InterfaceKind::Acceleration => None,
        }
    }
}

impl Default for JointCommand {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Exported handle to one joint interface.
///
/// The host framework receives these from `export_state_interfaces` /
/// `export_command_interfaces` and passes them back to read states or
/// write commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor {
    /// Joint name
    pub joint: String,
    /// Joint index inside the hardware interface
    pub index: usize,
    /// Exposed quantity
    pub kind: InterfaceKind,
}

impl InterfaceDescriptor {
    /// Full interface key, `"<joint>/<interface>"`.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.joint, INTERFACE_SEPARATOR, self.kind)
    }
}

impl fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.joint, INTERFACE_SEPARATOR, self.kind)
    }
}

/// EtherCAT application-layer state (ETG.1000.6 AL status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum NetworkState {
    /// No valid state read
    #[default]
    None = 0x00,
    /// INIT
    Init = 0x01,
    /// PRE-OPERATIONAL
    PreOperational = 0x02,
    /// BOOTSTRAP
    Boot = 0x03,
    /// SAFE-OPERATIONAL
    SafeOperational = 0x04,
    /// OPERATIONAL
    Operational = 0x08,
}

impl NetworkState {
    /// Error indication bit carried next to the state in AL status.
    pub const ERROR_FLAG: u16 = 0x10;

    /// Decode an AL status value, ignoring the error indication bit.
    pub const fn from_raw(raw: u16) -> Self {
        match raw & !Self::ERROR_FLAG {
            0x01 => Self::Init,
            0x02 => Self::PreOperational,
            0x03 => Self::Boot,
            0x04 => Self::SafeOperational,
            0x08 => Self::Operational,
            _ => Self::None,
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Init => "INIT",
            Self::PreOperational => "PRE-OP",
            Self::Boot => "BOOT",
            Self::SafeOperational => "SAFE-OP",
            Self::Operational => "OP",
        };
        f.write_str(name)
    }
}

/// Managed-component lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// Created, not yet initialized
    #[default]
    Unconfigured,
    /// Initialized, fieldbus operational, no cyclic writes expected
    Inactive,
    /// Cyclic read/write running
    Active,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Inactive => "inactive",
            Self::Active => "active",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_state_default_is_unknown() {
        let state = JointState::default();
        assert!(state.position.is_nan());
        assert!(state.velocity.is_nan());
        assert!(state.acceleration.is_nan());
        assert!(state.effort.is_nan());
        assert!(!state.is_defined());
    }

    #[test]
    fn test_fill_unknown_keeps_defined_values() {
        let mut state = JointState {
            position: 1.5,
            ..JointState::UNKNOWN
        };
        state.fill_unknown();
        assert!(state.is_defined());
        assert_eq!(state.position, 1.5);
        assert_eq!(state.velocity, 0.0);

        let mut cmd = JointCommand {
            velocity: f64::NAN,
            effort: -2.0,
        };
        cmd.fill_unknown();
        assert_eq!(cmd, JointCommand { velocity: 0.0, effort: -2.0 });
    }

    #[test]
    fn test_split_interface_key() {
        assert_eq!(
            split_interface_key("joint1/effort"),
            Some(("joint1", InterfaceKind::Effort))
        );
        assert_eq!(
            split_interface_key("arm/joint2/velocity"),
            Some(("arm/joint2", InterfaceKind::Velocity))
        );
        assert_eq!(split_interface_key("joint1"), None);
        assert_eq!(split_interface_key("/effort"), None);
        assert_eq!(split_interface_key("joint1/torque"), None);
    }

    #[test]
    fn test_command_mode_from_interface() {
        assert_eq!(
            CommandMode::from_interface(InterfaceKind::Effort),
            Some(CommandMode::Effort)
        );
        assert_eq!(
            CommandMode::from_interface(InterfaceKind::Velocity),
            Some(CommandMode::Velocity)
        );
        assert_eq!(CommandMode::from_interface(InterfaceKind::Position), None);
        assert_eq!(CommandMode::default(), CommandMode::Undefined);
    }

    #[test]
    fn test_network_state_ignores_error_flag() {
        assert_eq!(NetworkState::from_raw(0x08), NetworkState::Operational);
        assert_eq!(NetworkState::from_raw(0x14), NetworkState::SafeOperational);
        assert_eq!(NetworkState::from_raw(0x07), NetworkState::None);
        assert_eq!(NetworkState::SafeOperational.to_string(), "SAFE-OP");
    }

    #[test]
    fn test_descriptor_key() {
        let desc = InterfaceDescriptor {
            joint: "joint1".to_string(),
            index: 0,
            kind: InterfaceKind::Acceleration,
        };
        assert_eq!(desc.key(), "joint1/acceleration");
        assert_eq!(desc.to_string(), desc.key());
    }
}
