//! Joint command/state storage.
//!
//! The registry is owned by [`crate::system::EcatSystem`] and only touched
//! from the cycle thread: the host serialises `read`, `write`, mode switches
//! and handle accesses, so no locking happens here.

use ecat_common::hal::config::{JointInfo, JointScaling};
use ecat_common::hal::driver::HalError;
use ecat_common::hal::types::{
    split_interface_key, CommandMode, InterfaceDescriptor, InterfaceKind, JointCommand,
    JointState,
};

/// One joint: identity, measured state, commanded values, current mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// Joint name
    pub name: String,
    /// Drive ↔ joint unit factors
    pub scaling: JointScaling,
    /// Last published state
    pub state: JointState,
    /// Values written by controllers
    pub command: JointCommand,
    /// Channel currently governing the joint
    pub mode: CommandMode,
}

impl Joint {
    /// Joint with unknown state and command, no mode.
    pub fn new(info: &JointInfo) -> Self {
        Self {
            name: info.name.clone(),
            scaling: info.scaling,
            state: JointState::UNKNOWN,
            command: JointCommand::UNKNOWN,
            mode: CommandMode::Undefined,
        }
    }
}

/// Joints in slave order (joint `i` is driven by slave `i`).
#[derive(Debug, Clone, Default)]
pub struct JointRegistry {
    joints: Vec<Joint>,
}

impl JointRegistry {
    /// Build the registry from validated joint declarations.
    pub fn new(joints: &[JointInfo]) -> Self {
        Self {
            joints: joints.iter().map(Joint::new).collect(),
        }
    }

    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// True if no joint is registered.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Joint by index.
    pub fn get(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    /// Mutable joint by index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Joint> {
        self.joints.get_mut(index)
    }

    /// Joint by name.
    pub fn find(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Index of the named joint.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Iterate joints in slave order.
    pub fn iter(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter()
    }

    /// Mutable iteration in slave order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Joint> {
        self.joints.iter_mut()
    }

    /// Current mode of every joint.
    pub fn modes(&self) -> Vec<CommandMode> {
        self.joints.iter().map(|j| j.mode).collect()
    }

    /// Resolve `"<joint>/<interface>"` to a joint index and a command
    /// interface. Returns `None` for unknown joints and for state-only
    /// interfaces.
    pub fn resolve_command(&self, key: &str) -> Option<(usize, InterfaceKind)> {
        let (joint, kind) = split_interface_key(key)?;
        if !kind.is_command() {
            return None;
        }
        self.index_of(joint).map(|index| (index, kind))
    }

    /// State handles, four per joint.
    pub fn state_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.descriptors(&InterfaceKind::STATE)
    }

    /// Command handles, two per joint.
    pub fn command_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.descriptors(&InterfaceKind::COMMAND)
    }

    fn descriptors(&self, kinds: &[InterfaceKind]) -> Vec<InterfaceDescriptor> {
        self.joints
            .iter()
            .enumerate()
            .flat_map(|(index, joint)| {
                kinds.iter().map(move |kind| InterfaceDescriptor {
                    joint: joint.name.clone(),
                    index,
                    kind: *kind,
                })
            })
            .collect()
    }

    fn joint_for(&self, handle: &InterfaceDescriptor) -> Result<&Joint, HalError> {
        self.joints
            .get(handle.index)
            .filter(|j| j.name == handle.joint)
            .ok_or_else(|| HalError::UnknownInterface(handle.key()))
    }

    /// Read a state value through a handle.
    pub fn state_value(&self, handle: &InterfaceDescriptor) -> Result<f64, HalError> {
        Ok(self.joint_for(handle)?.state.get(handle.kind))
    }

    /// Read a command value through a handle.
    pub fn command_value(&self, handle: &InterfaceDescriptor) -> Result<f64, HalError> {
        self.joint_for(handle)?
            .command
            .get(handle.kind)
            .ok_or_else(|| HalError::UnknownInterface(handle.key()))
    }

    /// Write a command value through a handle.
    pub fn set_command(&mut self, handle: &InterfaceDescriptor, value: f64) -> Result<(), HalError> {
        self.joint_for(handle)?;
        let command = &mut self.joints[handle.index].command;
        match handle.kind {
            InterfaceKind::Velocity => command.velocity = value,
            InterfaceKind::Effort => command.effort = value,
            InterfaceKind::Position | InterfaceKind::Acceleration => {
                return Err(HalError::UnknownInterface(handle.key()));
            }
        }
        Ok(())
    }

    /// Give every unknown value a defined one and release every joint.
    ///
    /// Defined values are kept, so repeated calls change nothing.
    pub fn activate_defaults(&mut self) {
        for joint in &mut self.joints {
            joint.state.fill_unknown();
            joint.command.fill_unknown();
            joint.mode = CommandMode::Undefined;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> JointRegistry {
        JointRegistry::new(&[
            JointInfo::new("joint1", &[InterfaceKind::Effort]),
            JointInfo::new("arm/joint2", &[InterfaceKind::Velocity]),
        ])
    }

    #[test]
    fn test_new_joints_are_unknown() {
        let reg = registry();
        assert_eq!(reg.len(), 2);
        for joint in reg.iter() {
            assert!(!joint.state.is_defined());
            assert!(!joint.command.is_defined());
            assert_eq!(joint.mode, CommandMode::Undefined);
        }
    }

    #[test]
    fn test_exports_four_state_and_two_command_handles_per_joint() {
        let reg = registry();
        let state = reg.state_interfaces();
        let command = reg.command_interfaces();
        assert_eq!(state.len(), 8);
        assert_eq!(command.len(), 4);
        assert_eq!(state[0].key(), "joint1/position");
        assert_eq!(command[3].key(), "arm/joint2/effort");
        assert_eq!(command[3].index, 1);
    }

    #[test]
    fn test_resolve_command() {
        let reg = registry();
        assert_eq!(reg.resolve_command("joint1/effort"), Some((0, InterfaceKind::Effort)));
        assert_eq!(
            reg.resolve_command("arm/joint2/velocity"),
            Some((1, InterfaceKind::Velocity))
        );
        assert_eq!(reg.resolve_command("joint1/position"), None);
        assert_eq!(reg.resolve_command("joint3/effort"), None);
        assert_eq!(reg.resolve_command("joint1"), None);
        // no substring matching
        assert_eq!(reg.resolve_command("xjoint1/effort"), None);
    }

    #[test]
    fn test_activate_defaults_keeps_defined_values() {
        let mut reg = registry();
        reg.get_mut(0).unwrap().state.position = 1.5;
        reg.get_mut(0).unwrap().mode = CommandMode::Effort;
        reg.activate_defaults();

        let joint = reg.get(0).unwrap();
        assert_eq!(joint.state.position, 1.5);
        assert_eq!(joint.state.velocity, 0.0);
        assert_eq!(joint.command, JointCommand::ZERO);
        assert_eq!(joint.mode, CommandMode::Undefined);

        let snapshot = reg.get(0).unwrap().clone();
        reg.activate_defaults();
        assert_eq!(reg.get(0).unwrap(), &snapshot);
    }

    #[test]
    fn test_handles_read_and_write() {
        let mut reg = registry();
        reg.activate_defaults();
        let effort = reg.command_interfaces()[1].clone();
        reg.set_command(&effort, 3.0).unwrap();
        assert_eq!(reg.command_value(&effort).unwrap(), 3.0);

        let position = reg.state_interfaces()[0].clone();
        assert_eq!(reg.state_value(&position).unwrap(), 0.0);
        assert!(reg.set_command(&position, 1.0).is_err());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let reg = registry();
        let handle = InterfaceDescriptor {
            joint: "joint9".to_string(),
            index: 0,
            kind: InterfaceKind::Position,
        };
        assert!(matches!(
            reg.state_value(&handle),
            Err(HalError::UnknownInterface(_))
        ));
    }
}
