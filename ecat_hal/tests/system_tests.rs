//! End-to-end tests of `EcatSystem` on the simulated master.

use ecat_common::hal::config::{HardwareInfo, JointInfo, StatusGate, SystemConfig};
use ecat_common::hal::driver::{HalError, SystemInterface};
use ecat_common::hal::error::{CycleError, InitError, IoError, ModeSwitchError};
use ecat_common::hal::status::DriveCondition;
use ecat_common::hal::types::{CommandMode, InterfaceDescriptor, InterfaceKind, LifecyclePhase};
use ecat_hal::drivers::simulation::{SimulatedMaster, SimulationConfig};
use ecat_hal::{EcatSystem, SimulationControl};
use std::time::Duration;

const PERIOD: Duration = Duration::from_millis(1);

fn hardware_info(joints: usize) -> HardwareInfo {
    HardwareInfo {
        shared: None,
        hardware: SystemConfig {
            interface_name: "sim0".to_string(),
            hw_start_sec: 0.0,
            hw_stop_sec: 0.0,
            ..SystemConfig::default()
        },
        joints: (1..=joints)
            .map(|i| {
                JointInfo::new(
                    &format!("joint{i}"),
                    &[InterfaceKind::Velocity, InterfaceKind::Effort],
                )
            })
            .collect(),
    }
}

fn system(slaves: usize) -> (EcatSystem<SimulatedMaster>, SimulationControl) {
    let master = SimulatedMaster::with_slaves(slaves);
    let control = master.control();
    (EcatSystem::new(master), control)
}

fn command(system: &EcatSystem<SimulatedMaster>, key: &str) -> InterfaceDescriptor {
    system
        .export_command_interfaces()
        .into_iter()
        .find(|h| h.key() == key)
        .unwrap()
}

fn state(system: &EcatSystem<SimulatedMaster>, key: &str) -> f64 {
    let handle = system
        .export_state_interfaces()
        .into_iter()
        .find(|h| h.key() == key)
        .unwrap();
    system.state_value(&handle).unwrap()
}

/// Two joints, active, joint1 claimed for effort.
fn active_system() -> (EcatSystem<SimulatedMaster>, SimulationControl) {
    let (mut system, control) = system(2);
    system.on_init(&hardware_info(2)).unwrap();
    system.on_activate().unwrap();
    system
        .prepare_command_mode_switch(&["joint1/effort".to_string()], &[])
        .unwrap();
    (system, control)
}

#[test]
fn faulted_drive_aborts_cycle_without_sending_effort() {
    let (mut system, control) = system(2);

    system.on_init(&hardware_info(2)).unwrap();
    assert_eq!(system.phase(), LifecyclePhase::Inactive);

    system.on_activate().unwrap();
    assert_eq!(system.phase(), LifecyclePhase::Active);
    for joint in system.registry().iter() {
        assert_eq!(joint.state.position, 0.0);
        assert_eq!(joint.command.velocity, 0.0);
        assert_eq!(joint.command.effort, 0.0);
        assert_eq!(joint.mode, CommandMode::Undefined);
    }

    system
        .prepare_command_mode_switch(&["joint1/effort".to_string()], &[])
        .unwrap();
    assert_eq!(system.joint("joint1").unwrap().mode, CommandMode::Effort);
    assert_eq!(system.joint("joint2").unwrap().mode, CommandMode::Undefined);

    control.set_all_status_words(0x0237);
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 12.0).unwrap();

    let err = system.write(PERIOD).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(
        err,
        HalError::Cycle(CycleError::DriveNotOperational {
            joint: "joint1".to_string(),
            status_word: 0x0237,
            condition: DriveCondition::OperationEnabled,
        })
    );

    // the next frame still carries no torque
    assert!(system.write(PERIOD).is_err());
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);

    let diag = system.diagnostics().unwrap();
    assert_eq!(diag.cycle_count, 2);
    assert_eq!(diag.failed_cycles, 2);
    assert_eq!(diag.status_rejections, 2);
}

#[test]
fn effort_reaches_drive_on_next_frame() {
    let (mut system, control) = active_system();

    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 250.4).unwrap();

    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();

    assert_eq!(control.last_outputs(0).unwrap().target_torque, 250);
    assert_eq!(control.last_outputs(1).unwrap().target_torque, 0);
    assert_eq!(system.diagnostics().unwrap().failed_cycles, 0);
    assert_eq!(system.diagnostics().unwrap().last_wkc, 6);
}

#[test]
fn effort_is_clamped_to_torque_range() {
    let (mut system, control) = active_system();

    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 1.0e9).unwrap();
    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();

    assert_eq!(control.last_outputs(0).unwrap().target_torque, i16::MAX);
}

#[test]
fn strict_gate_admits_operation_enabled() {
    let (mut system, control) = system(1);
    let mut info = hardware_info(1);
    info.hardware.status_gate = StatusGate::OperationEnabled;

    system.on_init(&info).unwrap();
    system.on_activate().unwrap();
    system
        .prepare_command_mode_switch(&["joint1/effort".to_string()], &[])
        .unwrap();

    // SwitchedOn is not enough for the strict gate
    let err = system.write(PERIOD).unwrap_err();
    assert!(matches!(
        err,
        HalError::Cycle(CycleError::DriveNotOperational {
            condition: DriveCondition::SwitchedOn,
            ..
        })
    ));

    control.set_all_status_words(0x0237);
    system.write(PERIOD).unwrap();
}

#[test]
fn fault_status_is_rejected() {
    let (mut system, control) = active_system();
    control.set_status_word(1, 0x0218);

    let err = system.write(PERIOD).unwrap_err();
    assert_eq!(
        err,
        HalError::Cycle(CycleError::DriveNotOperational {
            joint: "joint2".to_string(),
            status_word: 0x0218,
            condition: DriveCondition::Fault,
        })
    );
}

#[test]
fn working_counter_mismatch_skips_outputs() {
    let (mut system, control) = active_system();
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 40.0).unwrap();

    control.set_wkc_offset(-1);
    let err = system.write(PERIOD).unwrap_err();
    assert_eq!(
        err,
        HalError::Cycle(CycleError::WorkingCounterMismatch {
            expected: 6,
            observed: 5,
        })
    );

    control.set_wkc_offset(0);
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
    assert_eq!(system.diagnostics().unwrap().wkc_mismatches, 1);
}

#[test]
fn receive_timeout_is_recoverable() {
    let (mut system, control) = active_system();

    control.set_drop_responses(true);
    let err = system.write(PERIOD).unwrap_err();
    assert!(matches!(err, HalError::Cycle(CycleError::Io(IoError::Timeout { .. }))));
    assert!(err.is_recoverable());

    control.set_drop_responses(false);
    system.write(PERIOD).unwrap();

    let diag = system.diagnostics().unwrap();
    assert_eq!(diag.timeouts, 1);
    assert_eq!(diag.failed_cycles, 1);
    assert_eq!(diag.cycle_count, 2);
}

#[test]
fn velocity_joint_sends_zero_torque() {
    let (mut system, control) = system(1);
    system.on_init(&hardware_info(1)).unwrap();
    system.on_activate().unwrap();
    system
        .prepare_command_mode_switch(&["joint1/velocity".to_string()], &[])
        .unwrap();

    let velocity = command(&system, "joint1/velocity");
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&velocity, 3.0).unwrap();
    system.set_command_value(&effort, 100.0).unwrap();

    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
}

#[test]
fn stopping_a_joint_releases_torque() {
    let (mut system, control) = active_system();
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 80.0).unwrap();
    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 80);

    system
        .prepare_command_mode_switch(&[], &["joint1/effort".to_string()])
        .unwrap();
    assert_eq!(system.joint("joint1").unwrap().command.effort, 0.0);

    // the very next frame already carries zero torque
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
}

#[test]
fn faulted_cycles_release_torque_until_recovery() {
    let (mut system, control) = system(1);
    let mut info = hardware_info(1);
    info.hardware.status_gate = StatusGate::OperationEnabled;
    system.on_init(&info).unwrap();
    system.on_activate().unwrap();
    system
        .prepare_command_mode_switch(&["joint1/effort".to_string()], &[])
        .unwrap();

    control.set_all_status_words(0x0237);
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 80.0).unwrap();
    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 80);

    // the fault is only seen in the reply to a frame that was staged earlier
    control.set_status_word(0, 0x0218);
    assert!(system.write(PERIOD).is_err());
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 80);
    for _ in 0..2 {
        assert!(system.write(PERIOD).is_err());
        assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
    }
    assert_eq!(system.diagnostics().unwrap().status_rejections, 3);

    control.set_status_word(0, 0x0237);
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 80);
}

#[test]
fn aborted_exchange_releases_torque() {
    let (mut system, control) = active_system();
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 40.0).unwrap();
    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 40);

    // the failing frame itself still carries the staged torque
    control.set_wkc_offset(-1);
    assert!(system.write(PERIOD).is_err());
    control.set_drop_responses(true);
    assert!(system.write(PERIOD).is_err());
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);

    control.set_drop_responses(false);
    control.set_wkc_offset(0);
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 0);
    system.write(PERIOD).unwrap();
    assert_eq!(control.last_outputs(0).unwrap().target_torque, 40);
}

#[test]
fn mode_switch_batch_is_atomic() {
    let (mut system, _control) = active_system();

    let err = system
        .prepare_command_mode_switch(
            &["joint2/effort".to_string(), "joint1/velocity".to_string()],
            &[],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        HalError::ModeSwitch(ModeSwitchError::JointBusy { ref joint, mode: CommandMode::Effort })
            if joint == "joint1"
    ));
    assert_eq!(system.joint("joint2").unwrap().mode, CommandMode::Undefined);

    // stop first, then start, in one batch
    system
        .prepare_command_mode_switch(
            &["joint1/velocity".to_string()],
            &["joint1/effort".to_string()],
        )
        .unwrap();
    assert_eq!(system.joint("joint1").unwrap().mode, CommandMode::Velocity);
}

#[test]
fn read_updates_only_claimed_joints() {
    let (mut system, _control) = active_system();
    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 500.0).unwrap();

    for _ in 0..5 {
        system.write(PERIOD).unwrap();
        system.read(PERIOD).unwrap();
    }

    assert_eq!(state(&system, "joint1/effort"), 500.0);
    assert!(state(&system, "joint1/velocity") > 0.0);
    assert!(state(&system, "joint1/position") > 0.0);

    // joint2 is not claimed, its state stays at the activation defaults
    assert_eq!(state(&system, "joint2/position"), 0.0);
    assert_eq!(state(&system, "joint2/velocity"), 0.0);
    assert_eq!(state(&system, "joint2/effort"), 0.0);
}

#[test]
fn read_applies_joint_scaling() {
    let (mut system, _control) = system(1);
    let mut info = hardware_info(1);
    info.joints[0].scaling.effort = 0.5;

    system.on_init(&info).unwrap();
    system.on_activate().unwrap();
    system
        .prepare_command_mode_switch(&["joint1/effort".to_string()], &[])
        .unwrap();

    let effort = command(&system, "joint1/effort");
    system.set_command_value(&effort, 10.0).unwrap();
    system.write(PERIOD).unwrap();
    system.write(PERIOD).unwrap();
    system.read(PERIOD).unwrap();

    // 10 / 0.5 = 20 counts on the wire, 20 * 0.5 back
    assert_eq!(state(&system, "joint1/effort"), 10.0);
}

#[test]
fn fewer_slaves_than_joints_fails_init() {
    let (mut system, control) = system(1);

    let err = system.on_init(&hardware_info(2)).unwrap_err();
    assert_eq!(
        err,
        HalError::Init(InitError::SlaveCountMismatch {
            joints: 2,
            slaves: 1,
        })
    );
    assert_eq!(system.phase(), LifecyclePhase::Unconfigured);
    assert!(!control.is_open());
}

#[test]
fn short_mapping_fails_init() {
    let master = SimulatedMaster::new(SimulationConfig {
        slaves: 1,
        input_len: 20,
        ..SimulationConfig::default()
    });
    let control = master.control();
    let mut system = EcatSystem::new(master);

    let err = system.on_init(&hardware_info(1)).unwrap_err();
    assert!(matches!(
        err,
        HalError::Init(InitError::ProcessImageMismatch {
            slave: 0,
            direction: "input",
            mapped: 20,
            ..
        })
    ));
    assert!(!control.is_open());
}

#[test]
fn bring_up_failure_leaves_component_unconfigured() {
    let master = SimulatedMaster::new(SimulationConfig::with_slaves(0));
    let control = master.control();
    let mut system = EcatSystem::new(master);

    let err = system.on_init(&hardware_info(1)).unwrap_err();
    assert!(matches!(err, HalError::Init(InitError::NoSlavesFound { .. })));
    assert!(!err.is_recoverable());
    assert_eq!(system.phase(), LifecyclePhase::Unconfigured);
    assert!(!control.is_open());
}

#[test]
fn lifecycle_order_is_enforced() {
    let (mut system, _control) = system(1);
    system.on_init(&hardware_info(1)).unwrap();

    assert!(matches!(
        system.on_init(&hardware_info(1)),
        Err(HalError::Lifecycle { operation: "on_init", .. })
    ));
    assert!(matches!(
        system.write(PERIOD),
        Err(HalError::Lifecycle { operation: "write", .. })
    ));
    assert!(matches!(
        system.on_deactivate(),
        Err(HalError::Lifecycle { operation: "on_deactivate", .. })
    ));

    system.on_activate().unwrap();
    system.on_deactivate().unwrap();
    assert_eq!(system.phase(), LifecyclePhase::Inactive);
}

#[test]
fn reinit_after_shutdown() {
    let (mut system, control) = active_system();
    system.write(PERIOD).unwrap();

    system.on_deactivate().unwrap();
    system.on_shutdown().unwrap();
    system.on_shutdown().unwrap();
    assert_eq!(system.phase(), LifecyclePhase::Unconfigured);
    assert!(!control.is_open());
    assert_eq!(control.close_count(), 1);

    system.on_init(&hardware_info(2)).unwrap();
    system.on_activate().unwrap();
    assert!(control.is_open());
    assert_eq!(control.open_count(), 2);
    assert_eq!(system.joint("joint1").unwrap().mode, CommandMode::Undefined);
    system.write(PERIOD).unwrap();
}

#[test]
fn exported_interfaces() {
    let (system, _control) = active_system();

    let states: Vec<String> = system
        .export_state_interfaces()
        .iter()
        .map(InterfaceDescriptor::key)
        .collect();
    assert_eq!(states.len(), 8);
    assert!(states.contains(&"joint2/acceleration".to_string()));

    let commands: Vec<String> = system
        .export_command_interfaces()
        .iter()
        .map(InterfaceDescriptor::key)
        .collect();
    assert_eq!(
        commands,
        vec![
            "joint1/velocity",
            "joint1/effort",
            "joint2/velocity",
            "joint2/effort"
        ]
    );
}
