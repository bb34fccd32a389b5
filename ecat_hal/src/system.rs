//! EtherCAT servo hardware interface.
//!
//! [`EcatSystem`] implements [`SystemInterface`] on top of a
//! [`FieldbusSession`]. Joint `i` is driven by slave `i`.
//!
//! # Cycle
//!
//! ```text
//! read()  : last decoded feedback ─► joint states (no I/O)
//! write() : exchange ─► WKC check ─► decode feedback ─► status gate
//!                                                   ─► stage effort setpoints
//! ```
//!
//! Setpoints staged by `write()` go out with the next exchange. Any check
//! that fails aborts the cycle before a single setpoint is staged.
//!
//! The host serialises every hook, so the registry is accessed without
//! locking; only the network is shared (with the link monitor).

use crate::arbitrator;
use crate::master::MasterStack;
use crate::pdo::{effort_to_torque, DriveInputs, DriveOutputs};
use crate::registry::{Joint, JointRegistry};
use crate::session::{FieldbusSession, SessionSettings};
use ecat_common::hal::config::{HardwareInfo, SystemConfig};
use ecat_common::hal::driver::{DriverDiagnostics, HalError, SystemInterface};
use ecat_common::hal::error::{CycleError, InitError, IoError};
use ecat_common::hal::status::interpret;
use ecat_common::hal::types::{CommandMode, InterfaceDescriptor, LifecyclePhase};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Hardware interface for a chain of CiA-402 servo drives.
pub struct EcatSystem<M: MasterStack> {
    session: FieldbusSession<M>,
    hardware: SystemConfig,
    registry: JointRegistry,
    phase: LifecyclePhase,
    /// Feedback decoded by the last successful exchange, per joint
    feedback: Vec<Option<DriveInputs>>,
    velocity_warned: Vec<bool>,
    diagnostics: DriverDiagnostics,
}

impl<M: MasterStack> EcatSystem<M> {
    /// Create an unconfigured interface around a master stack.
    pub fn new(master: M) -> Self {
        Self {
            session: FieldbusSession::new(master),
            hardware: SystemConfig::default(),
            registry: JointRegistry::default(),
            phase: LifecyclePhase::Unconfigured,
            feedback: Vec::new(),
            velocity_warned: Vec::new(),
            diagnostics: DriverDiagnostics::default(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Read access to the joints.
    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    /// Joint by name.
    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.registry.find(name)
    }

    /// The fieldbus session.
    pub fn session(&self) -> &FieldbusSession<M> {
        &self.session
    }

    fn require(&self, operation: &'static str, allowed: &[LifecyclePhase]) -> Result<(), HalError> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(HalError::Lifecycle {
            operation,
            required: allowed[0],
            current: self.phase,
        })
    }

    /// Slave count and per-slave mapping must fit the declared joints.
    fn check_topology(&self) -> Result<(), InitError> {
        let handle = self.session.handle();
        let net = handle.lock();

        if net.slave_count() < self.registry.len() {
            return Err(InitError::SlaveCountMismatch {
                joints: self.registry.len(),
                slaves: net.slave_count(),
            });
        }

        for slave in 0..self.registry.len() {
            let map = net.layout().slaves.get(slave).copied().unwrap_or_default();
            if map.input_len < DriveInputs::SIZE {
                return Err(InitError::ProcessImageMismatch {
                    slave,
                    direction: "input",
                    mapped: map.input_len,
                    required: DriveInputs::SIZE,
                });
            }
            if map.output_len < DriveOutputs::SIZE {
                return Err(InitError::ProcessImageMismatch {
                    slave,
                    direction: "output",
                    mapped: map.output_len,
                    required: DriveOutputs::SIZE,
                });
            }
        }
        Ok(())
    }

    fn grace_period(seconds: f64, what: &str) {
        if seconds > 0.0 {
            info!("{}, please wait {:.1}s", what, seconds);
            std::thread::sleep(Duration::from_secs_f64(seconds));
        }
    }

    fn write_cycle(&mut self) -> Result<(), CycleError> {
        let wkc = self.session.exchange().inspect_err(|e| {
            if matches!(e, IoError::Timeout { .. }) {
                self.diagnostics.timeouts += 1;
            }
        })?;

        self.diagnostics.last_wkc = wkc;
        let expected = self.diagnostics.expected_wkc;
        if wkc != expected {
            self.diagnostics.wkc_mismatches += 1;
            return Err(CycleError::WorkingCounterMismatch {
                expected,
                observed: wkc,
            });
        }

        let handle = self.session.handle();
        let mut net = handle.lock();

        for (slave, joint) in self.registry.iter().enumerate() {
            let bytes = net
                .slave_inputs(slave)
                .ok_or_else(|| CycleError::ProcessImage(format!("slave {slave} has no inputs")))?;
            let inputs = DriveInputs::decode(bytes)
                .map_err(|e| CycleError::ProcessImage(format!("slave {slave}: {e}")))?;
            trace!(
                "Joint '{}': status=0x{:04X} mode={} position={} velocity={} torque={} demand={}",
                joint.name,
                inputs.status_word,
                inputs.op_mode_display,
                inputs.position_value,
                inputs.velocity_value,
                inputs.torque_value,
                inputs.torque_demand
            );
            self.feedback[slave] = Some(inputs);
        }

        for (slave, joint) in self.registry.iter().enumerate() {
            let Some(inputs) = self.feedback[slave] else {
                continue;
            };
            let condition = interpret(inputs.status_word);
            if !self.hardware.admits(inputs.status_word, condition) {
                self.diagnostics.status_rejections += 1;
                return Err(CycleError::DriveNotOperational {
                    joint: joint.name.clone(),
                    status_word: inputs.status_word,
                    condition,
                });
            }
        }

        for (slave, joint) in self.registry.iter().enumerate() {
            let torque = match joint.mode {
                CommandMode::Effort => effort_to_torque(joint.command.effort, joint.scaling.effort),
                CommandMode::Velocity => {
                    // no velocity output in the drive mapping
                    if !self.velocity_warned[slave] {
                        self.velocity_warned[slave] = true;
                        warn!(
                            "Joint '{}' is in velocity mode, velocity setpoints are not sent to the drive",
                            joint.name
                        );
                    }
                    0
                }
                CommandMode::Undefined => 0,
            };

            let bytes = net
                .slave_outputs_mut(slave)
                .ok_or_else(|| CycleError::ProcessImage(format!("slave {slave} has no outputs")))?;
            DriveOutputs::write_target_torque(bytes, torque)
                .map_err(|e| CycleError::ProcessImage(format!("slave {slave}: {e}")))?;
        }

        Ok(())
    }

    /// Stage zero target torque for every joint `released` selects.
    fn release_torque(&self, released: impl Fn(&Joint) -> bool) {
        let handle = self.session.handle();
        let mut net = handle.lock();
        for (slave, joint) in self.registry.iter().enumerate() {
            if !released(joint) {
                continue;
            }
            let Some(bytes) = net.slave_outputs_mut(slave) else {
                continue;
            };
            if let Err(e) = DriveOutputs::write_target_torque(bytes, 0) {
                warn!("Cannot release torque of joint '{}': {}", joint.name, e);
            }
        }
    }

    fn report_failure(&self, err: &CycleError) {
        let failures = self.diagnostics.failed_cycles;
        if failures <= 10 || failures % 1000 == 0 {
            warn!(
                "Cycle {} failed (#{} so far): {}",
                self.diagnostics.cycle_count, failures, err
            );
        }
    }
}

impl<M: MasterStack> SystemInterface for EcatSystem<M> {
    fn name(&self) -> &'static str {
        "ecat_servo"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn on_init(&mut self, info: &HardwareInfo) -> Result<(), HalError> {
        self.require("on_init", &[LifecyclePhase::Unconfigured])?;

        info.validate()?;
        self.registry = JointRegistry::new(&info.joints);
        self.hardware = info.hardware.clone();
        self.feedback = vec![None; self.registry.len()];
        self.velocity_warned = vec![false; self.registry.len()];
        self.diagnostics = DriverDiagnostics::default();

        info!(
            "Initializing {} joints on '{}'",
            self.registry.len(),
            self.hardware.interface_name
        );

        self.session.configure(SessionSettings::from(&self.hardware));
        let handle = self
            .session
            .bring_up(&self.hardware.interface_name)
            .inspect_err(|e| error!("Fieldbus bring-up failed: {}", e))?;

        if let Err(e) = self.check_topology() {
            error!("Fieldbus topology rejected: {}", e);
            self.session.teardown();
            return Err(e.into());
        }

        self.diagnostics.expected_wkc = handle.expected_wkc();
        if self.hardware.blocks_operation_enabled() {
            warn!(
                "Status gate blocks drives in operation enabled (mask 0x{:04X}, pattern 0x{:04X}); \
                 effort is only staged while drives are not enabled",
                self.hardware.status_mask, self.hardware.status_pattern
            );
        }
        self.phase = LifecyclePhase::Inactive;
        info!("Hardware interface initialized");
        Ok(())
    }

    fn on_activate(&mut self) -> Result<(), HalError> {
        self.require(
            "on_activate",
            &[LifecyclePhase::Inactive, LifecyclePhase::Active],
        )?;
        Self::grace_period(self.hardware.hw_start_sec, "Activating hardware interface");

        self.registry.activate_defaults();
        self.velocity_warned.fill(false);
        self.phase = LifecyclePhase::Active;
        info!("Hardware interface active");
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<(), HalError> {
        self.require("on_deactivate", &[LifecyclePhase::Active])?;
        Self::grace_period(self.hardware.hw_stop_sec, "Deactivating hardware interface");

        self.phase = LifecyclePhase::Inactive;
        info!("Hardware interface inactive");
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<(), HalError> {
        self.session.teardown();
        self.feedback.iter_mut().for_each(|f| *f = None);
        if self.phase != LifecyclePhase::Unconfigured {
            info!(
                "Hardware interface shut down after {} cycles ({} failed)",
                self.diagnostics.cycle_count, self.diagnostics.failed_cycles
            );
        }
        self.phase = LifecyclePhase::Unconfigured;
        Ok(())
    }

    fn export_state_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.registry.state_interfaces()
    }

    fn export_command_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.registry.command_interfaces()
    }

    fn prepare_command_mode_switch(
        &mut self,
        start_interfaces: &[String],
        stop_interfaces: &[String],
    ) -> Result<(), HalError> {
        self.require(
            "prepare_command_mode_switch",
            &[LifecyclePhase::Inactive, LifecyclePhase::Active],
        )?;

        arbitrator::switch_modes(&mut self.registry, start_interfaces, stop_interfaces)
            .inspect_err(|e| warn!("Mode switch rejected: {}", e))?;
        // a stopped joint must not keep its last staged torque
        self.release_torque(|joint| joint.mode != CommandMode::Effort);
        debug!(
            "Mode switch applied: start={:?} stop={:?}",
            start_interfaces, stop_interfaces
        );
        Ok(())
    }

    fn read(&mut self, period: Duration) -> Result<(), HalError> {
        self.require("read", &[LifecyclePhase::Active, LifecyclePhase::Inactive])?;

        let dt = period.as_secs_f64();
        for (joint, feedback) in self.registry.iter_mut().zip(&self.feedback) {
            if joint.mode == CommandMode::Undefined {
                continue;
            }
            let Some(inputs) = feedback else {
                continue;
            };

            let velocity = f64::from(inputs.velocity_value) * joint.scaling.velocity;
            joint.state.acceleration = if dt > 0.0 && joint.state.velocity.is_finite() {
                (velocity - joint.state.velocity) / dt
            } else {
                0.0
            };
            joint.state.position = f64::from(inputs.position_value) * joint.scaling.position;
            joint.state.velocity = velocity;
            joint.state.effort = f64::from(inputs.torque_value) * joint.scaling.effort;
        }
        Ok(())
    }

    fn write(&mut self, _period: Duration) -> Result<(), HalError> {
        self.require("write", &[LifecyclePhase::Active])?;

        self.diagnostics.cycle_count += 1;
        match self.write_cycle() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release_torque(|_| true);
                self.diagnostics.failed_cycles += 1;
                self.report_failure(&e);
                Err(e.into())
            }
        }
    }

    fn state_value(&self, handle: &InterfaceDescriptor) -> Result<f64, HalError> {
        self.registry.state_value(handle)
    }

    fn set_command_value(
        &mut self,
        handle: &InterfaceDescriptor,
        value: f64,
    ) -> Result<(), HalError> {
        self.registry.set_command(handle, value)
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        let link = self.session.link_status();
        Some(DriverDiagnostics {
            link_lost_events: link.lost_events(),
            link_recoveries: link.recoveries(),
            ..self.diagnostics.clone()
        })
    }
}
