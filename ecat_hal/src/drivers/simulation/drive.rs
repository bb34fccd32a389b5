//! Simulated servo drive.
//!
//! A single-inertia model driven by the target torque:
//! - torque (‰ rated) accelerates the rotor, viscous friction slows it
//! - velocity and position are reported in drive units
//! - the status word is fixed by the test or the operator, not derived
//!   from the control word

use crate::pdo::{DriveInputs, DriveOutputs};
use ecat_common::hal::types::NetworkState;
use tracing::trace;

/// Default status word reported by a simulated drive (switched on, remote).
pub const DEFAULT_STATUS_WORD: u16 = 0x0233;

/// Per-frame velocity gain [velocity units per ‰ torque].
const TORQUE_GAIN: f64 = 0.5;

/// Per-frame velocity decay.
const FRICTION: f64 = 0.02;

/// Encoder increments per velocity unit per frame.
const POSITION_GAIN: f64 = 1.0;

/// One simulated slave.
#[derive(Debug, Clone)]
pub struct SimulatedDrive {
    /// Application-layer state of the slave
    pub state: NetworkState,
    /// Status word returned in the next frame
    pub status_word: u16,
    /// Last output PDO received
    pub last_outputs: DriveOutputs,
    velocity: f64,
    position: f64,
    frames: u32,
}

impl SimulatedDrive {
    /// Drive at rest in INIT.
    pub fn new() -> Self {
        Self {
            state: NetworkState::Init,
            status_word: DEFAULT_STATUS_WORD,
            last_outputs: DriveOutputs::default(),
            velocity: 0.0,
            position: 0.0,
            frames: 0,
        }
    }

    /// Accept an output frame and advance the model by one frame.
    ///
    /// Outputs are only taken over in OP, like a real slave in SAFE-OP
    /// that keeps its outputs in the safe state.
    pub fn step(&mut self, outputs: DriveOutputs) {
        if self.state == NetworkState::Operational {
            self.last_outputs = outputs;
        }
        let torque = f64::from(self.last_outputs.target_torque);
        self.velocity += torque * TORQUE_GAIN - self.velocity * FRICTION;
        self.position += self.velocity * POSITION_GAIN;
        self.frames = self.frames.wrapping_add(1);
        trace!(
            "Simulated drive: torque={} velocity={:.2} position={:.1}",
            self.last_outputs.target_torque,
            self.velocity,
            self.position
        );
    }

    /// Input PDO for the current model state.
    pub fn inputs(&self) -> DriveInputs {
        let saturate = |v: f64| v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        DriveInputs {
            status_word: self.status_word,
            op_mode_display: self.last_outputs.op_mode,
            position_value: saturate(self.position),
            velocity_value: saturate(self.velocity),
            torque_value: self.last_outputs.target_torque,
            timestamp: self.frames.wrapping_mul(1000),
            position_demand: saturate(self.position),
            velocity_demand: saturate(self.velocity),
            torque_demand: self.last_outputs.target_torque,
            ..DriveInputs::default()
        }
    }

    /// Working counter contribution for the current state.
    ///
    /// In OP a slave reads and writes (3), in SAFE-OP it only delivers
    /// inputs (1), below that it ignores process data.
    pub fn wkc(&self) -> u32 {
        match self.state {
            NetworkState::Operational => 3,
            NetworkState::SafeOperational => 1,
            _ => 0,
        }
    }
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_ignored_outside_op() {
        let mut drive = SimulatedDrive::new();
        drive.state = NetworkState::SafeOperational;
        drive.step(DriveOutputs {
            target_torque: 100,
            ..Default::default()
        });
        assert_eq!(drive.last_outputs.target_torque, 0);
        assert_eq!(drive.inputs().velocity_value, 0);
    }

    #[test]
    fn test_torque_accelerates() {
        let mut drive = SimulatedDrive::new();
        drive.state = NetworkState::Operational;
        for _ in 0..10 {
            drive.step(DriveOutputs {
                target_torque: 100,
                ..Default::default()
            });
        }
        let inputs = drive.inputs();
        assert!(inputs.velocity_value > 0);
        assert!(inputs.position_value > 0);
        assert_eq!(inputs.torque_value, 100);
        assert_eq!(inputs.status_word, DEFAULT_STATUS_WORD);
    }

    #[test]
    fn test_wkc_contribution() {
        let mut drive = SimulatedDrive::new();
        assert_eq!(drive.wkc(), 0);
        drive.state = NetworkState::SafeOperational;
        assert_eq!(drive.wkc(), 1);
        drive.state = NetworkState::Operational;
        assert_eq!(drive.wkc(), 3);
    }
}
