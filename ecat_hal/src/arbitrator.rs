//! Command mode arbitration.
//!
//! Each joint is governed by at most one command channel. A mode switch
//! request is a batch of interface keys to start and to stop; the batch is
//! validated as a whole on a scratch copy of the modes (stops first, then
//! starts) and only committed if every start is legal.
//!
//! ```text
//!              start velocity
//!   Undefined ───────────────► Velocity
//!       ▲  │                       │
//!       │  │ start effort          │ stop
//!       │  ▼                       │
//!       │ Effort ──────────────────┤
//!       │           stop           │
//!       └──────────────────────────┘
//! ```

use crate::registry::JointRegistry;
use ecat_common::hal::error::ModeSwitchError;
use ecat_common::hal::types::{CommandMode, JointCommand};
use tracing::debug;

/// Event applied to one joint's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// Claim the joint for a command channel.
    Start(CommandMode),
    /// Release the joint.
    Stop,
}

/// Per-joint transition function.
///
/// Returns the next mode, or `None` when a start hits a joint that is
/// already claimed.
pub const fn transition(current: CommandMode, event: ModeEvent) -> Option<CommandMode> {
    match (current, event) {
        (_, ModeEvent::Stop) => Some(CommandMode::Undefined),
        (CommandMode::Undefined, ModeEvent::Start(mode)) => Some(mode),
        (_, ModeEvent::Start(_)) => None,
    }
}

/// Validated batch, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeSwitchPlan {
    stops: Vec<usize>,
    starts: Vec<(usize, CommandMode)>,
}

impl ModeSwitchPlan {
    /// Joints released by the batch.
    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    /// Joints claimed by the batch, with their new mode.
    pub fn starts(&self) -> &[(usize, CommandMode)] {
        &self.starts
    }
}

/// Validate a batch against the registry without changing it.
pub fn plan(
    registry: &JointRegistry,
    start_interfaces: &[String],
    stop_interfaces: &[String],
) -> Result<ModeSwitchPlan, ModeSwitchError> {
    let mut scratch = registry.modes();
    let mut plan = ModeSwitchPlan::default();

    for key in stop_interfaces {
        let (index, _) = registry
            .resolve_command(key)
            .ok_or_else(|| ModeSwitchError::UnknownInterface(key.clone()))?;
        scratch[index] = CommandMode::Undefined;
        if !plan.stops.contains(&index) {
            plan.stops.push(index);
        }
    }

    for key in start_interfaces {
        let (index, kind) = registry
            .resolve_command(key)
            .ok_or_else(|| ModeSwitchError::UnknownInterface(key.clone()))?;
        let Some(mode) = CommandMode::from_interface(kind) else {
            return Err(ModeSwitchError::UnknownInterface(key.clone()));
        };
        let joint_name = || {
            registry
                .get(index)
                .map(|j| j.name.clone())
                .unwrap_or_default()
        };

        if plan.starts.iter().any(|(i, _)| *i == index) {
            return Err(ModeSwitchError::DuplicateStart { joint: joint_name() });
        }

        match transition(scratch[index], ModeEvent::Start(mode)) {
            Some(next) => {
                scratch[index] = next;
                plan.starts.push((index, next));
            }
            None => {
                return Err(ModeSwitchError::JointBusy {
                    joint: joint_name(),
                    mode: scratch[index],
                });
            }
        }
    }

    Ok(plan)
}

/// Apply a validated batch.
///
/// A stopped joint gets both commands zeroed. A started joint keeps its
/// active command and gets the other one zeroed.
pub fn commit(registry: &mut JointRegistry, plan: &ModeSwitchPlan) {
    for &index in &plan.stops {
        if let Some(joint) = registry.get_mut(index) {
            joint.mode = CommandMode::Undefined;
            joint.command = JointCommand::ZERO;
            debug!("Joint '{}' released", joint.name);
        }
    }

    for &(index, mode) in &plan.starts {
        if let Some(joint) = registry.get_mut(index) {
            joint.mode = mode;
            match mode {
                CommandMode::Velocity => joint.command.effort = 0.0,
                CommandMode::Effort => joint.command.velocity = 0.0,
                CommandMode::Undefined => {}
            }
            debug!("Joint '{}' claimed in {} mode", joint.name, mode);
        }
    }
}

/// Validate and apply a batch. Nothing changes on error.
pub fn switch_modes(
    registry: &mut JointRegistry,
    start_interfaces: &[String],
    stop_interfaces: &[String],
) -> Result<(), ModeSwitchError> {
    let plan = plan(registry, start_interfaces, stop_interfaces)?;
    commit(registry, &plan);
    Ok(())
}
