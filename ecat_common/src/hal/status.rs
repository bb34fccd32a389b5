//! CiA-402 status word decoding.
//!
//! Every drive reports a 16-bit status word (object 0x6041) each cycle.
//! [`interpret`] classifies it into a [`DriveCondition`] using the state
//! masks of the CiA-402 power state machine. Patterns that match no state
//! are reported as [`DriveCondition::Fault`] so that no command is ever
//! applied to a drive whose state cannot be identified.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Status word bits (CiA-402, object 0x6041).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        /// Ready to switch on.
        const READY_TO_SWITCH_ON   = 0x0001;
        /// Switched on.
        const SWITCHED_ON          = 0x0002;
        /// Operation enabled.
        const OPERATION_ENABLED    = 0x0004;
        /// Fault.
        const FAULT                = 0x0008;
        /// Voltage enabled.
        const VOLTAGE_ENABLED      = 0x0010;
        /// Quick stop (active low).
        const QUICK_STOP           = 0x0020;
        /// Switch on disabled.
        const SWITCH_ON_DISABLED   = 0x0040;
        /// Warning.
        const WARNING              = 0x0080;
        /// Remote (controlword processed).
        const REMOTE               = 0x0200;
        /// Target reached.
        const TARGET_REACHED       = 0x0400;
        /// Internal limit active.
        const INTERNAL_LIMIT       = 0x0800;

        const _ = !0;
    }
}

impl StatusWord {
    /// Bits that identify states without a quick-stop distinction.
    pub const STATE_MASK_SHORT: u16 = 0x004F;
    /// Bits that identify states including the quick-stop bit.
    pub const STATE_MASK_LONG: u16 = 0x006F;
    /// Minimal status word of a drive in operation enabled.
    pub const OPERATION_ENABLED_WORD: u16 = 0x0027;
}

/// Operating condition decoded from a status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveCondition {
    /// Drive electronics initialising.
    NotReady,
    /// Power stage locked, waiting for shutdown command.
    SwitchOnDisabled,
    /// Ready, power stage not yet switched on.
    ReadyToSwitchOn,
    /// Power stage on, operation not enabled.
    SwitchedOn,
    /// Drive follows setpoints.
    OperationEnabled,
    /// Drive faulted, or status word not recognised.
    Fault,
    /// Drive is reacting to a fault.
    FaultReactionActive,
    /// Quick stop ramp running.
    QuickStopActive,
}

/// Recognised patterns in evaluation order: `(mask, value, condition)`.
const STATE_PATTERNS: [(u16, u16, DriveCondition); 8] = [
    (StatusWord::STATE_MASK_SHORT, 0x0000, DriveCondition::NotReady),
    (StatusWord::STATE_MASK_SHORT, 0x0040, DriveCondition::SwitchOnDisabled),
    (StatusWord::STATE_MASK_LONG, 0x0021, DriveCondition::ReadyToSwitchOn),
    (StatusWord::STATE_MASK_LONG, 0x0023, DriveCondition::SwitchedOn),
    (StatusWord::STATE_MASK_LONG, 0x0027, DriveCondition::OperationEnabled),
    (StatusWord::STATE_MASK_LONG, 0x0007, DriveCondition::QuickStopActive),
    (StatusWord::STATE_MASK_SHORT, 0x000F, DriveCondition::FaultReactionActive),
    (StatusWord::STATE_MASK_SHORT, 0x0008, DriveCondition::Fault),
];

/// Classify a raw status word.
///
/// Total and side-effect free. Any bit pattern outside the recognised
/// state masks yields [`DriveCondition::Fault`].
pub fn interpret(status_word: u16) -> DriveCondition {
    STATE_PATTERNS
        .iter()
        .find(|(mask, value, _)| status_word & mask == *value)
        .map(|(_, _, condition)| *condition)
        .unwrap_or(DriveCondition::Fault)
}

impl DriveCondition {
    /// True only when the drive accepts setpoints.
    pub const fn is_commandable(self) -> bool {
        matches!(self, Self::OperationEnabled)
    }

    /// True for the fault branch of the state machine.
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Fault | Self::FaultReactionActive)
    }
}

impl fmt::Display for DriveCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotReady => "not ready to switch on",
            Self::SwitchOnDisabled => "switch on disabled",
            Self::ReadyToSwitchOn => "ready to switch on",
            Self::SwitchedOn => "switched on",
            Self::OperationEnabled => "operation enabled",
            Self::Fault => "fault",
            Self::FaultReactionActive => "fault reaction active",
            Self::QuickStopActive => "quick stop active",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_states() {
        assert_eq!(interpret(0x0000), DriveCondition::NotReady);
        assert_eq!(interpret(0x0250), DriveCondition::SwitchOnDisabled);
        assert_eq!(interpret(0x0231), DriveCondition::ReadyToSwitchOn);
        assert_eq!(interpret(0x0233), DriveCondition::SwitchedOn);
        assert_eq!(interpret(0x0237), DriveCondition::OperationEnabled);
        assert_eq!(interpret(0x0217), DriveCondition::QuickStopActive);
        assert_eq!(interpret(0x021F), DriveCondition::FaultReactionActive);
        assert_eq!(interpret(0x0218), DriveCondition::Fault);
    }

    #[test]
    fn test_unrecognised_patterns_fail_closed() {
        // switched-on without ready-to-switch-on
        assert_eq!(interpret(0x0022), DriveCondition::Fault);
        // operation enabled together with switch-on-disabled
        assert_eq!(interpret(0x0067), DriveCondition::Fault);
        // quick stop bit alone
        assert_eq!(interpret(0x0020), DriveCondition::NotReady);
        assert_eq!(interpret(0x0024), DriveCondition::Fault);
    }

    #[test]
    fn test_interpret_is_total_and_deterministic() {
        for word in 0..=u16::MAX {
            assert_eq!(interpret(word), interpret(word));
        }
    }

    #[test]
    fn test_only_operation_enabled_is_commandable() {
        let commandable: Vec<u16> = (0..=0x007F_u16)
            .filter(|w| interpret(*w).is_commandable())
            .collect();
        assert!(!commandable.is_empty());
        assert!(commandable.iter().all(|w| w & 0x006F == 0x0027));
    }

    #[test]
    fn test_manufacturer_bits_are_ignored() {
        assert_eq!(interpret(0x8637), DriveCondition::OperationEnabled);
        assert!(StatusWord::from_bits_retain(0x0637).contains(StatusWord::TARGET_REACHED));
    }
}
