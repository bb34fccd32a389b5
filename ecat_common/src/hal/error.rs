//! Error types of the fieldbus path.
//!
//! - `InitError` - Network bring-up failures (fatal to initialization)
//! - `IoError` - Process data exchange failures
//! - `CycleError` - Per-cycle failures (recoverable, reported to the host)
//! - `ModeSwitchError` - Rejected command mode batches

use crate::hal::status::DriveCondition;
use crate::hal::types::{CommandMode, NetworkState};
use thiserror::Error;

/// Fieldbus bring-up failure.
///
/// Each variant names the stage that failed so the operator can tell a
/// cabling problem from a misconfigured slave.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// The network interface could not be opened.
    #[error("transport: cannot open interface '{interface}' (master stack returned {code})")]
    TransportUnavailable {
        /// Interface name
        interface: String,
        /// Return code of the master stack
        code: i32,
    },

    /// Slave discovery found nothing on the wire.
    #[error("discovery: no slaves found on '{interface}'")]
    NoSlavesFound {
        /// Interface name
        interface: String,
    },

    /// The network did not reach SAFE-OP.
    #[error("state progression: network is {observed}, expected {expected}")]
    SafeOperationalTimeout {
        /// State read back from the network
        observed: NetworkState,
        /// Requested state
        expected: NetworkState,
    },

    /// The network did not reach OP within the retry budget.
    #[error("state progression: network is {observed} after {attempts} attempts, expected {expected}")]
    OperationalTimeout {
        /// State read back from the network
        observed: NetworkState,
        /// Requested state
        expected: NetworkState,
        /// Exchange/state-check rounds spent
        attempts: u32,
    },

    /// Fewer drives were discovered than joints are declared.
    #[error("discovery: {joints} joints declared but only {slaves} slaves found")]
    SlaveCountMismatch {
        /// Declared joints
        joints: usize,
        /// Discovered slaves
        slaves: usize,
    },

    /// A slave's mapped process data is smaller than the drive layout.
    #[error("mapping: slave {slave} maps {mapped} {direction} bytes, drive layout needs {required}")]
    ProcessImageMismatch {
        /// Slave position (0-based)
        slave: usize,
        /// "input" or "output"
        direction: &'static str,
        /// Bytes mapped by the master stack
        mapped: usize,
        /// Bytes the drive layout needs
        required: usize,
    },
}

/// Process data exchange failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// No frame came back within the receive timeout.
    #[error("no process data received within {timeout_us}us")]
    Timeout {
        /// Receive timeout that elapsed [µs]
        timeout_us: u64,
    },

    /// The session has no open network.
    #[error("fieldbus session is not connected")]
    NotConnected,
}

/// Failure of a single control cycle.
///
/// None of these are fatal: the host decides whether to retry on the next
/// cycle or escalate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    /// Exchange failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Not every slave processed the frame.
    #[error("working counter mismatch: observed {observed}, expected {expected}")]
    WorkingCounterMismatch {
        /// Counter computed at bring-up
        expected: u32,
        /// Counter returned by the exchange
        observed: u32,
    },

    /// A drive reported a status that must not be commanded.
    #[error("drive of joint '{joint}' in unexpected state: {condition} (status word 0x{status_word:04X})")]
    DriveNotOperational {
        /// Joint driven by the slave
        joint: String,
        /// Raw status word
        status_word: u16,
        /// Decoded condition
        condition: DriveCondition,
    },

    /// A slave's process data could not be decoded or encoded.
    #[error("process image: {0}")]
    ProcessImage(String),
}

/// Rejected command mode switch. No joint changes when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeSwitchError {
    /// Interface key does not name a joint command interface.
    #[error("unknown command interface '{0}'")]
    UnknownInterface(String),

    /// The joint is still claimed by another mode.
    #[error("joint '{joint}' is already in {mode} mode")]
    JointBusy {
        /// Joint name
        joint: String,
        /// Mode held before the batch
        mode: CommandMode,
    },

    /// The same batch starts a joint twice.
    #[error("joint '{joint}' is started more than once in one request")]
    DuplicateStart {
        /// Joint name
        joint: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_names_stage() {
        let err = InitError::TransportUnavailable {
            interface: "eno0".to_string(),
            code: -1,
        };
        assert!(err.to_string().starts_with("transport"));
        assert!(err.to_string().contains("eno0"));

        let err = InitError::OperationalTimeout {
            observed: NetworkState::SafeOperational,
            expected: NetworkState::Operational,
            attempts: 200,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("state progression"));
        assert!(msg.contains("SAFE-OP"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_cycle_error_from_io() {
        let err: CycleError = IoError::Timeout { timeout_us: 2000 }.into();
        assert!(matches!(err, CycleError::Io(IoError::Timeout { timeout_us: 2000 })));
        assert!(err.to_string().contains("2000us"));
    }

    #[test]
    fn test_drive_error_shows_status_word() {
        let err = CycleError::DriveNotOperational {
            joint: "joint1".to_string(),
            status_word: 0x0218,
            condition: DriveCondition::Fault,
        };
        assert!(err.to_string().contains("0x0218"));
    }
}
