//! System-wide constants for the ECAT workspace.
//!
//! Single source of truth for numeric limits, timing defaults and default
//! paths. Imported by all crates.

/// Maximum number of joints a single hardware interface drives.
pub const MAX_JOINTS: usize = 64;

/// Default system cycle time in microseconds (1 kHz = 1000 µs).
pub const CYCLE_TIME_US: u64 = 1000;

/// Default fieldbus network interface.
pub const DEFAULT_INTERFACE_NAME: &str = "eno0";

/// Default time to wait for a process data frame to come back [µs].
pub const DEFAULT_RECEIVE_TIMEOUT_US: u64 = 2_000;

/// Default number of exchange/state-check rounds granted to reach OPERATIONAL.
pub const DEFAULT_OPERATIONAL_RETRIES: u32 = 200;

/// Default per-round OPERATIONAL state check timeout [µs].
pub const DEFAULT_STATE_CHECK_TIMEOUT_US: u64 = 50_000;

/// Default SAFE-OPERATIONAL state check timeout [µs].
pub const DEFAULT_SAFE_OP_TIMEOUT_US: u64 = 8_000_000;

/// Default link monitor polling period [µs].
pub const DEFAULT_MONITOR_PERIOD_US: u64 = 10_000;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecat/hardware.toml";

/// Canonical HAL service name (used for logging).
pub const HAL_SERVICE_NAME: &str = "ecat_hal";
