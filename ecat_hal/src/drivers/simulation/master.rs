//! Simulated master stack.
//!
//! [`SimulatedMaster`] implements [`MasterStack`] over a set of
//! [`SimulatedDrive`]s. A cloneable [`SimulationControl`] shares the same
//! state and lets the caller inject faults while the session runs:
//! unavailable interface, empty bus, slaves stuck below a state, dropped
//! frames, working counter offsets and arbitrary status words.

use super::drive::SimulatedDrive;
use crate::master::{MasterStack, ProcessImageLayout, SlaveMapping};
use crate::pdo::{DriveInputs, DriveOutputs};
use ecat_common::config::{ConfigError, ConfigLoader};
use ecat_common::hal::types::NetworkState;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Static parameters of a simulated bus.
///
/// Loadable from the `[simulation]` table of a TOML file; omitted keys
/// keep their defaults.
///
/// ```toml
/// [simulation]
/// slaves = 2
/// state_ceiling = "safe_operational"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Slaves answering discovery
    pub slaves: usize,
    /// Return code of `open`, `None` to succeed
    pub open_error: Option<i32>,
    /// Highest state the slaves ever reach
    pub state_ceiling: NetworkState,
    /// OP state checks answered before the slaves switch to OP
    pub operational_after: u32,
    /// Input bytes mapped per slave
    pub input_len: usize,
    /// Output bytes mapped per slave
    pub output_len: usize,
}

impl SimulationConfig {
    /// Healthy bus with `slaves` drives.
    pub fn with_slaves(slaves: usize) -> Self {
        Self {
            slaves,
            ..Self::default()
        }
    }

    /// Load the `[simulation]` table of a TOML file.
    ///
    /// Other tables are ignored, so the table may share a file with the
    /// hardware description of a test bench.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = SimulationFile::load(path)?;
        debug!("Simulation parameters loaded from {}", path.display());
        Ok(file.simulation)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SimulationFile {
    #[serde(default)]
    simulation: SimulationConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            slaves: 1,
            open_error: None,
            state_ceiling: NetworkState::Operational,
            operational_after: 3,
            input_len: DriveInputs::SIZE,
            output_len: DriveOutputs::SIZE,
        }
    }
}

#[derive(Debug, Default)]
struct SimCounters {
    opens: u64,
    closes: u64,
    frames_sent: u64,
    frames_dropped: u64,
}

#[derive(Debug)]
struct SimState {
    config: SimulationConfig,
    open: bool,
    drives: Vec<SimulatedDrive>,
    requested: NetworkState,
    op_checks_left: u32,
    frame_pending: bool,
    drop_responses: bool,
    wkc_offset: i32,
    status_words: Option<u16>,
    counters: SimCounters,
}

impl SimState {
    fn lowest_state(&self) -> NetworkState {
        self.drives
            .iter()
            .map(|d| d.state)
            .min_by_key(|s| *s as u16)
            .unwrap_or(NetworkState::None)
    }

    fn move_all(&mut self, target: NetworkState) {
        let reached = lower(target, self.config.state_ceiling);
        for drive in &mut self.drives {
            drive.state = reached;
        }
    }
}

fn lower(a: NetworkState, b: NetworkState) -> NetworkState {
    if (a as u16) <= (b as u16) { a } else { b }
}

/// Fault injection and inspection handle.
#[derive(Clone)]
pub struct SimulationControl {
    state: Arc<Mutex<SimState>>,
}

impl SimulationControl {
    /// Set the status word one drive reports.
    pub fn set_status_word(&self, slave: usize, status_word: u16) {
        let mut state = self.state.lock();
        if let Some(drive) = state.drives.get_mut(slave) {
            drive.status_word = status_word;
        }
    }

    /// Set the status word of every drive, including drives discovered later.
    pub fn set_all_status_words(&self, status_word: u16) {
        let mut state = self.state.lock();
        state.status_words = Some(status_word);
        for drive in &mut state.drives {
            drive.status_word = status_word;
        }
    }

    /// Drop (or stop dropping) every returning frame.
    pub fn set_drop_responses(&self, drop: bool) {
        self.state.lock().drop_responses = drop;
    }

    /// Add `offset` to every observed working counter.
    pub fn set_wkc_offset(&self, offset: i32) {
        self.state.lock().wkc_offset = offset;
    }

    /// Force one slave into `target` (e.g. to simulate a lost link).
    pub fn set_slave_state(&self, slave: usize, target: NetworkState) {
        let mut state = self.state.lock();
        if let Some(drive) = state.drives.get_mut(slave) {
            drive.state = target;
        }
    }

    /// State of one slave.
    pub fn slave_state(&self, slave: usize) -> Option<NetworkState> {
        self.state.lock().drives.get(slave).map(|d| d.state)
    }

    /// Last outputs one drive took over.
    pub fn last_outputs(&self, slave: usize) -> Option<DriveOutputs> {
        self.state.lock().drives.get(slave).map(|d| d.last_outputs)
    }

    /// True while the transport is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> u64 {
        self.state.lock().counters.opens
    }

    /// Number of `close` calls on an open transport.
    pub fn close_count(&self) -> u64 {
        self.state.lock().counters.closes
    }

    /// Frames put on the simulated wire.
    pub fn frames_sent(&self) -> u64 {
        self.state.lock().counters.frames_sent
    }

    /// Frames that never came back.
    pub fn frames_dropped(&self) -> u64 {
        self.state.lock().counters.frames_dropped
    }
}

/// Master stack backed by simulated drives.
pub struct SimulatedMaster {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMaster {
    /// Simulated bus with the given parameters.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                config,
                open: false,
                drives: Vec::new(),
                requested: NetworkState::None,
                op_checks_left: 0,
                frame_pending: false,
                drop_responses: false,
                wkc_offset: 0,
                status_words: None,
                counters: SimCounters::default(),
            })),
        }
    }

    /// Healthy bus with `slaves` drives.
    pub fn with_slaves(slaves: usize) -> Self {
        Self::new(SimulationConfig::with_slaves(slaves))
    }

    /// Handle for fault injection and inspection.
    pub fn control(&self) -> SimulationControl {
        SimulationControl {
            state: Arc::clone(&self.state),
        }
    }
}

impl MasterStack for SimulatedMaster {
    fn open(&mut self, interface: &str) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(code) = state.config.open_error {
            warn!("Simulated transport refuses '{}' ({})", interface, code);
            return Err(code);
        }
        state.open = true;
        state.counters.opens += 1;
        state.drives.clear();
        state.frame_pending = false;
        debug!("Simulated transport open on '{}'", interface);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.counters.closes += 1;
            state.move_all(NetworkState::Init);
            debug!("Simulated transport closed");
        }
    }

    fn discover(&mut self) -> usize {
        let mut state = self.state.lock();
        if !state.open {
            return 0;
        }
        let status_word = state.status_words;
        let slaves = state.config.slaves;
        state.drives = (0..slaves)
            .map(|_| {
                let mut drive = SimulatedDrive::new();
                if let Some(word) = status_word {
                    drive.status_word = word;
                }
                drive
            })
            .collect();
        state.move_all(NetworkState::PreOperational);
        state.drives.len()
    }

    fn map_process_image(&mut self) -> ProcessImageLayout {
        let mut state = self.state.lock();
        let count = state.drives.len();
        let (input_len, output_len) = (state.config.input_len, state.config.output_len);

        let slaves = (0..count)
            .map(|i| SlaveMapping {
                input_offset: i * input_len,
                input_len,
                output_offset: i * output_len,
                output_len,
            })
            .collect();

        state.move_all(NetworkState::SafeOperational);

        ProcessImageLayout {
            inputs_len: count * input_len,
            outputs_len: count * output_len,
            slaves,
            outputs_wkc: count as u32,
            inputs_wkc: count as u32,
        }
    }

    fn configure_dc(&mut self) -> bool {
        !self.state.lock().drives.is_empty()
    }

    fn state_check(&mut self, target: NetworkState, _timeout: Duration) -> NetworkState {
        let mut state = self.state.lock();
        if target == NetworkState::Operational && state.requested == NetworkState::Operational {
            if state.op_checks_left > 0 {
                state.op_checks_left -= 1;
            } else {
                state.move_all(NetworkState::Operational);
            }
        }
        state.lowest_state()
    }

    fn request_state(&mut self, target: NetworkState) {
        let mut state = self.state.lock();
        state.requested = target;
        if target == NetworkState::Operational {
            state.op_checks_left = state.config.operational_after;
        } else {
            state.move_all(target);
        }
    }

    fn read_state(&mut self) -> NetworkState {
        self.state.lock().lowest_state()
    }

    fn send_process_data(&mut self, outputs: &[u8]) {
        let mut state = self.state.lock();
        if !state.open {
            return;
        }
        let output_len = state.config.output_len;
        for (i, drive) in state.drives.iter_mut().enumerate() {
            let frame = outputs
                .get(i * output_len..(i + 1) * output_len)
                .and_then(|bytes| DriveOutputs::decode(bytes).ok())
                .unwrap_or_default();
            drive.step(frame);
        }
        state.counters.frames_sent += 1;
        state.frame_pending = true;
        trace!("Simulated frame sent ({} bytes)", outputs.len());
    }

    fn receive_process_data(&mut self, inputs: &mut [u8], _timeout: Duration) -> Option<u32> {
        let mut state = self.state.lock();
        if !state.frame_pending {
            return None;
        }
        state.frame_pending = false;
        if state.drop_responses {
            state.counters.frames_dropped += 1;
            return None;
        }

        let input_len = state.config.input_len;
        let mut wkc: i64 = 0;
        for (i, drive) in state.drives.iter().enumerate() {
            if let Some(bytes) = inputs.get_mut(i * input_len..(i + 1) * input_len) {
                // short mappings simply leave the slot untouched
                let _ = drive.inputs().encode(bytes);
            }
            wkc += i64::from(drive.wkc());
        }
        wkc += i64::from(state.wkc_offset);
        Some(wkc.clamp(0, i64::from(u32::MAX)) as u32)
    }

    fn slave_state(&mut self, slave: usize) -> NetworkState {
        self.state
            .lock()
            .drives
            .get(slave)
            .map(|d| d.state)
            .unwrap_or(NetworkState::None)
    }

    fn recover_slave(&mut self, slave: usize, _timeout: Duration) -> bool {
        let mut state = self.state.lock();
        let ceiling = state.config.state_ceiling;
        match state.drives.get_mut(slave) {
            Some(drive) if ceiling == NetworkState::Operational => {
                drive.state = NetworkState::Operational;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_code() {
        let mut master = SimulatedMaster::new(SimulationConfig {
            open_error: Some(-5),
            ..SimulationConfig::default()
        });
        assert_eq!(master.open("eth9"), Err(-5));
        assert!(!master.control().is_open());
    }

    #[test]
    fn test_layout_and_wkc() {
        let mut master = SimulatedMaster::with_slaves(2);
        master.open("sim").unwrap();
        assert_eq!(master.discover(), 2);
        let layout = master.map_process_image();
        assert_eq!(layout.inputs_len, 2 * DriveInputs::SIZE);
        assert_eq!(layout.slaves[1].output_offset, DriveOutputs::SIZE);
        assert_eq!(layout.expected_wkc(), 6);

        let mut inputs = vec![0u8; layout.inputs_len];
        master.send_process_data(&vec![0u8; layout.outputs_len]);
        // SAFE-OP slaves only deliver inputs
        assert_eq!(master.receive_process_data(&mut inputs, Duration::ZERO), Some(2));
    }

    #[test]
    fn test_operational_after_checks() {
        let mut master = SimulatedMaster::new(SimulationConfig {
            slaves: 1,
            operational_after: 2,
            ..SimulationConfig::default()
        });
        master.open("sim").unwrap();
        master.discover();
        master.map_process_image();
        master.request_state(NetworkState::Operational);
        let check = Duration::ZERO;
        assert_eq!(master.state_check(NetworkState::Operational, check), NetworkState::SafeOperational);
        assert_eq!(master.state_check(NetworkState::Operational, check), NetworkState::SafeOperational);
        assert_eq!(master.state_check(NetworkState::Operational, check), NetworkState::Operational);
    }

    #[test]
    fn test_ceiling_blocks_progression() {
        let mut master = SimulatedMaster::new(SimulationConfig {
            slaves: 1,
            state_ceiling: NetworkState::PreOperational,
            ..SimulationConfig::default()
        });
        master.open("sim").unwrap();
        master.discover();
        master.map_process_image();
        assert_eq!(
            master.state_check(NetworkState::SafeOperational, Duration::ZERO),
            NetworkState::PreOperational
        );
        assert!(!master.recover_slave(0, Duration::ZERO));
    }

    #[test]
    fn test_receive_without_send_times_out() {
        let mut master = SimulatedMaster::with_slaves(1);
        master.open("sim").unwrap();
        master.discover();
        let mut inputs = vec![0u8; DriveInputs::SIZE];
        assert_eq!(master.receive_process_data(&mut inputs, Duration::ZERO), None);
    }

    #[test]
    fn test_config_from_toml() {
        let config: SimulationFile = toml::from_str(
            r#"
[simulation]
slaves = 4
state_ceiling = "safe_operational"
open_error = -3
"#,
        )
        .unwrap();
        assert_eq!(config.simulation.slaves, 4);
        assert_eq!(config.simulation.state_ceiling, NetworkState::SafeOperational);
        assert_eq!(config.simulation.open_error, Some(-3));
        assert_eq!(config.simulation.operational_after, 3);
        assert_eq!(config.simulation.input_len, DriveInputs::SIZE);

        let err = toml::from_str::<SimulationFile>("[simulation]\nslave = 2\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_load_ignores_other_tables() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[hardware]
interface_name = "sim0"

[simulation]
slaves = 2
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config, SimulationConfig::with_slaves(2));

        let missing = SimulationConfig::load(Path::new("/nonexistent/sim.toml"));
        assert!(matches!(missing, Err(ConfigError::FileNotFound)));
    }
}
