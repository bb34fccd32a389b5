//! Fieldbus session.
//!
//! Brings the network from a closed socket to OPERATIONAL and performs the
//! per-cycle process data exchange.
//!
//! # Bring-up sequence
//!
//! ```text
//! open ─► discover ─► map I/O ─► DC ─► wait SAFE-OP ─► one frame
//!      ─► request OP ─► (send/receive/state-check) × retries ─► monitor
//! ```
//!
//! Every failure after `open` closes the transport again. The network is
//! owned through an `Arc<Mutex<_>>` ([`NetworkHandle`]); the link monitor
//! only ever holds a `Weak` to it.

use crate::master::{MasterStack, ProcessImageLayout};
use crate::monitor::{LinkMonitor, LinkStatus};
use ecat_common::consts::{
    DEFAULT_MONITOR_PERIOD_US, DEFAULT_OPERATIONAL_RETRIES, DEFAULT_RECEIVE_TIMEOUT_US,
    DEFAULT_SAFE_OP_TIMEOUT_US, DEFAULT_STATE_CHECK_TIMEOUT_US,
};
use ecat_common::hal::config::SystemConfig;
use ecat_common::hal::error::{InitError, IoError};
use ecat_common::hal::types::NetworkState;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing parameters of bring-up and exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Receive timeout of one exchange
    pub receive_timeout: Duration,
    /// Rounds granted to reach OPERATIONAL
    pub operational_retries: u32,
    /// Per-round OPERATIONAL state check timeout
    pub state_check_timeout: Duration,
    /// SAFE-OPERATIONAL state check timeout
    pub safe_op_timeout: Duration,
    /// Link monitor polling period
    pub monitor_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_micros(DEFAULT_RECEIVE_TIMEOUT_US),
            operational_retries: DEFAULT_OPERATIONAL_RETRIES,
            state_check_timeout: Duration::from_micros(DEFAULT_STATE_CHECK_TIMEOUT_US),
            safe_op_timeout: Duration::from_micros(DEFAULT_SAFE_OP_TIMEOUT_US),
            monitor_period: Duration::from_micros(DEFAULT_MONITOR_PERIOD_US),
        }
    }
}

impl From<&SystemConfig> for SessionSettings {
    fn from(config: &SystemConfig) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            operational_retries: config.operational_retries,
            state_check_timeout: Duration::from_micros(config.state_check_timeout_us),
            safe_op_timeout: Duration::from_micros(config.safe_op_timeout_us),
            monitor_period: Duration::from_micros(config.monitor_period_us),
        }
    }
}

/// Network state behind a [`NetworkHandle`].
pub struct Network<M> {
    master: M,
    open: bool,
    state: NetworkState,
    layout: ProcessImageLayout,
    slave_count: usize,
    expected_wkc: u32,
    observed_wkc: u32,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
}

impl<M: MasterStack> Network<M> {
    fn new(master: M) -> Self {
        Self {
            master,
            open: false,
            state: NetworkState::None,
            layout: ProcessImageLayout::default(),
            slave_count: 0,
            expected_wkc: 0,
            observed_wkc: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// True while the transport is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Last state read back from the network.
    pub fn state(&self) -> NetworkState {
        self.state
    }

    /// Discovered slaves.
    pub fn slave_count(&self) -> usize {
        self.slave_count
    }

    /// Working counter of a healthy exchange.
    pub fn expected_wkc(&self) -> u32 {
        self.expected_wkc
    }

    /// Working counter of the last exchange.
    pub fn observed_wkc(&self) -> u32 {
        self.observed_wkc
    }

    /// Mapped process image layout.
    pub fn layout(&self) -> &ProcessImageLayout {
        &self.layout
    }

    /// Whole input image (slave → master).
    pub fn inputs(&self) -> &[u8] {
        &self.inputs
    }

    /// Whole output image (master → slave).
    pub fn outputs(&self) -> &[u8] {
        &self.outputs
    }

    /// Input bytes of one slave.
    pub fn slave_inputs(&self, slave: usize) -> Option<&[u8]> {
        let map = self.layout.slaves.get(slave)?;
        self.inputs
            .get(map.input_offset..map.input_offset + map.input_len)
    }

    /// Output bytes of one slave.
    pub fn slave_outputs_mut(&mut self, slave: usize) -> Option<&mut [u8]> {
        let map = self.layout.slaves.get(slave)?;
        self.outputs
            .get_mut(map.output_offset..map.output_offset + map.output_len)
    }

    pub(crate) fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    fn exchange(&mut self, timeout: Duration) -> Result<u32, IoError> {
        if !self.open {
            return Err(IoError::NotConnected);
        }
        self.master.send_process_data(&self.outputs);
        match self.master.receive_process_data(&mut self.inputs, timeout) {
            Some(wkc) => {
                self.observed_wkc = wkc;
                Ok(wkc)
            }
            None => Err(IoError::Timeout {
                timeout_us: timeout.as_micros() as u64,
            }),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.master.close();
            self.open = false;
        }
        self.state = NetworkState::None;
    }
}

/// Shared, cloneable reference to the network.
pub struct NetworkHandle<M> {
    inner: Arc<Mutex<Network<M>>>,
}

impl<M> fmt::Debug for NetworkHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkHandle").finish_non_exhaustive()
    }
}

impl<M> Clone for NetworkHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: MasterStack> NetworkHandle<M> {
    /// Lock the network.
    pub fn lock(&self) -> MutexGuard<'_, Network<M>> {
        self.inner.lock()
    }

    /// Working counter of a healthy exchange.
    pub fn expected_wkc(&self) -> u32 {
        self.inner.lock().expected_wkc
    }

    /// Discovered slaves.
    pub fn slave_count(&self) -> usize {
        self.inner.lock().slave_count
    }

    /// Last state read back from the network.
    pub fn state(&self) -> NetworkState {
        self.inner.lock().state
    }

    /// Run `f` on the master stack (diagnostics and tests).
    pub fn with_master<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.lock().master)
    }
}

/// Owner of the network and the link monitor.
pub struct FieldbusSession<M: MasterStack> {
    network: NetworkHandle<M>,
    settings: SessionSettings,
    link: Arc<LinkStatus>,
    monitor: Option<LinkMonitor>,
}

impl<M: MasterStack> FieldbusSession<M> {
    /// Create a closed session around a master stack.
    pub fn new(master: M) -> Self {
        Self {
            network: NetworkHandle {
                inner: Arc::new(Mutex::new(Network::new(master))),
            },
            settings: SessionSettings::default(),
            link: Arc::new(LinkStatus::default()),
            monitor: None,
        }
    }

    /// Replace the timing parameters. Takes effect on the next bring-up.
    pub fn configure(&mut self, settings: SessionSettings) {
        self.settings = settings;
    }

    /// Current timing parameters.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Handle to the network (open or not).
    pub fn handle(&self) -> NetworkHandle<M> {
        self.network.clone()
    }

    /// Shared link status.
    pub fn link_status(&self) -> &LinkStatus {
        &self.link
    }

    /// True while the transport is open.
    pub fn is_open(&self) -> bool {
        self.network.lock().open
    }

    /// Bring the network on `interface` to OPERATIONAL.
    ///
    /// An already open session is torn down first.
    ///
    /// # Errors
    /// The [`InitError`] variant names the failing stage. The transport is
    /// closed again on every error.
    pub fn bring_up(&mut self, interface: &str) -> Result<NetworkHandle<M>, InitError> {
        self.teardown();

        let result = {
            let mut net = self.network.lock();
            let result = bring_up_network(&mut net, interface, &self.settings);
            if result.is_err() {
                net.close();
            }
            result
        };
        result?;

        let expected_wkc = self.network.expected_wkc();
        self.link.set_operational(expected_wkc);

        match LinkMonitor::spawn(
            Arc::downgrade(&self.network.inner),
            Arc::clone(&self.link),
            self.settings.monitor_period,
            self.settings.state_check_timeout,
        ) {
            Ok(monitor) => self.monitor = Some(monitor),
            Err(e) => warn!("Link monitor not started: {}", e),
        }

        info!(
            "Fieldbus operational on '{}': {} slaves, expected WKC {}",
            interface,
            self.network.slave_count(),
            expected_wkc
        );
        Ok(self.network.clone())
    }

    /// Send the output image and wait for the input image.
    ///
    /// Returns the observed working counter. A counter mismatch is not an
    /// error at this level.
    pub fn exchange(&self) -> Result<u32, IoError> {
        let wkc = self.network.lock().exchange(self.settings.receive_timeout)?;
        self.link.record_wkc(wkc);
        Ok(wkc)
    }

    /// Stop the monitor and close the transport. Idempotent.
    pub fn teardown(&mut self) {
        self.link.clear();
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }

        let mut net = self.network.lock();
        if net.open {
            debug!("Closing fieldbus transport");
            net.close();
        }
    }
}

impl<M: MasterStack> Drop for FieldbusSession<M> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn bring_up_network<M: MasterStack>(
    net: &mut Network<M>,
    interface: &str,
    settings: &SessionSettings,
) -> Result<(), InitError> {
    net.master
        .open(interface)
        .map_err(|code| InitError::TransportUnavailable {
            interface: interface.to_string(),
            code,
        })?;
    net.open = true;
    debug!("Transport open on '{}'", interface);

    let slave_count = net.master.discover();
    if slave_count == 0 {
        return Err(InitError::NoSlavesFound {
            interface: interface.to_string(),
        });
    }
    net.slave_count = slave_count;
    info!("{} slaves found", slave_count);

    net.layout = net.master.map_process_image();
    net.inputs = vec![0; net.layout.inputs_len];
    net.outputs = vec![0; net.layout.outputs_len];
    debug!(
        "Process image mapped: {} input bytes, {} output bytes",
        net.layout.inputs_len, net.layout.outputs_len
    );

    if !net.master.configure_dc() {
        debug!("No slave supports distributed clocks");
    }

    net.state = net
        .master
        .state_check(NetworkState::SafeOperational, settings.safe_op_timeout);
    if net.state != NetworkState::SafeOperational {
        return Err(InitError::SafeOperationalTimeout {
            observed: net.state,
            expected: NetworkState::SafeOperational,
        });
    }

    net.expected_wkc = net.layout.expected_wkc();
    debug!("Expected working counter {}", net.expected_wkc);

    // valid outputs must be on the wire before OP is requested
    net.master.send_process_data(&net.outputs);
    if let Some(wkc) = net
        .master
        .receive_process_data(&mut net.inputs, settings.receive_timeout)
    {
        net.observed_wkc = wkc;
    }

    net.master.request_state(NetworkState::Operational);

    let mut attempts = 0;
    while attempts < settings.operational_retries {
        attempts += 1;
        net.master.send_process_data(&net.outputs);
        if let Some(wkc) = net
            .master
            .receive_process_data(&mut net.inputs, settings.receive_timeout)
        {
            net.observed_wkc = wkc;
        }
        net.state = net
            .master
            .state_check(NetworkState::Operational, settings.state_check_timeout);
        if net.state == NetworkState::Operational {
            debug!("OPERATIONAL after {} attempts", attempts);
            return Ok(());
        }
    }

    net.state = net.master.read_state();
    Err(InitError::OperationalTimeout {
        observed: net.state,
        expected: NetworkState::Operational,
        attempts,
    })
}
