//! Link health monitor.
//!
//! A background thread that watches the working counter published by the
//! cycle path. When the network is operational but the last exchange came
//! back short, it checks every slave's state and asks the master stack to
//! recover the ones that dropped out of OP.
//!
//! The thread never owns the network: it holds a `Weak` reference and only
//! uses `try_lock`, so the cycle thread is never blocked by it. It is
//! stopped through a channel and joined by [`LinkMonitor::stop`].

use crate::master::MasterStack;
use crate::session::Network;
use ecat_common::hal::types::NetworkState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Link state shared between the cycle path and the monitor.
#[derive(Debug, Default)]
pub struct LinkStatus {
    operational: AtomicBool,
    expected_wkc: AtomicU32,
    observed_wkc: AtomicU32,
    lost_events: AtomicU64,
    recoveries: AtomicU64,
}

impl LinkStatus {
    /// Mark the network operational with the given expected counter.
    pub fn set_operational(&self, expected_wkc: u32) {
        self.expected_wkc.store(expected_wkc, Ordering::Relaxed);
        self.observed_wkc.store(expected_wkc, Ordering::Relaxed);
        self.operational.store(true, Ordering::Release);
    }

    /// Mark the network down.
    pub fn clear(&self) {
        self.operational.store(false, Ordering::Release);
    }

    /// Publish the counter of the last exchange.
    pub fn record_wkc(&self, observed: u32) {
        self.observed_wkc.store(observed, Ordering::Relaxed);
    }

    /// True while the session is operational.
    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::Acquire)
    }

    /// True if the last exchange returned fewer datagram hits than expected.
    pub fn is_degraded(&self) -> bool {
        self.is_operational()
            && self.observed_wkc.load(Ordering::Relaxed) < self.expected_wkc.load(Ordering::Relaxed)
    }

    /// Slaves found outside OP so far.
    pub fn lost_events(&self) -> u64 {
        self.lost_events.load(Ordering::Relaxed)
    }

    /// Slaves brought back to OP so far.
    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }
}

/// Handle to the running monitor thread.
pub struct LinkMonitor {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl LinkMonitor {
    /// Spawn the monitor.
    ///
    /// # Arguments
    /// * `network` - Network to watch (never upgraded for longer than one check)
    /// * `status` - Shared link status
    /// * `period` - Polling period
    /// * `recover_timeout` - Per-slave recovery timeout
    pub fn spawn<M: MasterStack>(
        network: Weak<Mutex<Network<M>>>,
        status: Arc<LinkStatus>,
        period: Duration,
        recover_timeout: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("ecat-link-monitor".to_string())
            .spawn(move || {
                let mut lost: Vec<bool> = Vec::new();
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if !status.is_degraded() {
                        continue;
                    }
                    let Some(network) = network.upgrade() else {
                        break;
                    };
                    let Some(mut net) = network.try_lock() else {
                        continue;
                    };
                    check_slaves(&mut net, &status, &mut lost, recover_timeout);
                }
                debug!("Link monitor stopped");
            })?;

        Ok(Self {
            stop_tx,
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Link monitor thread panicked");
            }
        }
    }
}

impl Drop for LinkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_slaves<M: MasterStack>(
    net: &mut Network<M>,
    status: &LinkStatus,
    lost: &mut Vec<bool>,
    recover_timeout: Duration,
) {
    let slave_count = net.slave_count();
    lost.resize(slave_count, false);

    for (slave, was_lost) in lost.iter_mut().enumerate() {
        let state = net.master_mut().slave_state(slave);
        if state == NetworkState::Operational {
            *was_lost = false;
            continue;
        }

        if !*was_lost {
            *was_lost = true;
            status.lost_events.fetch_add(1, Ordering::Relaxed);
            warn!("Slave {} left OP (state {})", slave, state);
        }

        if net.master_mut().recover_slave(slave, recover_timeout) {
            *was_lost = false;
            status.recoveries.fetch_add(1, Ordering::Relaxed);
            info!("Slave {} recovered to OP", slave);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_only_when_operational() {
        let status = LinkStatus::default();
        status.record_wkc(0);
        assert!(!status.is_degraded());

        status.set_operational(6);
        assert!(!status.is_degraded());
        status.record_wkc(4);
        assert!(status.is_degraded());
        status.record_wkc(6);
        assert!(!status.is_degraded());

        status.record_wkc(2);
        status.clear();
        assert!(!status.is_degraded());
    }
}
