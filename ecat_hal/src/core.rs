//! Standalone host loop.
//!
//! `HalCore` plays the part of the host lifecycle framework when the
//! hardware interface runs on its own: it drives the lifecycle hooks,
//! claims the declared command interfaces, and calls `read`/`write` at the
//! configured cycle time while keeping timing statistics.

use ecat_common::hal::config::HardwareInfo;
use ecat_common::hal::driver::{HalError, SystemInterface};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Host loop around one hardware interface.
pub struct HalCore {
    /// Hardware interface driven by the loop
    system: Box<dyn SystemInterface>,
    /// Hardware description handed to `on_init`
    info: HardwareInfo,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    /// Cycle time from config
    cycle_time: Duration,
    /// Stop after this many cycles (None = until signalled)
    max_cycles: Option<u64>,
    /// Timing statistics
    stats: TimingStats,
}

/// Timing statistics for the cycle loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Cycles that exceeded the target cycle time
    pub timing_violations: u64,
    /// Cycles whose `read` or `write` returned an error
    pub cycle_errors: u64,
    /// Maximum observed cycle time [µs]
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation [µs]
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    /// Average cycle time [µs].
    pub fn average_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us
            .checked_div(self.cycle_count)
            .unwrap_or(0)
    }

    fn record(&mut self, cycle_time_us: u64, target_us: u64) -> bool {
        self.cycle_count += 1;
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);
        if cycle_time_us > target_us {
            self.timing_violations += 1;
            return true;
        }
        false
    }
}

impl HalCore {
    /// Create a host loop for `system`.
    pub fn new(system: Box<dyn SystemInterface>, info: HardwareInfo) -> Self {
        let cycle_time = info.hardware.cycle_time();
        info!(
            "HalCore created for '{}' v{} with {} joints, cycle_time={}us",
            system.name(),
            system.version(),
            info.joints.len(),
            cycle_time.as_micros()
        );
        Self {
            system,
            info,
            running: Arc::new(AtomicBool::new(false)),
            cycle_time,
            max_cycles: None,
            stats: TimingStats::default(),
        }
    }

    /// Stop the loop after `cycles` cycles.
    pub fn with_max_cycles(mut self, cycles: Option<u64>) -> Self {
        self.max_cycles = cycles;
        self
    }

    /// Initialize and activate the interface, then claim every joint's
    /// first declared command interface with a zero setpoint.
    pub fn init(&mut self) -> Result<(), HalError> {
        self.system.on_init(&self.info)?;
        self.system.on_activate()?;

        let start: Vec<String> = self
            .info
            .joints
            .iter()
            .filter_map(|j| j.command_interfaces.first().map(|i| format!("{}/{}", j.name, i)))
            .collect();
        self.system.prepare_command_mode_switch(&start, &[])?;
        debug!("Claimed command interfaces: {:?}", start);

        for handle in self.system.export_command_interfaces() {
            self.system.set_command_value(&handle, 0.0)?;
        }

        info!("HalCore initialized");
        Ok(())
    }

    /// Run the cycle loop until the running flag is cleared or the cycle
    /// limit is reached.
    ///
    /// Per-cycle errors are counted and the loop continues; they are
    /// logged by the interface itself.
    pub fn run(&mut self) -> Result<(), HalError> {
        info!(
            "Starting HalCore loop (cycle_time={}us)...",
            self.cycle_time.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        let target_us = self.cycle_time.as_micros() as u64;
        let mut last_cycle = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            if self.max_cycles.is_some_and(|max| self.stats.cycle_count >= max) {
                break;
            }

            let cycle_start = Instant::now();
            let period = cycle_start.duration_since(last_cycle);
            last_cycle = cycle_start;

            let result = self
                .system
                .read(period)
                .and_then(|()| self.system.write(period));
            if let Err(e) = result {
                if !e.is_recoverable() {
                    return Err(e);
                }
                self.stats.cycle_errors += 1;
            }

            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            if self.stats.record(cycle_time_us, target_us) {
                let violations = self.stats.timing_violations;
                if violations <= 10 || violations % 1000 == 0 {
                    warn!(
                        "Timing violation #{}: cycle took {}us (target {}us)",
                        violations, cycle_time_us, target_us
                    );
                }
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Loop: {} cycles, avg={}us, max={}us, violations={}, errors={}",
                    self.stats.cycle_count,
                    self.stats.average_cycle_time_us(),
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations,
                    self.stats.cycle_errors
                );
            }
        }

        info!(
            "HalCore loop stopped after {} cycles (violations: {}, errors: {})",
            self.stats.cycle_count, self.stats.timing_violations, self.stats.cycle_errors
        );
        Ok(())
    }

    /// Deactivate and shut the interface down.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);

        if let Some(diag) = self.system.diagnostics() {
            info!(
                "Diagnostics: cycles={} failed={} timeouts={} wkc_mismatches={} status_rejections={} link_lost={} link_recovered={}",
                diag.cycle_count,
                diag.failed_cycles,
                diag.timeouts,
                diag.wkc_mismatches,
                diag.status_rejections,
                diag.link_lost_events,
                diag.link_recoveries
            );
        }

        if let Err(e) = self.system.on_deactivate() {
            debug!("Deactivate skipped: {}", e);
        }
        self.system.on_shutdown()
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get timing statistics.
    pub fn stats(&self) -> &TimingStats {
        &self.stats
    }

    /// The driven interface.
    pub fn system(&self) -> &dyn SystemInterface {
        self.system.as_ref()
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
pub fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{sched_getscheduler, SCHED_FIFO, SCHED_RR};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
