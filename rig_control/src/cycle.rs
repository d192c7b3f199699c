//! Cooperative control cycle.
//!
//! One single-threaded loop: safety check → axis update → at most one
//! pending host command → sleep to the cycle period. Homing and pan
//! zeroing block inside the loop, but every blocking wait re-polls the
//! safety monitor, so a trip interrupts them within one step period.
//! Because the loop is single-threaded, no two hardware-affecting
//! operations ever run concurrently and the bus multiplexer's
//! queue-never-interleave rule holds structurally.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use rig_common::config::RigConfig;
use rig_common::hal::{HalError, RigHal};
use rig_common::state::RigStatus;

use crate::axis::AxisController;
use crate::bus::DeviceMux;
use crate::homing::HomingSequencer;
use crate::safety::SafetyMonitor;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles that exceeded the configured period.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
    }

    /// Average cycle time [ns] (0 before the first cycle).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Host Link ──────────────────────────────────────────────────────

/// Ordered, reliable line channel to the host.
///
/// The transport itself is out of scope; the loop only needs one
/// pending request line per cycle and a way to emit reply lines.
pub trait HostLink {
    /// Next pending request line, if any. Must not block.
    fn poll_line(&mut self) -> Option<String>;

    /// Emit one reply or notification line.
    fn send_line(&mut self, line: &str);
}

// ─── Control Unit ───────────────────────────────────────────────────

/// The complete control unit: hardware plus every coordination layer.
pub struct ControlUnit<H: RigHal> {
    pub config: RigConfig,
    pub hal: H,
    pub safety: SafetyMonitor,
    pub axes: AxisController,
    pub homing: HomingSequencer,
    pub mux: DeviceMux,
    pub stats: CycleStats,
}

impl<H: RigHal> ControlUnit<H> {
    /// Build the control unit and initialize the hardware.
    pub fn new(config: RigConfig, mut hal: H) -> Result<Self, HalError> {
        hal.init()?;
        let axes = AxisController::new(config.clone());
        let mux = DeviceMux::new(&config.bus);
        Ok(Self {
            config,
            hal,
            safety: SafetyMonitor::new(),
            axes,
            homing: HomingSequencer::new(),
            mux,
            stats: CycleStats::new(),
        })
    }

    /// Current status snapshot.
    pub fn status(&self) -> RigStatus {
        RigStatus {
            position: self.axes.position(),
            estop: !self.safety.state().motion_permitted(),
            moving: self.axes.is_moving(),
            homed: self.homing.is_homed(),
        }
    }

    /// One control cycle body: safety, axis update, one host command.
    pub fn cycle_body(&mut self, link: &mut dyn HostLink) {
        if !self.safety.check(&self.hal).motion_permitted() {
            self.axes.halt(&mut self.hal);
        }

        self.axes.update(&mut self.hal, &mut self.safety);

        if let Some(line) = link.poll_line() {
            self.handle_line(&line, link);
        }
    }

    /// Enter the cooperative loop until `running` clears.
    pub fn run(&mut self, link: &mut dyn HostLink, running: Arc<AtomicBool>) {
        let period = Duration::from_millis(self.config.cycle.period_ms);
        info!(period_ms = self.config.cycle.period_ms, "control loop started");

        while running.load(Ordering::SeqCst) {
            let start = Instant::now();

            self.cycle_body(link);

            let elapsed = start.elapsed();
            self.stats.record(elapsed.as_nanos() as i64);
            if elapsed > period {
                // Overruns are expected around blocking homing; log,
                // don't abort.
                self.stats.overruns += 1;
            } else {
                std::thread::sleep(period - elapsed);
            }
        }

        info!(
            cycles = self.stats.cycle_count,
            overruns = self.stats.overruns,
            "control loop stopped"
        );
        if let Err(e) = self.hal.shutdown() {
            warn!(error = %e, "hardware shutdown failed");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
