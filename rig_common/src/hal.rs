//! Hardware access trait and error types.
//!
//! All pin/register-level addressing lives behind [`RigHal`]; the
//! control logic above depends only on this interface. Implementations
//! exist per target platform, plus a simulation backend used by the
//! `--simulate` flag and the test suite.

use std::time::Duration;

use thiserror::Error;

use crate::state::{BusOwner, LinearAxis};

/// Error types for hardware operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Backend initialization failed.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// A pin or drive operation failed.
    #[error("hardware I/O error: {0}")]
    Io(String),

    /// Bus read produced no data within the timeout.
    #[error("bus read timed out after {0:?}")]
    BusTimeout(Duration),
}

/// Direction of a single raw step pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward the axis's positive travel end.
    Positive,
    /// Toward the homing reference edge.
    Negative,
}

impl StepDirection {
    /// Sign multiplier for bookkeeping.
    #[inline]
    pub const fn sign(&self) -> i64 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }
}

/// Interface to the rig hardware.
///
/// # Lifecycle
///
/// 1. `init()` once, before the control loop starts
/// 2. per-cycle calls from the safety monitor / axis controller
/// 3. `shutdown()` on exit, drives left disabled
///
/// Calls must not block beyond their stated purpose; the only blocking
/// calls are `bus_read` (bounded by its timeout) and the step pulse
/// itself (one pulse width).
pub trait RigHal {
    /// Initialize pins and drives. Called once before the control loop.
    fn init(&mut self) -> Result<(), HalError>;

    /// Disable everything and release the hardware.
    fn shutdown(&mut self) -> Result<(), HalError>;

    // ── Linear axes ──

    /// Assert or deassert the drive enable for an axis.
    fn axis_enable(&mut self, axis: LinearAxis, enabled: bool) -> Result<(), HalError>;

    /// Select raw step/dir mode (homing) or position-control mode.
    fn axis_set_raw_mode(&mut self, axis: LinearAxis, raw: bool) -> Result<(), HalError>;

    /// Issue an absolute position move in motion-unit counts.
    ///
    /// Only valid in position-control mode.
    fn axis_move_counts(&mut self, axis: LinearAxis, counts: i64) -> Result<(), HalError>;

    /// True once the drive reports the last count move complete.
    fn axis_step_done(&self, axis: LinearAxis) -> bool;

    /// Emit one raw step pulse. Only valid in raw mode.
    fn axis_step(&mut self, axis: LinearAxis, dir: StepDirection) -> Result<(), HalError>;

    /// Current state of the axis's limit switch input.
    fn limit_asserted(&self, axis: LinearAxis) -> bool;

    // ── Safety inputs ──

    /// Current state of the emergency-stop input.
    fn estop_asserted(&self) -> bool;

    // ── Pan stepper (open loop) ──

    /// Emit one pan step pulse.
    fn pan_step(&mut self, dir: StepDirection) -> Result<(), HalError>;

    /// Current state of the pan zero-flag sensor.
    fn pan_zero_flag(&self) -> bool;

    // ── Tilt drive ──

    /// Set the tilt drive pulse width [us].
    fn tilt_set_pulse_us(&mut self, pulse_us: u16) -> Result<(), HalError>;

    // ── Shared serial bus ──

    /// Drive the bus select line toward the given owner.
    ///
    /// The settle delay after switching is the multiplexer's
    /// responsibility, not the HAL's.
    fn bus_select(&mut self, owner: BusOwner) -> Result<(), HalError>;

    /// Write bytes to the currently selected peripheral.
    fn bus_write(&mut self, bytes: &[u8]) -> Result<(), HalError>;

    /// Read available bytes into `buf`, waiting up to `timeout` for the
    /// first byte. Returns the number of bytes read.
    fn bus_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HalError>;

    /// Discard any pending unread bytes.
    fn bus_flush(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_direction_sign() {
        assert_eq!(StepDirection::Positive.sign(), 1);
        assert_eq!(StepDirection::Negative.sign(), -1);
    }

    #[test]
    fn hal_error_display() {
        let err = HalError::BusTimeout(Duration::from_millis(200));
        assert!(err.to_string().contains("200"));
        let err = HalError::InitFailed("no gpio".into());
        assert!(err.to_string().contains("no gpio"));
    }
}
