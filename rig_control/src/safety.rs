//! Safety monitor: limit switches and the emergency-stop input.
//!
//! The monitor is the single authority that may force the system out of
//! normal operation. `check()` is called at the top of every control
//! cycle and before accepting any move or homing request; it never
//! blocks. A tripped state is sticky until an explicit, validated
//! `RESET_ESTOP` succeeds; there is no automatic recovery.
//!
//! The monitor only *detects and latches*; deasserting axis enables and
//! cancelling the in-progress move is done by the axis controller's
//! halt path, which every caller invokes on a non-`Normal` result.

use bitflags::bitflags;
use thiserror::Error;
use tracing::{info, warn};

use rig_common::hal::RigHal;
use rig_common::state::{LINEAR_AXES, LinearAxis, SafetyState};

bitflags! {
    /// Raw safety input sample, one bit per condition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LimitInputs: u8 {
        const X_LIMIT = 1 << 0;
        const Y_LIMIT = 1 << 1;
        const Z_LIMIT = 1 << 2;
        const ESTOP = 1 << 3;
    }
}

impl LimitInputs {
    /// Bit for a linear axis's limit switch.
    pub const fn for_axis(axis: LinearAxis) -> Self {
        match axis {
            LinearAxis::X => Self::X_LIMIT,
            LinearAxis::Y => Self::Y_LIMIT,
            LinearAxis::Z => Self::Z_LIMIT,
        }
    }

    /// Human-readable list of asserted conditions.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.contains(Self::ESTOP) {
            parts.push("ESTOP");
        }
        if self.contains(Self::X_LIMIT) {
            parts.push("X_LIMIT");
        }
        if self.contains(Self::Y_LIMIT) {
            parts.push("Y_LIMIT");
        }
        if self.contains(Self::Z_LIMIT) {
            parts.push("Z_LIMIT");
        }
        parts.join("+")
    }
}

/// Failure to clear a latched trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyError {
    /// One or more inputs still read asserted at the moment of the request.
    #[error("safety inputs still asserted: {0}")]
    StillAsserted(String),
}

/// Sticky safety state machine over the hardware inputs.
#[derive(Debug)]
pub struct SafetyMonitor {
    state: SafetyState,
    /// Trips latched since startup, for diagnostics.
    trip_count: u64,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self {
            state: SafetyState::Normal,
            trip_count: 0,
        }
    }

    /// Current latched state.
    #[inline]
    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// Trips latched since startup.
    #[inline]
    pub fn trip_count(&self) -> u64 {
        self.trip_count
    }

    /// Sample the raw inputs without latching.
    pub fn sample<H: RigHal + ?Sized>(hal: &H) -> LimitInputs {
        let mut inputs = LimitInputs::empty();
        for axis in LINEAR_AXES {
            if hal.limit_asserted(axis) {
                inputs |= LimitInputs::for_axis(axis);
            }
        }
        if hal.estop_asserted() {
            inputs |= LimitInputs::ESTOP;
        }
        inputs
    }

    /// Poll the inputs and latch any trip. Never blocks, never clears.
    pub fn check<H: RigHal + ?Sized>(&mut self, hal: &H) -> SafetyState {
        self.check_excluding(hal, None)
    }

    /// Poll as [`check`](Self::check), ignoring one axis's limit input.
    ///
    /// Used during homing: the homed axis is driven *into* its limit
    /// switch on purpose, so its own assertion is the phase's success
    /// condition rather than a fault.
    pub fn check_excluding<H: RigHal + ?Sized>(
        &mut self,
        hal: &H,
        exclude: Option<LinearAxis>,
    ) -> SafetyState {
        if self.state != SafetyState::Normal {
            return self.state;
        }

        let mut inputs = Self::sample(hal);
        if let Some(axis) = exclude {
            inputs.remove(LimitInputs::for_axis(axis));
        }

        if inputs.contains(LimitInputs::ESTOP) {
            self.latch(SafetyState::Estop, inputs);
        } else if !inputs.is_empty() {
            self.latch(SafetyState::LimitTripped, inputs);
        }
        self.state
    }

    /// Latch an explicit emergency stop (host `ESTOP` request).
    pub fn trip_estop(&mut self) {
        if self.state != SafetyState::Estop {
            self.latch(SafetyState::Estop, LimitInputs::ESTOP);
        }
    }

    /// Honor a `RESET_ESTOP` request.
    ///
    /// Succeeds only if every limit and e-stop input reads clear at this
    /// instant; otherwise the latched state is unchanged and the
    /// offending conditions are reported.
    pub fn reset<H: RigHal + ?Sized>(&mut self, hal: &H) -> Result<(), SafetyError> {
        let inputs = Self::sample(hal);
        if !inputs.is_empty() {
            return Err(SafetyError::StillAsserted(inputs.describe()));
        }
        if self.state != SafetyState::Normal {
            info!(previous = ?self.state, "safety trip cleared");
        }
        self.state = SafetyState::Normal;
        Ok(())
    }

    fn latch(&mut self, state: SafetyState, inputs: LimitInputs) {
        warn!(?state, inputs = %inputs.describe(), "safety trip latched");
        self.state = state;
        self.trip_count += 1;
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
