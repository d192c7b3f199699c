//! Homing sequencer: fixed-order reference establishment.
//!
//! Drives all axes to their hardware reference points in the fixed,
//! safety-first order Z → X → Y → Pan → TiltCenter. Z is always first
//! (falling-payload risk). Every step of every phase polls the safety
//! monitor, so a trip interrupts a blocking phase within one step
//! period. That poll is the only cancellation mechanism.
//!
//! The pan zero uses a two-pass approach against its single flag
//! sensor: approach slowly until the flag asserts, back off a fixed
//! step count, then re-approach slower still until the flag re-asserts.
//! The second, slower pass removes backlash and overshoot from the
//! reference.
//!
//! Failure mid-sequence leaves every axis disabled and the phase short
//! of `Done`; a subsequent homing command restarts from the beginning.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use rig_common::config::RigConfig;
use rig_common::hal::{HalError, RigHal, StepDirection};
use rig_common::state::{AxisState, HomingPhase, LINEAR_AXES, LinearAxis, SafetyState};

use crate::axis::AxisController;
use crate::safety::SafetyMonitor;

/// Distinct homing failure conditions.
#[derive(Debug, Error)]
pub enum HomingError {
    /// The safety monitor tripped mid-sequence.
    #[error("safety trip during homing ({0:?})")]
    SafetyTrip(SafetyState),

    /// The phase's step budget ran out before its sensor asserted
    /// (dead switch or jammed axis).
    #[error("step budget exhausted in phase {0:?}")]
    StepBudgetExhausted(HomingPhase),

    #[error(transparent)]
    Hal(#[from] HalError),
}

/// Steps allowed for releasing a limit switch after the seek pass.
const RELEASE_BACKOFF_BUDGET: u64 = 2_000;

/// Fixed-order homing state machine.
#[derive(Debug)]
pub struct HomingSequencer {
    /// Last completed phase of the most recent sequence; `Done` only
    /// after full success. Advances forward only.
    completed: Option<HomingPhase>,
    homed: bool,
}

impl HomingSequencer {
    pub fn new() -> Self {
        Self {
            completed: None,
            homed: false,
        }
    }

    /// Last completed phase, if any phase of the most recent sequence
    /// finished.
    #[inline]
    pub fn last_completed(&self) -> Option<HomingPhase> {
        self.completed
    }

    /// True once a full sequence has succeeded and no later failure
    /// invalidated the reference.
    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Run the full homing sequence. Blocking; polls the safety monitor
    /// every step.
    pub fn run_all<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        axes: &mut AxisController,
        config: &RigConfig,
    ) -> Result<(), HomingError> {
        info!("homing sequence started");
        self.completed = None;
        self.homed = false;

        // Position control off everywhere; raw step/dir mode.
        for axis in LINEAR_AXES {
            hal.axis_set_raw_mode(axis, true)?;
            hal.axis_enable(axis, true)?;
            axes.set_axis_state(axis, AxisState::Homing);
        }

        let result = self.run_phases(hal, safety, config);
        if let Err(e) = result {
            // Failure leaves everything disabled, phase short of Done.
            warn!(error = %e, completed = ?self.completed, "homing aborted");
            axes.halt(hal);
            return Err(e);
        }

        // Restore position control, re-enable, zero the reference.
        for axis in LINEAR_AXES {
            hal.axis_set_raw_mode(axis, false)?;
            hal.axis_enable(axis, true)?;
            hal.axis_move_counts(axis, 0)?;
            axes.set_axis_state(axis, AxisState::PositionControl);
        }
        axes.reset_to_zero(config.tilt.center_deg);
        axes.set_tilt(hal, config.tilt.center_deg)
            .map_err(|_| HomingError::Hal(HalError::Io("tilt center".into())))?;

        self.completed = Some(HomingPhase::Done);
        self.homed = true;
        info!("homing sequence complete");
        Ok(())
    }

    /// Home a single linear axis (host `HOME:X|Y|Z`).
    ///
    /// Uses the same raw-mode edge search as the full sequence but
    /// leaves the overall homed flag untouched unless it was never set.
    pub fn run_axis<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        axes: &mut AxisController,
        config: &RigConfig,
        axis: LinearAxis,
    ) -> Result<(), HomingError> {
        info!(axis = %axis.letter(), "single-axis homing started");
        hal.axis_set_raw_mode(axis, true)?;
        hal.axis_enable(axis, true)?;
        axes.set_axis_state(axis, AxisState::Homing);

        if let Err(e) = self.seek_limit(hal, safety, config, axis) {
            warn!(axis = %axis.letter(), error = %e, "single-axis homing aborted");
            axes.halt(hal);
            return Err(e);
        }

        hal.axis_set_raw_mode(axis, false)?;
        hal.axis_enable(axis, true)?;
        hal.axis_move_counts(axis, 0)?;
        axes.set_axis_state(axis, AxisState::PositionControl);
        info!(axis = %axis.letter(), "single-axis homing complete");
        Ok(())
    }

    // ── Phases ──

    fn run_phases<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        config: &RigConfig,
    ) -> Result<(), HomingError> {
        for (phase, axis) in [
            (HomingPhase::Z, LinearAxis::Z),
            (HomingPhase::X, LinearAxis::X),
            (HomingPhase::Y, LinearAxis::Y),
        ] {
            self.seek_limit(hal, safety, config, axis)?;
            self.completed = Some(phase);
        }

        self.zero_pan(hal, safety, config)?;
        self.completed = Some(HomingPhase::Pan);

        // TiltCenter itself is applied by the caller's restore path;
        // reaching here means every driven phase succeeded.
        self.completed = Some(HomingPhase::TiltCenter);
        Ok(())
    }

    /// Step one linear axis toward its reference edge until its limit
    /// input asserts.
    fn seek_limit<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        config: &RigConfig,
        axis: LinearAxis,
    ) -> Result<(), HomingError> {
        let axis_config = config.axis(axis);
        let delay = Duration::from_micros(axis_config.homing_step_delay_us);
        // 125% of configured travel, in counts, bounds the search.
        let budget = (axis_config.travel_mm * axis_config.counts_per_mm * 1.25) as u64;
        let phase = match axis {
            LinearAxis::X => HomingPhase::X,
            LinearAxis::Y => HomingPhase::Y,
            LinearAxis::Z => HomingPhase::Z,
        };

        let mut found = false;
        for _ in 0..budget {
            if hal.limit_asserted(axis) {
                found = true;
                break;
            }
            // The homed axis's own limit is the success condition, not
            // a fault; everything else trips the sequence.
            let state = safety.check_excluding(hal, Some(axis));
            if !state.motion_permitted() {
                return Err(HomingError::SafetyTrip(state));
            }
            hal.axis_step(axis, StepDirection::Negative)?;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        if !found {
            return Err(HomingError::StepBudgetExhausted(phase));
        }

        // Step back off until the switch releases so the parked axis
        // does not hold its limit asserted through the later phases.
        for _ in 0..RELEASE_BACKOFF_BUDGET {
            if !hal.limit_asserted(axis) {
                return Ok(());
            }
            let state = safety.check_excluding(hal, Some(axis));
            if !state.motion_permitted() {
                return Err(HomingError::SafetyTrip(state));
            }
            hal.axis_step(axis, StepDirection::Positive)?;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        Err(HomingError::StepBudgetExhausted(phase))
    }

    /// Two-pass pan zero against the single flag sensor.
    fn zero_pan<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        config: &RigConfig,
    ) -> Result<(), HomingError> {
        let pan = &config.pan;
        // A little over one full revolution bounds the first pass.
        let budget = (400.0 * pan.steps_per_degree) as u64;

        // Pass 1: slow approach until the flag asserts.
        self.pan_seek_flag(
            hal,
            safety,
            budget,
            Duration::from_micros(pan.zero_approach_delay_us),
        )?;

        // Back off a fixed step count to release the flag.
        for _ in 0..pan.zero_backoff_steps {
            let state = safety.check(hal);
            if !state.motion_permitted() {
                return Err(HomingError::SafetyTrip(state));
            }
            hal.pan_step(StepDirection::Positive)?;
            std::thread::sleep(Duration::from_micros(pan.zero_approach_delay_us));
        }

        // Pass 2: crawl back in until the flag re-asserts. The slower
        // rate removes backlash and overshoot from the reference.
        self.pan_seek_flag(
            hal,
            safety,
            (pan.zero_backoff_steps as u64) * 4,
            Duration::from_micros(pan.zero_crawl_delay_us),
        )?;
        Ok(())
    }

    fn pan_seek_flag<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
        budget: u64,
        delay: Duration,
    ) -> Result<(), HomingError> {
        for _ in 0..budget {
            if hal.pan_zero_flag() {
                return Ok(());
            }
            let state = safety.check(hal);
            if !state.motion_permitted() {
                return Err(HomingError::SafetyTrip(state));
            }
            hal.pan_step(StepDirection::Negative)?;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        Err(HomingError::StepBudgetExhausted(HomingPhase::Pan))
    }
}

impl Default for HomingSequencer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHal;
    use rig_common::state::Position;

    fn fast_config() -> RigConfig {
        RigConfig::from_toml(
            r#"
[x]
homing_step_delay_us = 0
travel_mm = 50.0
[y]
homing_step_delay_us = 0
travel_mm = 50.0
[z]
homing_step_delay_us = 0
travel_mm = 50.0

[pan]
zero_approach_delay_us = 0
zero_crawl_delay_us = 0
zero_backoff_steps = 10
step_delay_us = 0

[cycle]
move_settle_ms = 0
"#,
        )
        .unwrap()
    }

    #[test]
    fn full_sequence_succeeds() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        homing
            .run_all(&mut hal, &mut safety, &mut axes, &config)
            .unwrap();

        assert!(homing.is_homed());
        assert_eq!(homing.last_completed(), Some(HomingPhase::Done));
        assert!(axes.all_position_control());
        assert_eq!(
            axes.position(),
            Position {
                tilt: config.tilt.center_deg,
                ..Position::ZERO
            }
        );
        // Pan sits on the zero flag after the two-pass approach.
        assert!(hal.pan_zero_flag());
    }

    #[test]
    fn estop_mid_sequence_aborts_short_of_done() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        // Trip e-stop while Z is still seeking.
        hal.set_estop_input(true);
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        let err = homing
            .run_all(&mut hal, &mut safety, &mut axes, &config)
            .unwrap_err();

        assert!(matches!(err, HomingError::SafetyTrip(SafetyState::Estop)));
        assert!(!homing.is_homed());
        assert_ne!(homing.last_completed(), Some(HomingPhase::Done));
        // All axes left disabled.
        for axis in LINEAR_AXES {
            assert_eq!(axes.axis_state(axis), AxisState::Disabled);
            assert!(!hal.axis_enabled(axis));
        }
    }

    #[test]
    fn other_axis_limit_aborts_current_phase() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        // X's limit stuck asserted while Z homes first.
        hal.force_limit(LinearAxis::X, true);
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        let err = homing
            .run_all(&mut hal, &mut safety, &mut axes, &config)
            .unwrap_err();
        assert!(matches!(
            err,
            HomingError::SafetyTrip(SafetyState::LimitTripped)
        ));
        // Z never completed.
        assert_eq!(homing.last_completed(), None);
    }

    #[test]
    fn dead_switch_exhausts_step_budget() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        hal.disconnect_limit(LinearAxis::Z);
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        let err = homing
            .run_all(&mut hal, &mut safety, &mut axes, &config)
            .unwrap_err();
        assert!(matches!(
            err,
            HomingError::StepBudgetExhausted(HomingPhase::Z)
        ));
    }

    #[test]
    fn phases_complete_in_fixed_order() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        // Y's limit disconnected: Z and X complete, Y exhausts.
        hal.disconnect_limit(LinearAxis::Y);
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        let err = homing
            .run_all(&mut hal, &mut safety, &mut axes, &config)
            .unwrap_err();
        assert!(matches!(
            err,
            HomingError::StepBudgetExhausted(HomingPhase::Y)
        ));
        assert_eq!(homing.last_completed(), Some(HomingPhase::X));
    }

    #[test]
    fn single_axis_homing() {
        let config = fast_config();
        let mut hal = SimHal::new_unhomed();
        let mut safety = SafetyMonitor::new();
        let mut axes = AxisController::new(config.clone());
        let mut homing = HomingSequencer::new();

        homing
            .run_axis(&mut hal, &mut safety, &mut axes, &config, LinearAxis::Z)
            .unwrap();
        assert_eq!(axes.axis_state(LinearAxis::Z), AxisState::PositionControl);
        assert!(!homing.is_homed());
    }
}
