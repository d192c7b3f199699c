//! Axis controller: per-axis enable/position state and point-to-point moves.
//!
//! Owns the one authoritative bookkeeping [`Position`]. Linear targets
//! are converted to motion-unit counts through the configured scale
//! factor and issued as absolute moves; pan is issued as a relative
//! step count from the shortest wraparound delta and advanced a bounded
//! burst of steps per cycle; tilt maps its angle range linearly onto a
//! pulse-width range.
//!
//! The pan stepper is open loop: there is no position feedback, so its
//! logical angle is this controller's step bookkeeping, re-referenced
//! only by homing against the zero flag. This dead-reckoning limitation
//! is deliberate.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use rig_common::config::RigConfig;
use rig_common::hal::{HalError, RigHal, StepDirection};
use rig_common::state::{
    AxisState, LINEAR_AXES, LinearAxis, Position, shortest_pan_delta, wrap_degrees,
};

use crate::safety::SafetyMonitor;

/// Errors from move acceptance.
#[derive(Debug, Error)]
pub enum AxisError {
    /// A linear axis is not in position-control mode.
    #[error("axis {axis} not ready for motion (state {state:?})")]
    NotReady {
        axis: char,
        state: AxisState,
    },

    #[error(transparent)]
    Hal(#[from] HalError),
}

/// Per-axis drive state plus move bookkeeping.
#[derive(Debug)]
pub struct AxisController {
    config: RigConfig,
    /// Authoritative bookkeeping position.
    position: Position,
    /// Outstanding move target.
    target: Position,
    states: [AxisState; 3],
    /// Signed pan steps still to emit for the outstanding move.
    pan_steps_remaining: i64,
    is_moving: bool,
    /// When the outstanding move was issued, for settle debouncing.
    move_issued_at: Option<Instant>,
}

impl AxisController {
    pub fn new(config: RigConfig) -> Self {
        Self {
            config,
            position: Position::ZERO,
            target: Position::ZERO,
            states: [AxisState::Disabled; 3],
            pan_steps_remaining: 0,
            is_moving: false,
            move_issued_at: None,
        }
    }

    // ── Accessors ──

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    #[inline]
    pub fn axis_state(&self, axis: LinearAxis) -> AxisState {
        self.states[axis.index()]
    }

    /// Set by the homing sequencer as it walks axes through modes.
    pub fn set_axis_state(&mut self, axis: LinearAxis, state: AxisState) {
        self.states[axis.index()] = state;
    }

    /// True when every linear axis will accept an absolute move.
    pub fn all_position_control(&self) -> bool {
        self.states
            .iter()
            .all(|s| *s == AxisState::PositionControl)
    }

    /// Reset bookkeeping to the homed zero reference.
    pub fn reset_to_zero(&mut self, tilt_center: f64) {
        self.position = Position {
            tilt: tilt_center,
            ..Position::ZERO
        };
        self.target = self.position;
        self.pan_steps_remaining = 0;
        self.is_moving = false;
        self.move_issued_at = None;
    }

    // ── Moves ──

    /// Issue an absolute point-to-point move.
    ///
    /// Precondition (enforced here): all linear axes in position
    /// control. The safety gate is the caller's responsibility and is
    /// re-checked every cycle in [`update`](Self::update).
    pub fn move_to<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        target: Position,
    ) -> Result<(), AxisError> {
        for axis in LINEAR_AXES {
            let state = self.states[axis.index()];
            if state != AxisState::PositionControl {
                return Err(AxisError::NotReady {
                    axis: axis.letter(),
                    state,
                });
            }
        }

        for axis in LINEAR_AXES {
            let counts = self.mm_to_counts(axis, target.linear(axis));
            hal.axis_move_counts(axis, counts)?;
        }

        // Pan: relative steps from the shortest wraparound delta.
        let pan_target = wrap_degrees(target.pan);
        let delta = shortest_pan_delta(self.position.pan, pan_target);
        self.pan_steps_remaining = (delta * self.config.pan.steps_per_degree).round() as i64;

        self.set_tilt(hal, target.tilt)?;

        self.target = Position {
            pan: pan_target,
            tilt: self.position.tilt,
            ..target
        };
        self.is_moving = true;
        self.move_issued_at = Some(Instant::now());
        debug!(?target, pan_steps = self.pan_steps_remaining, "move issued");
        Ok(())
    }

    /// Drive the local tilt actuator to an angle (clamped to range).
    pub fn set_tilt<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        angle: f64,
    ) -> Result<(), AxisError> {
        let clamped = angle.clamp(self.config.tilt.min_deg, self.config.tilt.max_deg);
        hal.tilt_set_pulse_us(self.tilt_pulse_us(clamped))?;
        self.position.tilt = clamped;
        self.target.tilt = clamped;
        Ok(())
    }

    /// Record a tilt angle that was commanded through the remote
    /// actuator path, keeping the bookkeeping position coherent.
    pub fn record_tilt(&mut self, angle: f64) {
        let clamped = angle.clamp(self.config.tilt.min_deg, self.config.tilt.max_deg);
        self.position.tilt = clamped;
        self.target.tilt = clamped;
    }

    /// Arrival check: every linear axis reports step completion, no pan
    /// steps outstanding, and the minimum settle time has elapsed since
    /// the move was issued (debounces drive-electronics settling).
    pub fn is_at_target<H: RigHal + ?Sized>(&self, hal: &H) -> bool {
        if self.pan_steps_remaining != 0 {
            return false;
        }
        if !LINEAR_AXES.iter().all(|axis| hal.axis_step_done(*axis)) {
            return false;
        }
        match self.move_issued_at {
            Some(issued) => {
                issued.elapsed() >= Duration::from_millis(self.config.cycle.move_settle_ms)
            }
            None => true,
        }
    }

    /// Per-cycle update.
    ///
    /// Re-invokes the safety monitor, emits a bounded burst of pan
    /// steps (each preceded by a safety poll), and clears the moving
    /// flag once the target is reached.
    pub fn update<H: RigHal + ?Sized>(&mut self, hal: &mut H, safety: &mut SafetyMonitor) {
        if !safety.check(hal).motion_permitted() {
            self.halt(hal);
            return;
        }

        if self.pan_steps_remaining != 0 {
            if let Err(e) = self.emit_pan_burst(hal, safety) {
                debug!(error = %e, "pan step failed, holding");
            }
        }

        if self.is_moving && self.is_at_target(hal) {
            self.position.x = self.target.x;
            self.position.y = self.target.y;
            self.position.z = self.target.z;
            self.is_moving = false;
            debug!(position = ?self.position, "move complete");
        }
    }

    /// Soft stop: cancel the outstanding move and hold position.
    ///
    /// Axes stay enabled; the drives are re-targeted to the current
    /// bookkeeping position. This is not an emergency stop.
    pub fn stop<H: RigHal + ?Sized>(&mut self, hal: &mut H) -> Result<(), AxisError> {
        self.pan_steps_remaining = 0;
        if self.all_position_control() {
            for axis in LINEAR_AXES {
                let counts = self.mm_to_counts(axis, self.position.linear(axis));
                hal.axis_move_counts(axis, counts)?;
            }
        }
        self.target = self.position;
        self.is_moving = false;
        self.move_issued_at = None;
        Ok(())
    }

    /// Hard halt after a safety trip: deassert every axis enable,
    /// cancel the in-progress move, force `is_moving` false.
    ///
    /// Idempotent; called every cycle while a trip is latched.
    pub fn halt<H: RigHal + ?Sized>(&mut self, hal: &mut H) {
        self.pan_steps_remaining = 0;
        self.is_moving = false;
        self.move_issued_at = None;
        self.target = self.position;
        for axis in LINEAR_AXES {
            if self.states[axis.index()] != AxisState::Disabled {
                // Enable deassert must not be skipped on pin errors.
                let _ = hal.axis_enable(axis, false);
                self.states[axis.index()] = AxisState::Disabled;
            }
        }
    }

    // ── Internals ──

    fn emit_pan_burst<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        safety: &mut SafetyMonitor,
    ) -> Result<(), HalError> {
        let dir = if self.pan_steps_remaining > 0 {
            StepDirection::Positive
        } else {
            StepDirection::Negative
        };
        let deg_per_step = 1.0 / self.config.pan.steps_per_degree;
        let delay = Duration::from_micros(self.config.pan.step_delay_us);

        for _ in 0..self.config.pan.steps_per_cycle {
            if self.pan_steps_remaining == 0 {
                break;
            }
            if !safety.check(hal).motion_permitted() {
                self.halt(hal);
                break;
            }
            hal.pan_step(dir)?;
            self.pan_steps_remaining -= dir.sign();
            self.position.pan =
                wrap_degrees(self.position.pan + deg_per_step * dir.sign() as f64);
            if self.pan_steps_remaining != 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        if self.pan_steps_remaining == 0 {
            // Snap bookkeeping to the exact target to shed rounding.
            self.position.pan = self.target.pan;
        }
        Ok(())
    }

    fn mm_to_counts(&self, axis: LinearAxis, mm: f64) -> i64 {
        (mm * self.config.axis(axis).counts_per_mm).round() as i64
    }

    fn tilt_pulse_us(&self, angle: f64) -> u16 {
        let t = &self.config.tilt;
        let span_deg = t.max_deg - t.min_deg;
        let span_us = (t.max_pulse_us - t.min_pulse_us) as f64;
        let frac = (angle - t.min_deg) / span_deg;
        (t.min_pulse_us as f64 + frac * span_us).round() as u16
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHal;
    use rig_common::config::RigConfig;

    fn test_config() -> RigConfig {
        RigConfig::from_toml(
            r#"
[pan]
step_delay_us = 0
steps_per_cycle = 10000

[cycle]
move_settle_ms = 0
"#,
        )
        .unwrap()
    }

    fn ready_controller(config: RigConfig) -> AxisController {
        let mut axes = AxisController::new(config);
        for axis in LINEAR_AXES {
            axes.set_axis_state(axis, AxisState::PositionControl);
        }
        axes
    }

    #[test]
    fn move_rejected_when_axes_disabled() {
        let mut hal = SimHal::new_homed();
        let mut axes = AxisController::new(test_config());
        let err = axes
            .move_to(
                &mut hal,
                Position {
                    x: 10.0,
                    ..Position::ZERO
                },
            )
            .unwrap_err();
        assert!(matches!(err, AxisError::NotReady { axis: 'X', .. }));
        assert!(!axes.is_moving());
    }

    #[test]
    fn move_converts_mm_to_counts() {
        let mut hal = SimHal::new_homed();
        let mut axes = ready_controller(test_config());
        axes.move_to(
            &mut hal,
            Position {
                x: 100.5,
                y: 200.3,
                z: 50.0,
                ..Position::ZERO
            },
        )
        .unwrap();
        // Default scale is 80 counts/mm.
        assert_eq!(hal.commanded_counts(LinearAxis::X), 8040);
        assert_eq!(hal.commanded_counts(LinearAxis::Y), 16024);
        assert_eq!(hal.commanded_counts(LinearAxis::Z), 4000);
        assert!(axes.is_moving());
    }

    #[test]
    fn move_completes_and_updates_position() {
        let mut hal = SimHal::new_homed();
        let mut safety = SafetyMonitor::new();
        let mut axes = ready_controller(test_config());
        let target = Position {
            x: 100.5,
            y: 200.3,
            z: 50.0,
            ..Position::ZERO
        };
        axes.move_to(&mut hal, target).unwrap();
        axes.update(&mut hal, &mut safety);
        assert!(!axes.is_moving());
        assert_eq!(axes.position().x, 100.5);
        assert_eq!(axes.position().y, 200.3);
        assert_eq!(axes.position().z, 50.0);
    }

    #[test]
    fn settle_time_debounces_arrival() {
        let config = RigConfig::from_toml(
            r#"
[pan]
step_delay_us = 0
steps_per_cycle = 10000

[cycle]
move_settle_ms = 40
"#,
        )
        .unwrap();
        let mut hal = SimHal::new_homed();
        let mut safety = SafetyMonitor::new();
        let mut axes = ready_controller(config);
        axes.move_to(
            &mut hal,
            Position {
                x: 5.0,
                ..Position::ZERO
            },
        )
        .unwrap();

        // Drive reports done immediately, but settle has not elapsed.
        axes.update(&mut hal, &mut safety);
        assert!(axes.is_moving());

        std::thread::sleep(Duration::from_millis(50));
        axes.update(&mut hal, &mut safety);
        assert!(!axes.is_moving());
    }

    #[test]
    fn pan_takes_shortest_path() {
        let mut hal = SimHal::new_homed();
        let mut safety = SafetyMonitor::new();
        let mut axes = ready_controller(test_config());

        axes.move_to(
            &mut hal,
            Position {
                pan: 350.0,
                ..Position::ZERO
            },
        )
        .unwrap();
        axes.update(&mut hal, &mut safety);
        assert_eq!(axes.position().pan, 350.0);
        // Shortest path from 0 to 350 is -10 degrees of steps.
        let steps_per_deg = RigConfig::default().pan.steps_per_degree;
        let expected = (-10.0 * steps_per_deg).round() as i64;
        assert_eq!(hal.pan_step_count(), expected);
    }

    #[test]
    fn tilt_maps_angle_to_pulse_width() {
        let mut hal = SimHal::new_homed();
        let mut axes = ready_controller(test_config());

        axes.set_tilt(&mut hal, 0.0).unwrap();
        assert_eq!(hal.tilt_pulse_us(), 1500);

        axes.set_tilt(&mut hal, 45.0).unwrap();
        assert_eq!(hal.tilt_pulse_us(), 2000);

        axes.set_tilt(&mut hal, -45.0).unwrap();
        assert_eq!(hal.tilt_pulse_us(), 1000);

        // Out-of-range angles clamp to the tilt range.
        axes.set_tilt(&mut hal, 90.0).unwrap();
        assert_eq!(hal.tilt_pulse_us(), 2000);
        assert_eq!(axes.position().tilt, 45.0);
    }

    #[test]
    fn trip_during_update_halts_and_disables() {
        let mut hal = SimHal::new_homed();
        let mut safety = SafetyMonitor::new();
        let mut axes = ready_controller(test_config());
        axes.move_to(
            &mut hal,
            Position {
                x: 50.0,
                ..Position::ZERO
            },
        )
        .unwrap();

        hal.set_estop_input(true);
        axes.update(&mut hal, &mut safety);

        assert!(!axes.is_moving());
        for axis in LINEAR_AXES {
            assert_eq!(axes.axis_state(axis), AxisState::Disabled);
            assert!(!hal.axis_enabled(axis));
        }
    }

    #[test]
    fn stop_holds_current_position() {
        let mut hal = SimHal::new_homed();
        let mut axes = ready_controller(test_config());
        axes.move_to(
            &mut hal,
            Position {
                x: 50.0,
                ..Position::ZERO
            },
        )
        .unwrap();
        axes.stop(&mut hal).unwrap();
        assert!(!axes.is_moving());
        // Drives re-targeted to the bookkeeping position (still 0).
        assert_eq!(hal.commanded_counts(LinearAxis::X), 0);
    }

    #[test]
    fn reset_to_zero_centers_tilt() {
        let mut axes = ready_controller(test_config());
        axes.reset_to_zero(0.0);
        assert_eq!(axes.position(), Position::ZERO);
        assert!(!axes.is_moving());
    }
}
