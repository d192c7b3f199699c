//! Kinematic solver: operator input to clamped absolute targets.
//!
//! Invoked once per input event, never polled and never blocking. Each
//! invocation adds a scaled displacement to the last commanded target,
//! then clamps every component independently: x, y, z stay inside the
//! workspace box minus the inward safety margin (the margin is reserved
//! for a future collision-aware clamp), tilt stays inside its angle
//! range, and pan wraps modulo 360 instead of clamping so continuous
//! rotation has no discontinuity in control feel.
//!
//! The solver's position is the last target it emitted, not a measured
//! value; the control unit's bookkeeping remains authoritative.

use rig_common::config::RigConfig;
use rig_common::state::{LINEAR_AXES, LinearAxis, Position, wrap_degrees};

// ─── Input Events ───────────────────────────────────────────────────

/// One discrete jog direction from the operator's button panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    XPlus,
    XMinus,
    YPlus,
    YMinus,
    ZPlus,
    ZMinus,
    /// Cancel the outstanding move and hold.
    Stop,
}

/// A continuous operator input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContinuousInput {
    /// Keyboard-style movement: each component is -1, 0 or 1.
    /// `forward` drives +x, `strafe` drives +y.
    Movement { forward: i8, strafe: i8 },
    /// Mouse-style look in device-relative units; x turns pan,
    /// y raises tilt. Not time-scaled.
    Look { dx: f64, dy: f64 },
}

/// What an input event asks the command channel to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverOutput {
    /// Emit an absolute move to this target.
    Target(Position),
    /// Emit a stop request; the solver's target is unchanged.
    Stop,
}

// ─── Solver ─────────────────────────────────────────────────────────

/// Pure input-to-target kinematics. Holds no hardware handles.
#[derive(Debug, Clone)]
pub struct KinematicSolver {
    config: RigConfig,
    /// Last commanded target; the solver's local notion of position.
    target: Position,
}

impl KinematicSolver {
    pub fn new(config: RigConfig) -> Self {
        let target = Position {
            tilt: config.tilt.center_deg,
            ..Position::ZERO
        };
        Self { config, target }
    }

    /// Last commanded target.
    #[inline]
    pub fn target(&self) -> Position {
        self.target
    }

    /// Re-seed the local target, e.g. from a `STATUS` reply after
    /// connecting or after the control unit re-homed.
    pub fn sync_to(&mut self, position: Position) {
        self.target = self.clamp(position);
    }

    /// Apply a continuous input event.
    ///
    /// Movement displacement is `rate * dt`, so the result is
    /// frame-rate independent; look events are already per-event
    /// deltas and ignore `dt`.
    pub fn apply_continuous(&mut self, input: ContinuousInput, dt_s: f64) -> Position {
        match input {
            ContinuousInput::Movement { forward, strafe } => {
                let step = self.config.solver.linear_rate_mm_s * dt_s.max(0.0);
                self.target.x += step * f64::from(forward.signum());
                self.target.y += step * f64::from(strafe.signum());
            }
            ContinuousInput::Look { dx, dy } => {
                self.target.pan += dx * self.config.solver.mouse_pan_scale;
                self.target.tilt += dy * self.config.solver.mouse_tilt_scale;
            }
        }
        self.target = self.clamp(self.target);
        self.target
    }

    /// Apply one discrete jog step.
    ///
    /// `Stop` produces a stop request rather than a target; the local
    /// target is left where it was so a later jog continues from it.
    pub fn apply_discrete(&mut self, direction: JogDirection) -> SolverOutput {
        let step = self.config.solver.jog_step_mm;
        match direction {
            JogDirection::XPlus => self.target.x += step,
            JogDirection::XMinus => self.target.x -= step,
            JogDirection::YPlus => self.target.y += step,
            JogDirection::YMinus => self.target.y -= step,
            JogDirection::ZPlus => self.target.z += step,
            JogDirection::ZMinus => self.target.z -= step,
            JogDirection::Stop => return SolverOutput::Stop,
        }
        self.target = self.clamp(self.target);
        SolverOutput::Target(self.target)
    }

    /// Component-wise clamp into the permitted envelope.
    pub fn clamp(&self, mut position: Position) -> Position {
        let margin = self.config.workspace.margin_mm;
        for axis in LINEAR_AXES {
            let max = self.config.workspace_max(axis) - margin;
            let value = position.linear(axis).clamp(margin, max);
            position.set_linear(axis, value);
        }
        position.pan = wrap_degrees(position.pan);
        position.tilt = position
            .tilt
            .clamp(self.config.tilt.min_deg, self.config.tilt.max_deg);
        position
    }

    /// Inclusive linear bounds for one axis, margin applied.
    pub fn axis_bounds(&self, axis: LinearAxis) -> (f64, f64) {
        let margin = self.config.workspace.margin_mm;
        (margin, self.config.workspace_max(axis) - margin)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> KinematicSolver {
        // Defaults: workspace 780/580/300, margin 5, rate 120 mm/s,
        // jog 10 mm, pan scale 0.15, tilt scale 0.10, tilt +/-45.
        KinematicSolver::new(RigConfig::default())
    }

    #[test]
    fn movement_scales_with_delta_time() {
        let mut s = solver();
        s.sync_to(Position {
            x: 100.0,
            y: 100.0,
            ..Position::ZERO
        });

        let out = s.apply_continuous(ContinuousInput::Movement { forward: 1, strafe: 0 }, 0.1);
        assert_eq!(out.x, 112.0);
        assert_eq!(out.y, 100.0);

        let out = s.apply_continuous(ContinuousInput::Movement { forward: 0, strafe: -1 }, 0.5);
        assert_eq!(out.y, 40.0);
    }

    #[test]
    fn negative_delta_time_moves_nothing() {
        let mut s = solver();
        let before = s.target();
        let out = s.apply_continuous(ContinuousInput::Movement { forward: 1, strafe: 1 }, -0.5);
        assert_eq!(out, s.clamp(before));
    }

    #[test]
    fn clamp_never_leaves_workspace_box() {
        let s = solver();
        let clamped = s.clamp(Position {
            x: 5000.0,
            y: -5000.0,
            z: 301.0,
            ..Position::ZERO
        });
        assert_eq!(clamped.x, 775.0);
        assert_eq!(clamped.y, 5.0);
        assert_eq!(clamped.z, 295.0);
    }

    #[test]
    fn forward_near_boundary_clamps_to_margin() {
        let mut s = solver();
        s.sync_to(Position {
            x: 770.0,
            y: 100.0,
            z: 100.0,
            ..Position::ZERO
        });
        // Forward from x=770: 770 + 120 mm/s * 0.1 s would overshoot
        // the +x boundary; the clamp pins it at max minus margin.
        let out = s.apply_continuous(ContinuousInput::Movement { forward: 1, strafe: 0 }, 0.1);
        assert_eq!(out.x, 775.0);
        assert_eq!(out.y, 100.0);

        // Repeated pushes stay pinned at the margin boundary.
        let out = s.apply_continuous(ContinuousInput::Movement { forward: 1, strafe: 0 }, 10.0);
        assert_eq!(out.x, 775.0);
    }

    #[test]
    fn pan_wraps_instead_of_clamping() {
        let mut s = solver();

        // Crossing 0 downward wraps to just under 360.
        let out = s.apply_continuous(ContinuousInput::Look { dx: -100.0, dy: 0.0 }, 0.0);
        assert_eq!(out.pan, 345.0);

        // Crossing 360 upward wraps back above 0.
        let out = s.apply_continuous(ContinuousInput::Look { dx: 200.0, dy: 0.0 }, 0.0);
        assert!((out.pan - 15.0).abs() < 1e-9);
        assert!((0.0..360.0).contains(&out.pan));
    }

    #[test]
    fn tilt_clamps_to_range() {
        let mut s = solver();
        let out = s.apply_continuous(ContinuousInput::Look { dx: 0.0, dy: 1000.0 }, 0.0);
        assert_eq!(out.tilt, 45.0);
        let out = s.apply_continuous(ContinuousInput::Look { dx: 0.0, dy: -5000.0 }, 0.0);
        assert_eq!(out.tilt, -45.0);
    }

    #[test]
    fn jog_steps_and_clamps() {
        let mut s = solver();
        s.sync_to(Position {
            x: 100.0,
            y: 100.0,
            z: 290.0,
            ..Position::ZERO
        });

        match s.apply_discrete(JogDirection::XPlus) {
            SolverOutput::Target(t) => assert_eq!(t.x, 110.0),
            SolverOutput::Stop => panic!("expected a target"),
        }
        // A z+ jog from 290 would cross the margin boundary at 295.
        match s.apply_discrete(JogDirection::ZPlus) {
            SolverOutput::Target(t) => assert_eq!(t.z, 295.0),
            SolverOutput::Stop => panic!("expected a target"),
        }
    }

    #[test]
    fn stop_jog_preserves_target() {
        let mut s = solver();
        s.apply_discrete(JogDirection::YPlus);
        let before = s.target();
        assert_eq!(s.apply_discrete(JogDirection::Stop), SolverOutput::Stop);
        assert_eq!(s.target(), before);
    }

    #[test]
    fn sync_clamps_reported_position() {
        let mut s = solver();
        s.sync_to(Position {
            x: -20.0,
            pan: 725.0,
            ..Position::ZERO
        });
        assert_eq!(s.target().x, 5.0);
        assert_eq!(s.target().pan, 5.0);
    }
}
