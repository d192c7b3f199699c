//! Shared state types for the probe rig.
//!
//! Defines `Position`, `LinearAxis`, `AxisState`, `SafetyState`,
//! `HomingPhase`, `BusOwner`, and the `RigStatus` snapshot.
//!
//! The authoritative mutable copy of `Position` lives inside the axis
//! controller; every other component reads a snapshot and never mutates
//! it directly.

use serde::{Deserialize, Serialize};

// ─── Linear Axes ────────────────────────────────────────────────────

/// One of the three linear gantry axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinearAxis {
    /// Horizontal travel across the model.
    X = 0,
    /// Horizontal travel along the model.
    Y = 1,
    /// Vertical travel (carries the probe payload).
    Z = 2,
}

/// All linear axes, in index order.
pub const LINEAR_AXES: [LinearAxis; 3] = [LinearAxis::X, LinearAxis::Y, LinearAxis::Z];

impl LinearAxis {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            _ => None,
        }
    }

    /// Index into per-axis arrays.
    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Axis letter for protocol messages and logs.
    pub const fn letter(&self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
        }
    }
}

// ─── Position ───────────────────────────────────────────────────────

/// Full rig pose: three linear coordinates plus pan and tilt angles.
///
/// Linear coordinates are millimetres from the homed zero reference.
/// `pan` is degrees in `[0, 360)`; `tilt` is degrees within the
/// configured tilt range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pan: f64,
    pub tilt: f64,
}

impl Position {
    /// The all-zero reference pose established by homing.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        pan: 0.0,
        tilt: 0.0,
    };

    /// Linear coordinate for the given axis.
    #[inline]
    pub fn linear(&self, axis: LinearAxis) -> f64 {
        match axis {
            LinearAxis::X => self.x,
            LinearAxis::Y => self.y,
            LinearAxis::Z => self.z,
        }
    }

    /// Set the linear coordinate for the given axis.
    #[inline]
    pub fn set_linear(&mut self, axis: LinearAxis, value: f64) {
        match axis {
            LinearAxis::X => self.x = value,
            LinearAxis::Y => self.y = value,
            LinearAxis::Z => self.z = value,
        }
    }
}

// ─── Angle Helpers ──────────────────────────────────────────────────

/// Normalize an angle into `[0, 360)`.
#[inline]
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid(360.0) can return exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Shortest signed rotation from `current` to `target`, in `(-180, 180]`.
#[inline]
pub fn shortest_pan_delta(current: f64, target: f64) -> f64 {
    let delta = wrap_degrees(target) - wrap_degrees(current);
    if delta > 180.0 {
        delta - 360.0
    } else if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

// ─── Axis State ─────────────────────────────────────────────────────

/// Per-linear-axis drive state.
///
/// Moves are accepted only when ALL linear axes are `PositionControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AxisState {
    /// Drive disabled, no holding torque.
    Disabled = 0,
    /// Raw step/dir mode during a homing sequence.
    Homing = 1,
    /// Closed position loop, accepting absolute count targets.
    PositionControl = 2,
    /// Drive reported a fault; requires re-homing.
    Faulted = 3,
}

impl AxisState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Homing),
            2 => Some(Self::PositionControl),
            3 => Some(Self::Faulted),
            _ => None,
        }
    }
}

impl Default for AxisState {
    fn default() -> Self {
        Self::Disabled
    }
}

// ─── Safety State ───────────────────────────────────────────────────

/// Global safety state.
///
/// Transitions into `LimitTripped`/`Estop` are made solely by the safety
/// monitor. A tripped state is sticky: it is only ever cleared by a
/// validated `RESET_ESTOP` request, never automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SafetyState {
    /// Normal operation, motion permitted.
    Normal = 0,
    /// A hardware limit switch asserted during operation.
    LimitTripped = 1,
    /// Emergency stop input asserted or an explicit `ESTOP` request.
    Estop = 2,
}

impl SafetyState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::LimitTripped),
            2 => Some(Self::Estop),
            _ => None,
        }
    }

    /// True when motion commands may reach the axis controller.
    #[inline]
    pub const fn motion_permitted(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl Default for SafetyState {
    fn default() -> Self {
        Self::Normal
    }
}

// ─── Homing Phase ───────────────────────────────────────────────────

/// Ordered homing phases.
///
/// Z is always homed first (falling-payload risk), then X and Y, pan
/// last among the driven axes, and finally tilt is parked at centre.
/// The phase only ever advances forward; a safety trip leaves it at the
/// last completed value so a later homing request restarts from `Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HomingPhase {
    Z = 0,
    X = 1,
    Y = 2,
    Pan = 3,
    TiltCenter = 4,
    Done = 5,
}

impl HomingPhase {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Z),
            1 => Some(Self::X),
            2 => Some(Self::Y),
            3 => Some(Self::Pan),
            4 => Some(Self::TiltCenter),
            5 => Some(Self::Done),
            _ => None,
        }
    }

    /// Next phase in the fixed order, or `None` from `Done`.
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Z => Some(Self::X),
            Self::X => Some(Self::Y),
            Self::Y => Some(Self::Pan),
            Self::Pan => Some(Self::TiltCenter),
            Self::TiltCenter => Some(Self::Done),
            Self::Done => None,
        }
    }
}

// ─── Bus Owner ──────────────────────────────────────────────────────

/// Which peripheral currently owns the shared serial line.
///
/// Exactly one owner at any time; switching requires the configured
/// settle delay before traffic is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BusOwner {
    /// Distance sensor.
    Sensor = 0,
    /// Remote tilt actuator.
    Actuator = 1,
}

impl BusOwner {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Sensor),
            1 => Some(Self::Actuator),
            _ => None,
        }
    }
}

// ─── Status Snapshot ────────────────────────────────────────────────

/// Read-only status snapshot for the `STATUS` reply and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RigStatus {
    /// Last bookkeeping position.
    pub position: Position,
    /// True while any safety trip is latched.
    pub estop: bool,
    /// True while a move is outstanding.
    pub moving: bool,
    /// True once a full homing sequence has completed.
    pub homed: bool,
}

impl RigStatus {
    /// Render the `STATUS` reply payload.
    pub fn to_reply(&self) -> String {
        format!(
            "X={:.2},Y={:.2},Z={:.2},PAN={:.2},TILT={:.2},ESTOP={},MOVING={},HOMED={}",
            self.position.x,
            self.position.y,
            self.position.z,
            self.position.pan,
            self.position.tilt,
            self.estop as u8,
            self.moving as u8,
            self.homed as u8,
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
