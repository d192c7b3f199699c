//! Prelude module for common re-exports.
//!
//! Consumers can `use rig_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, RigConfig};

// ─── State ──────────────────────────────────────────────────────────
pub use crate::state::{
    AxisState, BusOwner, HomingPhase, LINEAR_AXES, LinearAxis, Position, RigStatus, SafetyState,
};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{Command, ProtocolError, Response};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::{HalError, RigHal, StepDirection};
