//! # Rig Host Library
//!
//! Host-side half of the probe rig: turns operator input events into
//! absolute motion targets and forwards them over the one-command-in-
//! flight host channel. The solver never touches hardware; the control
//! unit's safety monitor and axis controller remain the sole executors
//! and the sole source of truth for the physically realized position.

pub mod client;
pub mod solver;
