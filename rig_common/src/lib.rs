//! Rig Common Library
//!
//! Shared types and definitions for the probe rig workspace crates.
//!
//! # Module Structure
//!
//! - [`state`] - Position and state-machine types shared across components
//! - [`config`] - Rig configuration loading and validation
//! - [`protocol`] - Host command channel wire format
//! - [`hal`] - Hardware access trait and error types
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod hal;
pub mod prelude;
pub mod protocol;
pub mod state;
