//! # Rig Control Unit Library
//!
//! Motion coordination and safety layer for the probe rig. Owns the
//! physical axes, enforces hardware safety independent of any host,
//! sequences homing, arbitrates the shared peripheral bus, and serves
//! the textual host command channel.
//!
//! ## Architecture
//!
//! 1. **SafetyMonitor** — sole authority over `SafetyState`
//! 2. **AxisController** — per-axis enable/position state, point-to-point moves
//! 3. **HomingSequencer** — fixed-order reference establishment
//! 4. **DeviceMux** — exclusive ownership of the shared serial line
//! 5. **CommandBridge** — parse/validate/dispatch of host commands
//! 6. **Control cycle** — single cooperative loop tying it together
//!
//! The only cancellation mechanism is the safety poll inside every
//! blocking step loop; there is no separate cancel signal.

pub mod axis;
pub mod bridge;
pub mod bus;
pub mod cycle;
pub mod homing;
pub mod safety;
pub mod sim;
