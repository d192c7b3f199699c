//! Host command client: input events in, protocol round-trips out.
//!
//! Wraps the solver and a [`CommandChannel`]. Every emitted command is
//! a full round-trip honoring the control unit's one-command-in-flight
//! discipline; no lock is held across a round-trip because the client
//! itself is the only sender on its channel.

use thiserror::Error;
use tracing::{debug, warn};

use rig_common::protocol::{Command, Response};
use rig_common::state::Position;

use crate::solver::{ContinuousInput, JogDirection, KinematicSolver, SolverOutput};

/// Failures on the host side of the command channel.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport failed before a response arrived.
    #[error("channel failure: {0}")]
    Channel(String),

    /// The control unit answered `ERROR:...`.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// An `OK` reply that does not parse as expected.
    #[error("unexpected reply: {0}")]
    BadReply(String),
}

/// Ordered, reliable request/response channel to the control unit.
pub trait CommandChannel {
    /// Send one command and block until its response arrives.
    fn round_trip(&mut self, command: &Command) -> Result<Response, ClientError>;
}

/// Operator-facing client: solver plus channel.
pub struct RigClient<C: CommandChannel> {
    solver: KinematicSolver,
    channel: C,
}

impl<C: CommandChannel> RigClient<C> {
    pub fn new(solver: KinematicSolver, channel: C) -> Self {
        Self { solver, channel }
    }

    #[inline]
    pub fn solver(&self) -> &KinematicSolver {
        &self.solver
    }

    /// Handle one continuous input event: solve, then emit the move.
    pub fn handle_continuous(
        &mut self,
        input: ContinuousInput,
        dt_s: f64,
    ) -> Result<Position, ClientError> {
        let target = self.solver.apply_continuous(input, dt_s);
        self.emit_move(target)?;
        Ok(target)
    }

    /// Handle one discrete jog event.
    pub fn handle_jog(&mut self, direction: JogDirection) -> Result<(), ClientError> {
        match self.solver.apply_discrete(direction) {
            SolverOutput::Target(target) => self.emit_move(target).map(|_| ()),
            SolverOutput::Stop => {
                let cmd = command("STOP", &[]);
                self.expect_ok(&cmd).map(|_| ())
            }
        }
    }

    /// Re-seed the solver from the control unit's `STATUS` reply.
    pub fn sync(&mut self) -> Result<Position, ClientError> {
        let cmd = command("STATUS", &[]);
        let payload = self.expect_ok(&cmd)?;
        let position = parse_status_position(&payload)
            .ok_or_else(|| ClientError::BadReply(payload.clone()))?;
        self.solver.sync_to(position);
        debug!(?position, "solver synced to reported position");
        Ok(self.solver.target())
    }

    fn emit_move(&mut self, target: Position) -> Result<(), ClientError> {
        let cmd = command(
            "MOVE",
            &[
                format!("{:.2}", target.x),
                format!("{:.2}", target.y),
                format!("{:.2}", target.z),
                format!("{:.2}", target.pan),
                format!("{:.2}", target.tilt),
            ],
        );
        self.expect_ok(&cmd).map(|_| ())
    }

    fn expect_ok(&mut self, cmd: &Command) -> Result<String, ClientError> {
        match self.channel.round_trip(cmd)? {
            Response::Ok(msg) => Ok(msg),
            Response::Error(msg) => {
                warn!(name = %cmd.name, error = %msg, "command rejected");
                Err(ClientError::Rejected(msg))
            }
        }
    }
}

/// Build a command for the wire (checksummed by `to_wire`).
fn command(name: &str, params: &[String]) -> Command {
    let mut vec = heapless::Vec::new();
    for param in params {
        // MOVE carries at most five parameters, well under the cap.
        let _ = vec.push(param.clone());
    }
    Command {
        name: name.to_string(),
        params: vec,
        checksummed: true,
    }
}

/// Parse the `STATUS` payload `X=..,Y=..,Z=..,PAN=..,TILT=..,...`.
fn parse_status_position(payload: &str) -> Option<Position> {
    let mut position = Position::ZERO;
    let mut seen = 0u8;
    for field in payload.split(',') {
        let (key, value) = field.split_once('=')?;
        let slot = match key {
            "X" => Some(&mut position.x),
            "Y" => Some(&mut position.y),
            "Z" => Some(&mut position.z),
            "PAN" => Some(&mut position.pan),
            "TILT" => Some(&mut position.tilt),
            _ => None,
        };
        if let Some(slot) = slot {
            *slot = value.parse().ok()?;
            seen += 1;
        }
    }
    (seen == 5).then_some(position)
}

// ─── Tests ──────────────────────────────────────────────────────────
