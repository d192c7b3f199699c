//! Command bridge: host request validation and dispatch.
//!
//! One request at a time, strict rejection order: structural parse,
//! integrity token, safety gate, parameter arity, parameter values,
//! then dispatch to the axis controller / homing sequencer / device
//! multiplexer. Exactly one `OK`/`ERROR` response per request, except
//! homing, which acknowledges on the host link before the blocking
//! sequence starts and emits a completion notification when it ends;
//! the channel is never held open waiting for a "started" line.

use tracing::{info, warn};

use rig_common::hal::RigHal;
use rig_common::protocol::{Command, ProtocolError, Response};
use rig_common::state::{LinearAxis, Position};

use crate::cycle::{ControlUnit, HostLink};

impl<H: RigHal> ControlUnit<H> {
    /// Process one host line, emitting response line(s) on `link`.
    ///
    /// Homing emits two lines: the started acknowledgement before the
    /// sequence begins, and the completion notification after it ends.
    pub fn handle_line(&mut self, line: &str, link: &mut dyn HostLink) {
        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(ProtocolError::ChecksumMismatch { expected, received }) => {
                warn!(expected, received, "command rejected, checksum mismatch");
                send(link, Response::error("CHECKSUM_MISMATCH"));
                return;
            }
            Err(e) => {
                warn!(error = %e, "command rejected, unparseable");
                send(link, Response::error("UNKNOWN_COMMAND"));
                return;
            }
        };

        // Safety gate: while tripped, only a status query or a clear
        // request gets through. Re-sample the inputs first so a freshly
        // asserted e-stop rejects even before the cycle latches it.
        let safety_state = self.safety.check(&self.hal);
        if !safety_state.motion_permitted()
            && !matches!(cmd.name.as_str(), "STATUS" | "RESET_ESTOP")
        {
            send(link, Response::error("ESTOP_ACTIVE"));
            return;
        }

        info!(name = %cmd.name, params = ?cmd.params, "command accepted");
        let response = match cmd.name.as_str() {
            "PING" => Response::ok("PONG"),
            "STATUS" => Response::ok(self.status().to_reply()),
            "MOVE" => self.cmd_move(&cmd),
            "HOME" => return self.cmd_home(&cmd, link),
            "STOP" => self.cmd_stop(),
            "PAN" => self.cmd_pan(&cmd),
            "TILT" => self.cmd_tilt(&cmd),
            "MEASURE" => self.cmd_measure(),
            "ESTOP" => self.cmd_estop(),
            "RESET_ESTOP" => self.cmd_reset_estop(),
            _ => Response::error("UNKNOWN_COMMAND"),
        };
        send(link, response);
    }

    // ── Dispatch handlers ──

    fn cmd_move(&mut self, cmd: &Command) -> Response {
        if cmd.params.len() < 3 {
            return Response::error("MISSING_PARAMS");
        }
        if cmd.params.len() > 5 {
            return Response::error("INVALID_PARAM");
        }
        let mut values = [0.0f64; 5];
        for (i, param) in cmd.params.iter().enumerate() {
            match parse_finite(param) {
                Some(v) => values[i] = v,
                None => return Response::error("INVALID_PARAM"),
            }
        }

        let current = self.axes.position();
        let target = Position {
            x: values[0],
            y: values[1],
            z: values[2],
            pan: if cmd.params.len() > 3 {
                values[3]
            } else {
                current.pan
            },
            tilt: if cmd.params.len() > 4 {
                values[4]
            } else {
                current.tilt
            },
        };

        match self.axes.move_to(&mut self.hal, target) {
            Ok(()) => Response::ok("MOVE_STARTED"),
            Err(e) => {
                warn!(error = %e, "move rejected");
                Response::error("NOT_HOMED")
            }
        }
    }

    /// Homing blocks inside the control loop, so the acknowledgement
    /// goes out on the link before the sequence is entered; the host
    /// observes that homing began even when it runs for minutes.
    fn cmd_home(&mut self, cmd: &Command, link: &mut dyn HostLink) {
        let selector = cmd
            .params
            .first()
            .map(|p| p.to_ascii_uppercase())
            .unwrap_or_else(|| "ALL".to_string());

        let result = match selector.as_str() {
            "ALL" => {
                send(link, Response::ok("HOME_STARTED"));
                self.homing
                    .run_all(&mut self.hal, &mut self.safety, &mut self.axes, &self.config)
            }
            "X" | "Y" | "Z" => {
                let axis = match selector.as_str() {
                    "X" => LinearAxis::X,
                    "Y" => LinearAxis::Y,
                    _ => LinearAxis::Z,
                };
                send(link, Response::ok("HOME_STARTED"));
                self.homing
                    .run_axis(&mut self.hal, &mut self.safety, &mut self.axes, &self.config, axis)
            }
            _ => return send(link, Response::error("INVALID_PARAM")),
        };

        match result {
            Ok(()) => send(link, Response::ok("HOME_COMPLETE")),
            Err(e) => {
                warn!(error = %e, "homing failed");
                send(link, Response::error("HOME_FAILED"));
            }
        }
    }

    fn cmd_stop(&mut self) -> Response {
        match self.axes.stop(&mut self.hal) {
            Ok(()) => Response::ok("STOPPED"),
            Err(e) => {
                warn!(error = %e, "stop failed");
                Response::error("STOP_FAILED")
            }
        }
    }

    fn cmd_pan(&mut self, cmd: &Command) -> Response {
        let Some(param) = cmd.params.first() else {
            return Response::error("MISSING_PARAMS");
        };
        let Some(angle) = parse_finite(param) else {
            return Response::error("INVALID_PARAM");
        };
        let target = Position {
            pan: angle,
            ..self.axes.position()
        };
        match self.axes.move_to(&mut self.hal, target) {
            Ok(()) => Response::ok("PAN_STARTED"),
            Err(_) => Response::error("NOT_HOMED"),
        }
    }

    fn cmd_tilt(&mut self, cmd: &Command) -> Response {
        let Some(param) = cmd.params.first() else {
            return Response::error("MISSING_PARAMS");
        };
        let Some(angle) = parse_finite(param) else {
            return Response::error("INVALID_PARAM");
        };
        let angle = angle.clamp(self.config.tilt.min_deg, self.config.tilt.max_deg);
        match self.mux.set_remote_tilt(&mut self.hal, angle) {
            Ok(()) => {
                self.axes.record_tilt(angle);
                Response::ok("TILT_SET")
            }
            Err(crate::bus::BusError::Timeout(_)) => Response::error("ACK_TIMEOUT"),
            Err(e) => {
                warn!(error = %e, "remote tilt failed");
                Response::error("TILT_FAILED")
            }
        }
    }

    fn cmd_measure(&mut self) -> Response {
        match self.mux.measure(&mut self.hal) {
            Ok(mm) => Response::ok(format!("{mm:.1}")),
            Err(crate::bus::BusError::OutOfRange) => Response::error("OUT_OF_RANGE"),
            Err(crate::bus::BusError::Timeout(_)) => Response::error("MEASURE_TIMEOUT"),
            Err(e) => {
                warn!(error = %e, "measurement failed");
                Response::error("MEASURE_FAILED")
            }
        }
    }

    fn cmd_estop(&mut self) -> Response {
        self.safety.trip_estop();
        self.axes.halt(&mut self.hal);
        Response::ok("ESTOP")
    }

    fn cmd_reset_estop(&mut self) -> Response {
        match self.safety.reset(&self.hal) {
            Ok(()) => Response::ok("ESTOP_CLEARED"),
            Err(e) => {
                warn!(error = %e, "e-stop reset refused");
                Response::error(format!("RESET_FAILED:{e}"))
            }
        }
    }
}

fn send(link: &mut dyn HostLink, response: Response) {
    link.send_line(&response.to_string());
}

/// Parse a numeric parameter, rejecting NaN and infinities.
fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ─── Tests ──────────────────────────────────────────────────────────
