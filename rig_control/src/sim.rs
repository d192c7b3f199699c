//! Simulation hardware backend.
//!
//! Models just enough of the rig for the control logic and the test
//! suite: per-axis travel with a limit switch at the reference edge,
//! an e-stop input, the open-loop pan stepper with its zero flag, the
//! tilt pulse output, and the multiplexed serial bus with scripted
//! peripheral replies.
//!
//! Raw axis positions are in motion-unit counts; the limit switch
//! asserts strictly below zero, so count zero is the released switch
//! boundary that homing establishes.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use rig_common::hal::{HalError, RigHal, StepDirection};
use rig_common::state::{BusOwner, LinearAxis};

/// Simulated rig hardware.
#[derive(Debug, Default)]
pub struct SimHal {
    // ── Linear axes ──
    enabled: [bool; 3],
    raw_mode: [bool; 3],
    /// Simulated axis position [counts]; limit asserts below zero.
    raw_pos: [i64; 3],
    /// Last absolute count target commanded per axis.
    commanded: [i64; 3],
    move_done: [bool; 3],
    forced_limit: [bool; 3],
    /// A disconnected switch never asserts (dead-switch fault).
    disconnected_limit: [bool; 3],

    // ── Safety ──
    estop_input: bool,

    // ── Pan / tilt ──
    /// Simulated pan step position; zero flag asserts below zero.
    pan_raw: i64,
    /// Net signed pan steps issued since construction.
    pan_net: i64,
    tilt_pulse_us: u16,

    // ── Bus ──
    selected: Option<BusOwner>,
    pending_rx: VecDeque<u8>,
    /// Cap on bytes per `bus_read`, modelling chunked arrival.
    rx_chunk_limit: Option<usize>,
    sensor_replies: VecDeque<Vec<u8>>,
    actuator_replies: VecDeque<Vec<u8>>,
    writes: Vec<(BusOwner, Vec<u8>)>,
}

impl SimHal {
    /// A rig that has never been homed: axes somewhere mid-travel.
    pub fn new_unhomed() -> Self {
        Self {
            raw_pos: [1000; 3],
            move_done: [true; 3],
            pan_raw: 200,
            ..Self::default()
        }
    }

    /// A rig already sitting at the homed reference.
    pub fn new_homed() -> Self {
        Self {
            raw_pos: [0; 3],
            move_done: [true; 3],
            pan_raw: 50,
            ..Self::default()
        }
    }

    // ── Test controls ──

    pub fn set_estop_input(&mut self, asserted: bool) {
        self.estop_input = asserted;
    }

    pub fn force_limit(&mut self, axis: LinearAxis, asserted: bool) {
        self.forced_limit[axis.index()] = asserted;
    }

    /// Simulate a dead limit switch that never asserts.
    pub fn disconnect_limit(&mut self, axis: LinearAxis) {
        self.disconnected_limit[axis.index()] = true;
    }

    /// Repair a disconnected switch. The carriage is re-seated at the
    /// boundary so the switch reads released, as after a manual fix.
    pub fn reconnect_limit(&mut self, axis: LinearAxis) {
        self.disconnected_limit[axis.index()] = false;
        if self.raw_pos[axis.index()] < 0 {
            self.raw_pos[axis.index()] = 0;
        }
    }

    /// Deliver at most `limit` bytes per read, so multi-byte frames
    /// arrive fragmented the way a slow serial peripheral delivers them.
    pub fn set_rx_chunk_limit(&mut self, limit: usize) {
        self.rx_chunk_limit = Some(limit);
    }

    pub fn push_sensor_reply(&mut self, frame: Vec<u8>) {
        self.sensor_replies.push_back(frame);
    }

    pub fn push_actuator_reply(&mut self, reply: Vec<u8>) {
        self.actuator_replies.push_back(reply);
    }

    // ── Test observers ──

    pub fn axis_enabled(&self, axis: LinearAxis) -> bool {
        self.enabled[axis.index()]
    }

    pub fn commanded_counts(&self, axis: LinearAxis) -> i64 {
        self.commanded[axis.index()]
    }

    pub fn pan_step_count(&self) -> i64 {
        self.pan_net
    }

    pub fn tilt_pulse_us(&self) -> u16 {
        self.tilt_pulse_us
    }

    pub fn last_bus_write(&self) -> Option<(BusOwner, Vec<u8>)> {
        self.writes.last().cloned()
    }

    pub fn bus_write_count(&self) -> usize {
        self.writes.len()
    }
}

impl RigHal for SimHal {
    fn init(&mut self) -> Result<(), HalError> {
        debug!("simulation backend initialized");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.enabled = [false; 3];
        Ok(())
    }

    fn axis_enable(&mut self, axis: LinearAxis, enabled: bool) -> Result<(), HalError> {
        self.enabled[axis.index()] = enabled;
        Ok(())
    }

    fn axis_set_raw_mode(&mut self, axis: LinearAxis, raw: bool) -> Result<(), HalError> {
        self.raw_mode[axis.index()] = raw;
        Ok(())
    }

    fn axis_move_counts(&mut self, axis: LinearAxis, counts: i64) -> Result<(), HalError> {
        if self.raw_mode[axis.index()] {
            return Err(HalError::Io(format!(
                "axis {} in raw mode, absolute move rejected",
                axis.letter()
            )));
        }
        self.commanded[axis.index()] = counts;
        // The simulated drive completes instantly.
        self.raw_pos[axis.index()] = counts;
        self.move_done[axis.index()] = true;
        Ok(())
    }

    fn axis_step_done(&self, axis: LinearAxis) -> bool {
        self.move_done[axis.index()]
    }

    fn axis_step(&mut self, axis: LinearAxis, dir: StepDirection) -> Result<(), HalError> {
        self.raw_pos[axis.index()] += dir.sign();
        Ok(())
    }

    fn limit_asserted(&self, axis: LinearAxis) -> bool {
        let i = axis.index();
        self.forced_limit[i] || (!self.disconnected_limit[i] && self.raw_pos[i] < 0)
    }

    fn estop_asserted(&self) -> bool {
        self.estop_input
    }

    fn pan_step(&mut self, dir: StepDirection) -> Result<(), HalError> {
        self.pan_raw += dir.sign();
        self.pan_net += dir.sign();
        Ok(())
    }

    fn pan_zero_flag(&self) -> bool {
        self.pan_raw < 0
    }

    fn tilt_set_pulse_us(&mut self, pulse_us: u16) -> Result<(), HalError> {
        self.tilt_pulse_us = pulse_us;
        Ok(())
    }

    fn bus_select(&mut self, owner: BusOwner) -> Result<(), HalError> {
        self.selected = Some(owner);
        Ok(())
    }

    fn bus_write(&mut self, bytes: &[u8]) -> Result<(), HalError> {
        let Some(owner) = self.selected else {
            return Err(HalError::Io("bus write with no owner selected".into()));
        };
        self.writes.push((owner, bytes.to_vec()));
        // A write elicits the next scripted reply into the RX FIFO.
        let queue = match owner {
            BusOwner::Sensor => &mut self.sensor_replies,
            BusOwner::Actuator => &mut self.actuator_replies,
        };
        if let Some(reply) = queue.pop_front() {
            self.pending_rx.extend(reply);
        }
        Ok(())
    }

    fn bus_read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, HalError> {
        let cap = self.rx_chunk_limit.unwrap_or(buf.len()).min(buf.len());
        let mut n = 0;
        while n < cap {
            match self.pending_rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn bus_flush(&mut self) {
        self.pending_rx.clear();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
