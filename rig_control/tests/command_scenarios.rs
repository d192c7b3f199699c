//! End-to-end host command scenarios against the simulation backend.

use std::collections::VecDeque;

use rig_common::config::RigConfig;
use rig_common::protocol::checksum;
use rig_common::state::{LinearAxis, SafetyState};
use rig_control::cycle::{ControlUnit, HostLink};
use rig_control::sim::SimHal;

struct ScriptLink {
    inbound: VecDeque<String>,
    outbound: Vec<String>,
}

impl ScriptLink {
    fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
        }
    }
}

impl HostLink for ScriptLink {
    fn poll_line(&mut self) -> Option<String> {
        self.inbound.pop_front()
    }

    fn send_line(&mut self, line: &str) {
        self.outbound.push(line.to_string());
    }
}

fn fast_config() -> RigConfig {
    RigConfig::from_toml(
        r#"
[x]
homing_step_delay_us = 0
travel_mm = 50.0
[y]
homing_step_delay_us = 0
travel_mm = 50.0
[z]
homing_step_delay_us = 0
travel_mm = 50.0

[pan]
zero_approach_delay_us = 0
zero_crawl_delay_us = 0
zero_backoff_steps = 10
step_delay_us = 0
steps_per_cycle = 10000

[bus]
settle_ms = 0
read_timeout_ms = 5
ack_timeout_ms = 5

[cycle]
move_settle_ms = 0
"#,
    )
    .unwrap()
}

fn send(unit: &mut ControlUnit<SimHal>, line: &str) -> Vec<String> {
    let mut link = ScriptLink::new();
    unit.handle_line(line, &mut link);
    link.outbound
}

fn homed_unit() -> ControlUnit<SimHal> {
    let mut unit = ControlUnit::new(fast_config(), SimHal::new_unhomed()).unwrap();
    let replies = send(&mut unit, "HOME:ALL");
    assert_eq!(replies, vec!["OK:HOME_STARTED", "OK:HOME_COMPLETE"]);
    unit
}

fn settle(unit: &mut ControlUnit<SimHal>) {
    let mut link = ScriptLink::new();
    for _ in 0..4 {
        unit.cycle_body(&mut link);
    }
}

#[test]
fn move_scenario_reaches_logical_position() {
    let mut unit = homed_unit();

    assert_eq!(send(&mut unit, "MOVE:100.5,200.3,50.0"), vec!["OK:MOVE_STARTED"]);
    settle(&mut unit);

    let status = send(&mut unit, "STATUS");
    assert_eq!(status.len(), 1);
    assert!(
        status[0].starts_with("OK:X=100.50,Y=200.30,Z=50.00"),
        "status was {}",
        status[0]
    );
    assert!(status[0].contains("MOVING=0"));
}

#[test]
fn move_with_missing_params_changes_nothing() {
    let mut unit = homed_unit();
    let before = send(&mut unit, "STATUS");

    assert_eq!(send(&mut unit, "MOVE:100"), vec!["ERROR:MISSING_PARAMS"]);
    settle(&mut unit);

    assert_eq!(send(&mut unit, "STATUS"), before);
}

#[test]
fn tripped_state_rejects_everything_but_status_and_clear() {
    let mut unit = homed_unit();
    assert_eq!(send(&mut unit, "ESTOP"), vec!["OK:ESTOP"]);
    let before_position = unit.status().position;

    for line in ["MOVE:10,10,10", "HOME:ALL", "TILT:5", "PAN:90"] {
        assert_eq!(send(&mut unit, line), vec!["ERROR:ESTOP_ACTIVE"], "line {line}");
    }
    assert_eq!(unit.status().position, before_position);

    let status = send(&mut unit, "STATUS");
    assert!(status[0].contains("ESTOP=1"));

    assert_eq!(send(&mut unit, "RESET_ESTOP"), vec!["OK:ESTOP_CLEARED"]);
    assert_eq!(unit.safety.state(), SafetyState::Normal);
}

#[test]
fn reset_refused_while_limit_asserted() {
    let mut unit = homed_unit();
    unit.hal.force_limit(LinearAxis::X, true);

    let mut link = ScriptLink::new();
    link.inbound.push_back("RESET_ESTOP".to_string());
    unit.cycle_body(&mut link);

    assert_eq!(link.outbound.len(), 1);
    assert!(link.outbound[0].starts_with("ERROR:RESET_FAILED"));
    assert!(link.outbound[0].contains("X_LIMIT"));
    assert_eq!(unit.safety.state(), SafetyState::LimitTripped);

    // Releasing the switch makes the same request succeed.
    unit.hal.force_limit(LinearAxis::X, false);
    assert_eq!(send(&mut unit, "RESET_ESTOP"), vec!["OK:ESTOP_CLEARED"]);
}

#[test]
fn measurement_error_pattern_reports_out_of_range() {
    let mut unit = homed_unit();
    unit.hal.push_sensor_reply(vec![0x59, 0x59, 0xFF, 0xFF]);
    assert_eq!(send(&mut unit, "MEASURE"), vec!["ERROR:OUT_OF_RANGE"]);

    unit.hal.push_sensor_reply(vec![0x59, 0x59, 0x2C, 0x01]);
    assert_eq!(send(&mut unit, "MEASURE"), vec!["OK:300.0"]);
}

#[test]
fn corrupted_command_is_never_executed() {
    let mut unit = homed_unit();
    let before = send(&mut unit, "STATUS");

    assert_eq!(
        send(&mut unit, "MOVE:10,10,10;00"),
        vec!["ERROR:CHECKSUM_MISMATCH"]
    );
    settle(&mut unit);
    assert_eq!(send(&mut unit, "STATUS"), before);

    // The same payload with a valid token executes.
    let payload = "MOVE:10,10,10";
    let line = format!("{payload};{}", checksum(payload));
    assert_eq!(send(&mut unit, &line), vec!["OK:MOVE_STARTED"]);
}

#[test]
fn limit_trip_during_move_halts_motion() {
    let mut unit = homed_unit();
    assert_eq!(send(&mut unit, "MOVE:10,10,10"), vec!["OK:MOVE_STARTED"]);

    unit.hal.force_limit(LinearAxis::Y, true);
    let mut link = ScriptLink::new();
    unit.cycle_body(&mut link);

    assert_eq!(unit.safety.state(), SafetyState::LimitTripped);
    assert!(!unit.axes.is_moving());
    for axis in [LinearAxis::X, LinearAxis::Y, LinearAxis::Z] {
        assert!(!unit.hal.axis_enabled(axis));
    }
}

#[test]
fn homing_failure_requires_full_retry() {
    let mut unit = ControlUnit::new(fast_config(), SimHal::new_unhomed()).unwrap();
    unit.hal.disconnect_limit(LinearAxis::Y);

    assert_eq!(
        send(&mut unit, "HOME:ALL"),
        vec!["OK:HOME_STARTED", "ERROR:HOME_FAILED"]
    );
    assert!(!unit.homing.is_homed());
    assert_eq!(send(&mut unit, "MOVE:1,2,3"), vec!["ERROR:NOT_HOMED"]);

    // Reconnect and retry from the start.
    unit.hal.reconnect_limit(LinearAxis::Y);
    assert_eq!(
        send(&mut unit, "HOME:ALL"),
        vec!["OK:HOME_STARTED", "OK:HOME_COMPLETE"]
    );
    assert_eq!(send(&mut unit, "MOVE:1,2,3"), vec!["OK:MOVE_STARTED"]);
}

#[test]
fn remote_tilt_round_trip() {
    let mut unit = homed_unit();
    unit.hal.push_actuator_reply(b"OK\r\n".to_vec());

    assert_eq!(send(&mut unit, "TILT:-30"), vec!["OK:TILT_SET"]);
    let (_, bytes) = unit.hal.last_bus_write().unwrap();
    assert_eq!(bytes, b"ANGLE:-30.00\r\n");

    let status = send(&mut unit, "STATUS");
    assert!(status[0].contains("TILT=-30.00"));
}
