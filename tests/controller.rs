mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::*;
use copley_serial_link::commands;
use copley_serial_link::copley_encoder::*;
use copley_serial_link::{ConnectionStatus, MotorController};

fn connected() -> (MotorController<ScriptedPorts>, Script) {
    let script = Script::new();
    script.handshake();

    let mut motors =
        MotorController::with_provider(ScriptedPorts { script: script.clone() }, fast_config());
    assert!(motors.connect(Some(SCRIPTED_PORT)));
    (motors, script)
}

fn position_reply(position: i32) -> Vec<u8> {
    response(&CopleyEncoder::pack_i32(position))
}

#[test]
fn position_read_decodes_reversed_bytes() {
    let (mut motors, script) = connected();
    script.reply(response(&[0x00, 0x01, 0x86, 0xA0]));

    assert_eq!(motors.get_position(Axis::Y), 100_000);
    assert_eq!(script.writes().last(), Some(&vec![0x00, 0x60, 0x01, 0x0C, 0x20, 0x17]));
}

#[test]
fn corrupt_position_falls_back_to_last_good_value() {
    let (mut motors, script) = connected();

    let mut corrupt = position_reply(-7);
    corrupt[1] ^= 0xFF;
    script.reply(position_reply(1000)).reply(corrupt);

    assert_eq!(motors.get_position(Axis::X), 1000);
    assert_eq!(motors.get_position(Axis::X), 1000);
    assert_eq!(motors.diagnostics().checksum_failures, 1);
}

#[test]
fn wrong_sized_position_falls_back() {
    let (mut motors, script) = connected();
    script.reply(position_reply(55)).reply(response(&[0x00, 0x10]));

    assert_eq!(motors.get_position(Axis::X), 55);
    assert_eq!(motors.get_position(Axis::X), 55);

    let diag = motors.diagnostics();
    assert_eq!(diag.length_errors, 1);
    assert_eq!(diag.checksum_failures, 0);
}

#[test]
fn error_reply_to_position_read_counts_once() {
    let (mut motors, script) = connected();
    script.reply(position_reply(12)).reply(response_with_code(&[], 0x21));

    assert_eq!(motors.get_position(Axis::Y), 12);
    assert_eq!(motors.get_position(Axis::Y), 12);

    let diag = motors.diagnostics();
    assert_eq!(diag.controller_errors, 1);
    assert_eq!(diag.length_errors, 0);
    assert_eq!(diag.failures(), 1);
}

#[test]
fn missing_position_reply_falls_back() {
    let (mut motors, script) = connected();
    script.reply(position_reply(-3)).silence();

    assert_eq!(motors.get_position(Axis::Y), -3);
    assert_eq!(motors.get_position(Axis::Y), -3);
    assert_eq!(motors.diagnostics().timeouts, 1);
}

#[test]
fn positions_are_cached_per_axis() {
    let (mut motors, script) = connected();
    script.reply(position_reply(10)).reply(position_reply(20));

    assert_eq!(motors.get_position(Axis::X), 10);
    assert_eq!(motors.get_position(Axis::Y), 20);
    assert_eq!(motors.last_known_position(Axis::X), 10);
    assert_eq!(motors.last_known_position(Axis::Y), 20);
}

#[test]
fn move_sends_mode_position_then_start() {
    let (mut motors, script) = connected();
    script.state().default_reply = Some(ack());

    motors.move_axis(Axis::X, 0x0102_0304);

    let writes = script.writes();
    assert_eq!(writes.len(), 5);
    assert_eq!(writes[2], CopleyEncoder::encode(&commands::set_trajectory_mode_absolute(Axis::X)));
    assert_eq!(&writes[3][4..], &[0x00, 0xCA, 0x01, 0x02, 0x03, 0x04]);
    assert_eq!(writes[4], CopleyEncoder::encode(&commands::start_move(Axis::X)));
    assert_eq!(script.state().overlaps, 0);
}

#[test]
fn initialize_keeps_going_after_a_silent_step() {
    let (mut motors, script) = connected();
    script.silence().reply(ack()).reply(ack());

    motors.initialize_axis(Axis::Y);

    let writes = script.writes();
    assert_eq!(writes.len(), 5);
    assert_eq!(writes[3], CopleyEncoder::encode(&commands::turn_on_amplifier(Axis::Y)));
    assert_eq!(writes[4], CopleyEncoder::encode(&commands::start_homing(Axis::Y)));
}

#[test]
fn disable_sends_amplifier_off_only() {
    let (mut motors, script) = connected();
    script.reply(ack());

    motors.disable_axis(Axis::X);

    let writes = script.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[2], CopleyEncoder::encode(&commands::turn_off_amplifier(Axis::X)));
}

#[test]
fn cancelled_read_returns_cached_value_quickly() {
    let script = Script::new();
    script.handshake().reply(position_reply(77)).silence();

    let config = fast_config().with_response_timeout(Duration::from_secs(10));
    let mut motors = MotorController::with_provider(ScriptedPorts { script: script.clone() }, config);
    assert!(motors.connect(Some(SCRIPTED_PORT)));
    assert_eq!(motors.get_position(Axis::X), 77);

    let token = motors.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let started = Instant::now();
    assert_eq!(motors.get_position(Axis::X), 77);
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(motors.diagnostics().cancellations, 1);
}

#[test]
fn liveness_check_after_cancel_still_pings() {
    let script = Script::new();
    script.handshake().silence();
    script.state().default_reply = Some(PING_SIGNATURE.to_vec());

    let config = fast_config().with_response_timeout(Duration::from_secs(10));
    let mut motors = MotorController::with_provider(ScriptedPorts { script: script.clone() }, config);
    assert!(motors.connect(Some(SCRIPTED_PORT)));

    let token = motors.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });
    motors.get_position(Axis::X);
    canceller.join().unwrap();

    assert!(motors.is_connected());
    assert_eq!(script.writes().last(), Some(&CopleyEncoder::encode(&commands::ping())));

    let diag = motors.diagnostics();
    assert_eq!(diag.cancellations, 1);
    assert_eq!(diag.probe_failures, 0);
}

#[test]
fn connect_failure_leaves_controller_disconnected() {
    let script = Script::new();
    let mut motors =
        MotorController::with_provider(ScriptedPorts { script: script.clone() }, fast_config());

    assert!(!motors.connect(Some("COM99")));
    assert_eq!(motors.status(), ConnectionStatus::Disconnected);
    assert_eq!(script.state().opens, 0);
}
