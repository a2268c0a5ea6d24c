//! End-to-end tests for the Controller → FSM → relays pipeline.
//!
//! Each test drives a [`Bay`] (controller, mock expander, recording sink
//! and a test clock) the way the control loop would, one cycle every
//! 10 ms, and asserts on machine state, relay outputs and emitted events.

use crate::mock_hw::{Bay, MockHardware, RecordingSink, STEP_MS};

use fullwash::app::commands::{InboundMessage, SessionLoad};
use fullwash::app::events::AppEvent;
use fullwash::app::service::Controller;
use fullwash::config::MachineSettings;
use fullwash::error::MessageError;
use fullwash::fsm::{MachineAction, MachineState, TriggerType};
use fullwash::pins::{BUTTON_BITS, COIN_BIT, LIGHTING_RELAY, STOP_BIT};

const TOKEN_MS: u32 = 120_000;
const GRACE_MS: u32 = 30_000;

fn button(n: usize) -> u8 {
    BUTTON_BITS[n]
}

fn insert_coin(bay: &mut Bay) {
    bay.tap(COIN_BIT);
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn start_announces_setup_and_lights_the_bay() {
    let bay = Bay::new();
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.sink.actions(), vec![MachineAction::Setup]);
    assert_eq!(bay.sink.states(), vec![MachineState::Free]);
    assert!(bay.hw.relay_on(LIGHTING_RELAY));
    assert_eq!(bay.hw.function_relays(), 0);
    assert!(!bay.hw.loaded_led);
}

#[test]
fn stale_relays_are_switched_off_at_start() {
    let mut hw = MockHardware::new();
    hw.outputs = 0b0000_0101;
    let mut sink = RecordingSink::new();
    let mut controller = Controller::new(MachineSettings::default(), 0);
    controller.start(0, &mut hw, &mut sink);
    assert_eq!(hw.function_relays(), 0);
    assert!(hw.relay_calls.contains(&(0, false)));
    assert!(hw.relay_calls.contains(&(2, false)));
}

#[test]
fn unreadable_relays_at_start_are_all_forced_off() {
    let mut hw = MockHardware::new();
    hw.outputs = 0b0000_1000;
    hw.fail_reads = true;
    let mut sink = RecordingSink::new();
    let mut controller = Controller::new(MachineSettings::default(), 0);
    controller.start(0, &mut hw, &mut sink);
    assert_eq!(hw.function_relays(), 0);
    assert_eq!(hw.relay_calls.iter().filter(|(_, on)| !on).count(), 6);
}

// ── Scenario A: coin session runs one token to the end ───────

#[test]
fn coin_session_runs_one_token_then_frees_the_bay() {
    let mut bay = Bay::new();
    bay.run_for(3_500);

    insert_coin(&mut bay);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert_eq!(bay.controller.tokens_left(), 1);
    assert_eq!(bay.controller.physical_tokens(), 1);
    assert!(bay.controller.session_id().starts_with("coin_"));

    bay.run_for(100);
    let pressed_at = bay.tap(button(1));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.controller.tokens_left(), 0);
    assert_eq!(bay.controller.active_button(), Some(1));
    assert_eq!(bay.hw.function_relays(), 0b10);
    assert!(bay.hw.running_led);

    bay.run_for(TOKEN_MS - (bay.now - pressed_at) - 100);
    assert_eq!(bay.controller.state(), MachineState::Running);
    bay.run_for(200);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.hw.function_relays(), 0);
    assert!(!bay.hw.loaded_led);
    assert!(bay.hw.relay_on(LIGHTING_RELAY));

    assert_eq!(
        bay.sink.triggered(),
        vec![
            (MachineAction::TokenInserted, TriggerType::Manual),
            (MachineAction::Start, TriggerType::Manual),
            (MachineAction::Stop, TriggerType::Automatic),
        ]
    );
}

// ── Scenario B: idle session auto-consumes every token ───────

#[test]
fn idle_session_consumes_tokens_without_a_selection() {
    let mut bay = Bay::new();
    bay.load(3);
    assert_eq!(bay.controller.state(), MachineState::Idle);

    bay.run_for(GRACE_MS - STEP_MS);
    assert_eq!(bay.controller.tokens_left(), 3);
    bay.step(STEP_MS);
    assert_eq!(bay.controller.tokens_left(), 2);
    assert_eq!(bay.controller.state(), MachineState::Idle);

    bay.run_for(TOKEN_MS);
    assert_eq!(bay.controller.tokens_left(), 1);
    assert_eq!(bay.controller.state(), MachineState::Idle);

    bay.run_for(TOKEN_MS);
    assert_eq!(bay.controller.tokens_left(), 0);
    assert_eq!(bay.controller.state(), MachineState::Idle);

    bay.run_for(TOKEN_MS);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.hw.function_relays(), 0);

    assert_eq!(
        bay.sink.triggered(),
        vec![
            (MachineAction::Start, TriggerType::Automatic),
            (MachineAction::Start, TriggerType::Automatic),
            (MachineAction::Start, TriggerType::Automatic),
            (MachineAction::Stop, TriggerType::Automatic),
        ]
    );
}

// ── Scenario C: switching functions keeps the token clock ────

#[test]
fn switching_function_moves_the_relay_without_resetting_time() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    assert_eq!(bay.hw.function_relays(), 0b001);

    bay.run_for(10_000);
    bay.tap(button(2));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.controller.active_button(), Some(2));
    assert_eq!(bay.hw.function_relays(), 0b100);
    assert_eq!(bay.controller.tokens_left(), 1);

    let secs = bay.controller.seconds_left(bay.now);
    assert!((105..=110).contains(&secs), "token clock was reset: {secs} s left");

    // Old relay released before the new one is energized.
    let calls = &bay.hw.relay_calls;
    assert_eq!(&calls[calls.len() - 2..], &[(0, false), (2, true)]);
}

// ── Pause / resume ────────────────────────────────────────────

#[test]
fn pause_freezes_the_token_within_grace() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(10_000);

    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Paused);
    assert_eq!(bay.hw.function_relays(), 0);
    assert!(!bay.hw.running_led);
    let frozen = bay.controller.seconds_left(bay.now);

    bay.run_for(20_000);
    assert_eq!(bay.controller.seconds_left(bay.now), frozen);

    let resumed_at = bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.controller.seconds_left(resumed_at), frozen);
    assert_eq!(bay.hw.function_relays(), 0b001);
    assert_eq!(bay.controller.tokens_left(), 1);

    assert_eq!(
        bay.sink.actions()[1..],
        [MachineAction::Start, MachineAction::Pause, MachineAction::Resume]
    );
}

#[test]
fn pause_beyond_grace_is_charged() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(10_000);
    bay.tap(button(0));
    let frozen = bay.controller.seconds_left(bay.now);

    bay.run_for(GRACE_MS + 10_000);
    assert_eq!(bay.controller.state(), MachineState::Paused);
    let left = bay.controller.seconds_left(bay.now);
    assert!(left + 9 <= frozen, "paused time past grace not charged: {frozen} -> {left}");
}

#[test]
fn resume_may_pick_a_different_function() {
    let mut bay = Bay::new();
    bay.load(1);
    bay.tap(button(0));
    bay.run_for(1_000);
    bay.tap(button(0));
    bay.run_for(1_000);

    bay.tap(button(3));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.controller.active_button(), Some(3));
    assert_eq!(bay.hw.function_relays(), 0b1000);
}

// ── Guards ────────────────────────────────────────────────────

#[test]
fn second_press_right_after_start_is_ignored() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(40);

    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Running);

    bay.run_for(300);
    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Paused);
}

#[test]
fn pause_is_blocked_shortly_after_a_function_switch() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(1_000);
    bay.tap(button(1));
    bay.run_for(100);

    bay.tap(button(1));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.controller.active_button(), Some(1));

    bay.run_for(1_000);
    bay.tap(button(1));
    assert_eq!(bay.controller.state(), MachineState::Paused);
}

#[test]
fn resume_is_blocked_shortly_after_pause() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(1_000);
    bay.tap(button(0));
    bay.run_for(100);

    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Paused);

    bay.run_for(500);
    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Running);
}

#[test]
fn stop_right_after_start_is_ignored() {
    let mut bay = Bay::new();
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(40);

    bay.tap(STOP_BIT);
    assert_eq!(bay.controller.state(), MachineState::Running);

    bay.run_for(300);
    bay.tap(STOP_BIT);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.controller.tokens_left(), 0);
    assert_eq!(bay.hw.function_relays(), 0);
    assert_eq!(
        bay.sink.triggered().last(),
        Some(&(MachineAction::Stop, TriggerType::Manual))
    );
}

#[test]
fn stop_from_idle_forfeits_remaining_tokens() {
    let mut bay = Bay::new();
    bay.load(5);
    bay.tap(STOP_BIT);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert!(!bay.controller.is_loaded());
    assert_eq!(bay.controller.tokens_left(), 0);
}

#[test]
fn buttons_do_nothing_while_free() {
    let mut bay = Bay::new();
    bay.tap(button(0));
    bay.run_for(100);
    bay.tap(STOP_BIT);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.hw.function_relays(), 0);
    assert_eq!(bay.sink.actions(), vec![MachineAction::Setup]);
}

// ── Inactivity ────────────────────────────────────────────────

#[test]
fn empty_session_logs_out_after_inactivity() {
    let mut bay = Bay::new();
    bay.load(0);
    assert_eq!(bay.controller.time_to_inactivity_timeout(bay.now), 120);

    bay.run_for(60_000);
    assert_eq!(bay.controller.time_to_inactivity_timeout(bay.now), 60);

    bay.run_for(60_000);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    bay.step(STEP_MS);
    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.controller.time_to_inactivity_timeout(bay.now), 0);
    assert_eq!(
        bay.sink.triggered(),
        vec![(MachineAction::Stop, TriggerType::Automatic)]
    );
}

#[test]
fn inactivity_logout_ends_the_cycle_before_inputs() {
    let mut bay = Bay::new();
    bay.load(0);
    bay.run_for(120_000);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    bay.sink.clear();

    // Coin and a function press land in the cycle that logs out.
    bay.hw.press_with_interrupt(COIN_BIT);
    bay.hw.press(button(0));
    bay.step(STEP_MS);

    assert_eq!(bay.controller.state(), MachineState::Free);
    assert_eq!(bay.controller.tokens_left(), 0);
    assert_eq!(bay.hw.function_relays(), 0);
    assert_eq!(
        bay.sink.triggered(),
        vec![(MachineAction::Stop, TriggerType::Automatic)]
    );
    assert!(!bay.sink.actions().contains(&MachineAction::TokenInserted));
}

#[test]
fn unused_tokens_extend_the_inactivity_horizon() {
    let mut bay = Bay::new();
    bay.load(2);
    // Base plus one token-time per unused token.
    assert_eq!(bay.controller.time_to_inactivity_timeout(bay.now), 360);
}

// ── Coins ─────────────────────────────────────────────────────

#[test]
fn coins_are_ignored_while_the_acceptor_settles() {
    let mut bay = Bay::new();
    bay.run_for(1_000);
    insert_coin(&mut bay);
    assert_eq!(bay.controller.state(), MachineState::Free);

    bay.run_for(3_000);
    insert_coin(&mut bay);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert_eq!(bay.controller.tokens_left(), 1);
}

#[test]
fn coin_cooldown_swallows_a_bouncing_pulse() {
    let mut bay = Bay::new();
    bay.run_for(3_500);
    insert_coin(&mut bay);
    bay.run_for(480);
    insert_coin(&mut bay);
    assert_eq!(bay.controller.tokens_left(), 1);

    bay.run_for(2_500);
    insert_coin(&mut bay);
    assert_eq!(bay.controller.tokens_left(), 2);
    assert_eq!(bay.controller.physical_tokens(), 2);
}

#[test]
fn coin_tops_up_a_loaded_session_and_is_spent_first() {
    let mut bay = Bay::new();
    bay.run_for(3_500);
    bay.load(1);
    insert_coin(&mut bay);
    assert_eq!(bay.controller.tokens_left(), 2);
    assert_eq!(bay.controller.physical_tokens(), 1);
    assert_eq!(bay.controller.session_id(), "sess-1");

    bay.run_for(100);
    bay.tap(button(0));
    assert_eq!(bay.controller.tokens_left(), 1);
    assert_eq!(bay.controller.physical_tokens(), 0);
}

#[test]
fn coin_interrupt_is_accepted() {
    let mut bay = Bay::new();
    bay.run_for(3_500);
    bay.tap_with_interrupt(COIN_BIT);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert_eq!(bay.controller.tokens_left(), 1);
}

// ── Edge path ─────────────────────────────────────────────────

#[test]
fn interrupt_press_is_not_repeated_by_level_polling() {
    let settings = MachineSettings {
        pause_resume_cooldown_ms: 0,
        ..MachineSettings::default()
    };
    let mut bay = Bay::with_settings(settings);
    bay.load(2);
    bay.tap(button(0));
    bay.run_for(1_000);

    bay.hw.press_with_interrupt(button(0));
    bay.run_for(200);
    bay.hw.release(button(0));
    bay.step(STEP_MS);
    assert_eq!(bay.controller.state(), MachineState::Paused);
}

#[test]
fn failed_edge_read_keeps_the_interrupt_pending() {
    let mut bay = Bay::new();
    bay.load(1);
    bay.hw.fail_reads = true;
    bay.hw.press_with_interrupt(button(0));
    bay.step(STEP_MS);
    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert!(bay.hw.interrupt);

    bay.hw.fail_reads = false;
    bay.step(STEP_MS);
    assert_eq!(bay.controller.state(), MachineState::Running);
}

// ── Bus failures and relay reconciliation ─────────────────────

#[test]
fn failed_relay_write_is_retried_next_cycle() {
    let mut bay = Bay::new();
    bay.load(1);
    bay.hw.fail_writes = true;
    bay.tap(button(0));
    assert_eq!(bay.controller.state(), MachineState::Running);
    assert_eq!(bay.hw.function_relays(), 0);

    bay.hw.fail_writes = false;
    bay.step(STEP_MS);
    assert_eq!(bay.hw.function_relays(), 0b001);
}

#[test]
fn relay_drift_is_corrected_on_the_report_interval() {
    let mut bay = Bay::new();
    bay.load(1);
    bay.tap(button(0));
    bay.hw.outputs &= !0b001;

    bay.run_for(10_100);
    assert_eq!(bay.hw.function_relays(), 0b001);
}

// ── Inbound messages ──────────────────────────────────────────

#[test]
fn second_load_is_rejected_while_loaded() {
    let mut bay = Bay::new();
    bay.load(2);
    let again = InboundMessage::LoadSession(SessionLoad {
        session_id: "sess-2".into(),
        user_id: "user-2".into(),
        user_name: "Bo".into(),
        tokens: 9,
        timestamp: None,
    });
    assert_eq!(
        bay.controller.handle_message(again, bay.now),
        Err(MessageError::AlreadyLoaded)
    );
    assert_eq!(bay.controller.session_id(), "sess-1");
    assert_eq!(bay.controller.tokens_left(), 2);
}

#[test]
fn load_without_user_is_rejected() {
    let mut bay = Bay::new();
    let msg = InboundMessage::LoadSession(SessionLoad {
        session_id: "s".into(),
        tokens: 1,
        ..SessionLoad::default()
    });
    assert_eq!(
        bay.controller.handle_message(msg, bay.now),
        Err(MessageError::MissingField("user_id"))
    );
    assert_eq!(bay.controller.state(), MachineState::Free);
}

#[test]
fn load_with_bad_timestamp_still_loads() {
    let mut bay = Bay::new();
    let msg = InboundMessage::LoadSession(SessionLoad {
        session_id: "s".into(),
        user_id: "u".into(),
        user_name: "Cy".into(),
        tokens: 1,
        timestamp: Some("yesterday".into()),
    });
    assert_eq!(bay.controller.handle_message(msg, bay.now), Ok(()));
    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert_eq!(bay.controller.user_name(), "Cy");
    assert!(!bay.controller.wall_clock().is_synced());
}

#[test]
fn clock_sync_stamps_later_actions() {
    let mut bay = Bay::new();
    let sync = InboundMessage::Config {
        timestamp: "2025-06-01T08:00:00Z".into(),
    };
    bay.controller.handle_message(sync, bay.now).unwrap();
    bay.load(1);
    bay.sink.clear();
    bay.tap(button(0));

    let start = bay
        .sink
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::Action(a) if a.action == MachineAction::Start => Some(a.clone()),
            _ => None,
        })
        .expect("START emitted");
    assert_eq!(start.timestamp.as_str(), "2025-06-01T08:00:00.010Z");
    let session = start.session.expect("session context");
    assert_eq!(session.button_name.as_deref(), Some("BUTTON_1"));
    assert_eq!(session.seconds_left, Some(120));
}

#[test]
fn bad_config_timestamp_is_rejected() {
    let mut bay = Bay::new();
    let msg = InboundMessage::Config {
        timestamp: "2025-13-01T00:00:00Z".into(),
    };
    assert_eq!(
        bay.controller.handle_message(msg, bay.now),
        Err(MessageError::BadTimestamp)
    );
}

// ── State reports ─────────────────────────────────────────────

#[test]
fn state_is_reported_periodically_and_on_change() {
    let mut bay = Bay::new();
    bay.run_for(30_000);
    assert_eq!(bay.sink.states().len(), 4);

    bay.sink.clear();
    bay.load(1);
    bay.step(STEP_MS);
    assert_eq!(bay.sink.states(), vec![MachineState::Idle]);

    let report = bay
        .sink
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::State(s) => Some(s.clone()),
            AppEvent::Action(_) => None,
        })
        .expect("state report");
    let meta = report.session_metadata.expect("loaded bay reports its session");
    assert_eq!(meta.user_name, "Ana");
    assert_eq!(meta.tokens_left, 1);
}
