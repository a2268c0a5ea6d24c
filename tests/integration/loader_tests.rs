//! Remote loader → Controller integration.
//!
//! A signed grant arrives field by field, the loader validates it, and
//! the resulting session load is applied to a live controller.

use crate::mock_hw::{Bay, STEP_MS};

use fullwash::app::commands::InboundMessage;
use fullwash::config::MachineSettings;
use fullwash::error::LoadError;
use fullwash::fsm::MachineState;
use fullwash::loader::RemoteLoader;
use fullwash::loader::auth::sign_token;
use fullwash::pins::BUTTON_BITS;

const SIGNED_AT: u64 = 1_750_000_000;

fn loader_for(settings: &MachineSettings) -> RemoteLoader {
    RemoteLoader::new(settings.machine_id.clone(), settings.load_auth_secret.clone())
}

fn grant(settings: &MachineSettings, user: &str, tokens: u32) -> String {
    let token = sign_token(
        user,
        &settings.machine_id,
        tokens,
        SIGNED_AT,
        settings.load_auth_secret.as_bytes(),
    );
    format!("LOAD|{token}")
}

fn fill(loader: &mut RemoteLoader, user: &str, tokens: u32) {
    loader.set_user_id(user).unwrap();
    loader.set_user_name("Dana").unwrap();
    loader.set_tokens(&tokens.to_string()).unwrap();
}

#[test]
fn signed_grant_loads_the_bay() {
    let mut bay = Bay::new();
    let settings = bay.controller.settings().clone();
    let mut loader = loader_for(&settings);

    fill(&mut loader, "user-42", 3);
    let load = loader
        .receive_command(&grant(&settings, "user-42", 3), bay.now, bay.controller.state())
        .expect("valid grant");
    bay.controller
        .handle_message(InboundMessage::LoadSession(load), bay.now)
        .unwrap();
    bay.step(STEP_MS);

    assert_eq!(bay.controller.state(), MachineState::Idle);
    assert_eq!(bay.controller.tokens_left(), 3);
    assert_eq!(bay.controller.user_name(), "Dana");
    assert!(bay.controller.session_id().starts_with("ble_"));
    assert_eq!(loader.status(), "Success: Machine loaded");
    assert!(bay.hw.loaded_led);
}

#[test]
fn grant_for_another_machine_is_refused() {
    let bay = Bay::new();
    let settings = bay.controller.settings().clone();
    let other = MachineSettings {
        machine_id: fullwash::config::truncated("7"),
        ..settings.clone()
    };
    let mut loader = loader_for(&settings);

    fill(&mut loader, "user-42", 3);
    let result = loader.receive_command(&grant(&other, "user-42", 3), bay.now, bay.controller.state());
    assert_eq!(result.unwrap_err(), LoadError::TokenMismatch("machine_id"));
    assert_eq!(loader.status(), "Error: Invalid or expired authorization token");
    assert_eq!(bay.controller.state(), MachineState::Free);
}

#[test]
fn busy_bay_refuses_and_a_late_retry_has_expired() {
    let mut bay = Bay::new();
    let settings = bay.controller.settings().clone();
    bay.load(1);
    bay.tap(BUTTON_BITS[0]);
    assert_eq!(bay.controller.state(), MachineState::Running);

    let mut loader = loader_for(&settings);
    fill(&mut loader, "user-42", 2);
    let result = loader.receive_command(&grant(&settings, "user-42", 2), bay.now, bay.controller.state());
    assert_eq!(result.unwrap_err(), LoadError::MachineBusy);
    assert_eq!(loader.status(), "Error: Machine is not available");

    // The single token runs out; the pending request is now stale.
    bay.run_for(310_000);
    assert_eq!(bay.controller.state(), MachineState::Free);
    let result = loader.process(bay.now, bay.controller.state());
    assert_eq!(result.unwrap_err(), LoadError::TokenExpired);
}
