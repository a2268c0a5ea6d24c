//! Fuzz target: `adapters::mqtt::route`
//!
//! Arbitrary payloads on each inbound topic must either parse into a
//! message the controller accepts, or be rejected with a typed error.
//! Accepted session loads are applied to a fresh controller.
//!
//! cargo fuzz run fuzz_inbound_route

#![no_main]

use fullwash::adapters::mqtt::{Topics, route};
use fullwash::app::commands::InboundMessage;
use fullwash::app::service::Controller;
use fullwash::config::MachineSettings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let topics = Topics::new("99");
    let topic = match selector % 3 {
        0 => topics.init.as_str(),
        1 => topics.config.as_str(),
        _ => "machines/99/other",
    };

    let Ok(msg) = route(&topics, topic, payload) else {
        return;
    };
    if let InboundMessage::LoadSession(load) = &msg {
        assert!(!load.session_id.is_empty() && !load.user_id.is_empty());
    }
    let mut controller = Controller::new(MachineSettings::default(), 0);
    // Rejections are fine; panics are not.
    let _ = controller.handle_message(msg, 1_000);
});
