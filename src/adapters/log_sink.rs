//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each application event as one
//! line to the ESP-IDF logger (UART / USB-CDC in production). Paired
//! with the [`QueuedPublisher`](super::publisher::QueuedPublisher) in
//! `main.rs` so every published event also shows on the console.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Action(a) => match &a.session {
                Some(s) => info!(
                    "ACTION | {} | {:?} {} | session={} user={} | tokens={} (physical={}) \
                     via {:?} | secs_left={:?}",
                    a.action.as_str(),
                    s.trigger_type,
                    s.button_name.as_deref().unwrap_or("-"),
                    s.session_id,
                    s.user_id,
                    s.tokens_left,
                    s.physical_tokens,
                    s.token_channel,
                    s.seconds_left,
                ),
                None => info!("ACTION | {} | machine={}", a.action.as_str(), a.machine_id),
            },
            AppEvent::State(r) => match &r.session_metadata {
                Some(m) => info!(
                    "STATE | {} | session={} user={} ({}) | tokens={} | secs_left={:?}",
                    r.status, m.session_id, m.user_id, m.user_name, m.tokens_left, m.seconds_left,
                ),
                None => info!("STATE | {}", r.status),
            },
        }
    }
}
