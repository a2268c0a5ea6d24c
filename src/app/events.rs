//! Outbound application events.
//!
//! The [`Controller`](super::service::Controller) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them: log a line on the serial console,
//! or serialize to JSON and queue for the broker.
//!
//! Field names are the wire names; `serde` renders them verbatim.

use serde::Serialize;

use crate::clock::Timestamp;
use crate::config::MachineId;
use crate::fsm::{MachineAction, MachineState, TokenChannel, TriggerType};

/// Structured events emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A user- or timer-driven action, published on the action topic.
    Action(ActionEvent),
    /// Snapshot of the bay, published on the state topic.
    State(StateReport),
}

/// One action notification. `session` is absent only for `SETUP`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEvent {
    pub machine_id: MachineId,
    pub action: MachineAction,
    pub timestamp: Timestamp,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub session: Option<ActionContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionContext {
    pub trigger_type: TriggerType,
    /// `BUTTON_<n>`, 1-based; absent when no function is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_name: Option<heapless::String<12>>,
    pub session_id: String,
    pub user_id: String,
    pub token_channel: TokenChannel,
    pub tokens_left: u32,
    pub physical_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<u32>,
}

/// Periodic (or forced) state report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateReport {
    pub machine_id: MachineId,
    pub timestamp: Timestamp,
    pub status: MachineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_metadata: Option<SessionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    pub tokens_left: u32,
    /// When the session was loaded.
    pub timestamp: Timestamp,
    /// Present while a token clock exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<u32>,
}

/// `BUTTON_<index + 1>`.
pub fn button_name(index: u8) -> heapless::String<12> {
    let mut name = heapless::String::new();
    // "BUTTON_" plus at most three digits always fits.
    let _ = core::fmt::write(&mut name, format_args!("BUTTON_{}", u16::from(index) + 1));
    name
}
