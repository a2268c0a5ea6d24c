//! Inbound messages to the controller.
//!
//! These arrive from the broker (session loads, clock syncs) or from the
//! remote loader, and are applied by
//! [`Controller::handle_message`](super::service::Controller::handle_message).

use serde::{Deserialize, Deserializer};

use crate::error::MessageError;

/// A session grant: who is using the bay and with how many tokens.
///
/// Every field but `timestamp` must be present on the wire; a payload
/// missing one is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SessionLoad {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    /// Negative counts are treated as zero.
    #[serde(deserialize_with = "non_negative")]
    pub tokens: u32,
    /// ISO-8601 wall-clock time of the grant, if the sender knows it.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl SessionLoad {
    /// Parse and check a session-load payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        let load: Self = serde_json::from_slice(payload).map_err(|_| MessageError::Malformed)?;
        load.validate()?;
        Ok(load)
    }

    pub fn validate(&self) -> Result<(), MessageError> {
        if self.session_id.is_empty() {
            return Err(MessageError::MissingField("session_id"));
        }
        if self.user_id.is_empty() {
            return Err(MessageError::MissingField("user_id"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ConfigPayload {
    timestamp: Option<String>,
}

/// Messages the controller understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    LoadSession(SessionLoad),
    /// Wall-clock update only; no state effect.
    Config { timestamp: String },
}

impl InboundMessage {
    pub fn config_from_json(payload: &[u8]) -> Result<Self, MessageError> {
        let cfg: ConfigPayload =
            serde_json::from_slice(payload).map_err(|_| MessageError::Malformed)?;
        match cfg.timestamp {
            Some(timestamp) if !timestamp.is_empty() => Ok(Self::Config { timestamp }),
            _ => Err(MessageError::MissingField("timestamp")),
        }
    }
}

fn non_negative<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = i64::deserialize(d)?;
    Ok(n.clamp(0, i64::from(u32::MAX)) as u32)
}
