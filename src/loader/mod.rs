//! Remote session loader.
//!
//! A phone app writes the grant field by field over short-range radio,
//! then sends `LOAD|<authToken>`. The loader validates the whole request
//! and, if the machine is free, produces a [`SessionLoad`] that the
//! controller applies exactly like a backend session load.
//!
//! ```text
//!  set_user_id ──┐
//!  set_user_name ├──▶ LoadRequest ──▶ receive_command("LOAD|tok") ──▶ process()
//!  set_tokens ───┘                                                      │
//!                                     status(): "Error: …" ◀── Err ─────┤
//!                                     SessionLoad "ble_<tick>" ◀── Ok ──┘
//! ```
//!
//! Every write updates [`RemoteLoader::status`], which the radio adapter
//! mirrors to its status characteristic.

pub mod auth;

use log::{error, info, warn};

use crate::app::commands::SessionLoad;
use crate::clock::Tick;
use crate::config::{AuthSecret, MachineId};
use crate::error::LoadError;
use crate::fsm::MachineState;

use auth::Expected;

/// Longest accepted user id or user name, in bytes.
pub const MAX_FIELD_LEN: usize = 100;

/// Largest grant a single load may carry.
pub const MAX_TOKENS: u32 = 100;

const LOAD_PREFIX: &str = "LOAD";

/// Fields collected so far.
#[derive(Debug, Clone, Default)]
struct LoadRequest {
    user_id: String,
    user_name: String,
    tokens: u32,
    auth_token: String,
    received_at: Tick,
}

pub struct RemoteLoader {
    machine_id: MachineId,
    secret: AuthSecret,
    request: LoadRequest,
    status: String,
}

impl RemoteLoader {
    pub fn new(machine_id: MachineId, secret: AuthSecret) -> Self {
        Self {
            machine_id,
            secret,
            request: LoadRequest::default(),
            status: String::new(),
        }
    }

    /// Last status line, as shown to the client.
    pub fn status(&self) -> &str {
        &self.status
    }

    // ── Field writes ──────────────────────────────────────────

    pub fn set_user_id(&mut self, raw: &str) -> Result<(), LoadError> {
        let value = raw.trim();
        if value.is_empty() || value.len() > MAX_FIELD_LEN {
            warn!("loader: user id length {} out of range", value.len());
            return self.fail(LoadError::InvalidUserId);
        }
        self.request.user_id = value.into();
        info!("loader: user id set");
        self.set_status("User ID received");
        Ok(())
    }

    pub fn set_user_name(&mut self, raw: &str) -> Result<(), LoadError> {
        let value = raw.trim();
        if value.is_empty() || value.len() > MAX_FIELD_LEN {
            warn!("loader: user name length {} out of range", value.len());
            return self.fail(LoadError::InvalidUserName);
        }
        self.request.user_name = value.into();
        self.set_status("User name received");
        Ok(())
    }

    pub fn set_tokens(&mut self, raw: &str) -> Result<(), LoadError> {
        match raw.trim().parse::<u32>() {
            Ok(n) if (1..=MAX_TOKENS).contains(&n) => {
                self.request.tokens = n;
                self.set_status("Tokens received");
                Ok(())
            }
            _ => {
                warn!("loader: invalid token count {raw:?}");
                self.fail(LoadError::InvalidTokenCount)
            }
        }
    }

    /// Handle a write to the command field. Only `LOAD|<token>` is known;
    /// on success the request is validated against the controller state.
    pub fn receive_command(
        &mut self,
        raw: &str,
        now: Tick,
        state: MachineState,
    ) -> Result<SessionLoad, LoadError> {
        let command = raw.trim();
        if !command.starts_with(LOAD_PREFIX) {
            warn!("loader: unknown command");
            return self.fail(LoadError::UnknownCommand);
        }
        let token = match command.split_once('|') {
            Some((_, token)) if !token.is_empty() => token,
            _ => return self.fail(LoadError::MissingAuthToken),
        };
        self.request.auth_token = token.into();
        self.request.received_at = now;
        info!("loader: load command received (token {} bytes)", token.len());
        self.process(now, state)
    }

    /// Validate the collected request. On success the request is cleared
    /// and the session load returned; on failure nothing is loaded.
    pub fn process(&mut self, now: Tick, state: MachineState) -> Result<SessionLoad, LoadError> {
        match self.check(now, state) {
            Ok(()) => {
                let req = core::mem::take(&mut self.request);
                info!("loader: machine loaded for {} with {} token(s)", req.user_id, req.tokens);
                self.set_status("Success: Machine loaded");
                Ok(SessionLoad {
                    session_id: format!("ble_{now}"),
                    user_id: req.user_id,
                    user_name: req.user_name,
                    tokens: req.tokens,
                    timestamp: None,
                })
            }
            Err(e) => {
                error!("loader: load failed: {e:?}");
                self.fail(e)
            }
        }
    }

    fn check(&self, now: Tick, state: MachineState) -> Result<(), LoadError> {
        let req = &self.request;
        if req.user_id.is_empty() {
            return Err(LoadError::UserIdNotSet);
        }
        if req.user_name.is_empty() {
            return Err(LoadError::UserNameNotSet);
        }
        if req.tokens == 0 {
            return Err(LoadError::InvalidTokenCount);
        }
        if req.auth_token.is_empty() {
            return Err(LoadError::AuthTokenNotSet);
        }
        auth::validate_token(
            &req.auth_token,
            Expected {
                user_id: &req.user_id,
                machine_id: &self.machine_id,
                tokens: req.tokens,
            },
            req.received_at,
            now,
            self.secret.as_bytes(),
        )?;
        if state != MachineState::Free {
            return Err(LoadError::MachineBusy);
        }
        Ok(())
    }

    fn fail<T>(&mut self, e: LoadError) -> Result<T, LoadError> {
        self.status = format!("Error: {e}");
        Err(e)
    }

    fn set_status(&mut self, text: &str) {
        text.clone_into(&mut self.status);
    }
}
