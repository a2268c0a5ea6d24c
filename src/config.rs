//! Machine settings
//!
//! All tunable parameters for a FullWash bay. Values can be overridden
//! via NVS (see [`crate::adapters::nvs`]); everything else in the crate
//! reads them from here instead of module-level constants.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Machine identifier as used in topic names and authorization tokens.
pub type MachineId = heapless::String<16>;

/// Shared secret for loader authorization tokens.
pub type AuthSecret = heapless::String<64>;

pub const DEFAULT_MACHINE_ID: &str = "99";
pub const DEFAULT_AUTH_SECRET: &str = "fullwash-ble-secret-2025-change-in-production";

/// Per-bay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSettings {
    // --- Identity ---
    pub machine_id: MachineId,

    // --- Session timing ---
    /// Usage time bought by one token (ms).
    pub token_time_ms: u32,
    /// Inactivity logout once no tokens remain (ms).
    pub inactivity_timeout_ms: u32,
    /// Window after entering IDLE or PAUSED during which token time is frozen (ms).
    pub grace_period_ms: u32,

    // --- Button handling ---
    pub debounce_delay_ms: u32,
    /// Minimum spacing between a pause and the following resume (ms).
    pub pause_resume_cooldown_ms: u32,
    /// Pause requests this soon after a function switch are ignored (ms).
    pub function_switch_cooldown_ms: u32,
    /// Pause/stop requests this soon after a token starts are ignored (ms).
    pub activation_guard_ms: u32,

    // --- Coin acceptor ---
    /// Minimum spacing between two accepted coins (ms).
    pub coin_cooldown_ms: u32,
    pub coin_edge_window_ms: u32,
    pub coin_min_edges: u8,
    /// An edge window with no new edge for this long is discarded (ms).
    pub coin_window_reset_ms: u32,
    /// Coin input is ignored this long after boot (ms).
    pub startup_settle_ms: u32,

    // --- Loop / reporting ---
    pub state_publish_interval_ms: u32,
    /// Also bounds how late an input interrupt is serviced; a tap shorter
    /// than this can be missed by both input paths.
    pub control_loop_interval_ms: u32,
    /// Bounded wait for the shared I/O-expander lock (ms).
    pub bus_lock_timeout_ms: u32,

    // --- Loader ---
    pub load_auth_secret: AuthSecret,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            machine_id: truncated(DEFAULT_MACHINE_ID),

            token_time_ms: 120_000,         // 2 min
            inactivity_timeout_ms: 120_000, // 2 min
            grace_period_ms: 30_000,

            debounce_delay_ms: 50,
            pause_resume_cooldown_ms: 500,
            function_switch_cooldown_ms: 1_000,
            activation_guard_ms: 200,

            coin_cooldown_ms: 2_000,
            coin_edge_window_ms: 500,
            coin_min_edges: 2,
            coin_window_reset_ms: 1_000,
            startup_settle_ms: 3_000,

            state_publish_interval_ms: 10_000,
            control_loop_interval_ms: 10, // 100 Hz
            bus_lock_timeout_ms: 100,

            load_auth_secret: truncated(DEFAULT_AUTH_SECRET),
        }
    }
}

impl MachineSettings {
    /// Range-check every field. Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine_id.is_empty() || self.machine_id.contains(['/', '+', '#', '|']) {
            return Err(ConfigError::ValidationFailed(
                "machine_id must be non-empty without '/', '+', '#' or '|'",
            ));
        }
        if !(1_000..=3_600_000).contains(&self.token_time_ms) {
            return Err(ConfigError::ValidationFailed(
                "token_time_ms must be 1 s – 1 h",
            ));
        }
        if !(10_000..=3_600_000).contains(&self.inactivity_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "inactivity_timeout_ms must be 10 s – 1 h",
            ));
        }
        if self.grace_period_ms > 600_000 {
            return Err(ConfigError::ValidationFailed(
                "grace_period_ms must be ≤ 10 min",
            ));
        }
        if !(5..=500).contains(&self.debounce_delay_ms) {
            return Err(ConfigError::ValidationFailed(
                "debounce_delay_ms must be 5–500",
            ));
        }
        if self.activation_guard_ms >= self.token_time_ms {
            return Err(ConfigError::ValidationFailed(
                "activation_guard_ms must be shorter than a token",
            ));
        }
        if self.coin_min_edges < 2 {
            return Err(ConfigError::ValidationFailed("coin_min_edges must be ≥ 2"));
        }
        if self.coin_edge_window_ms == 0 || self.coin_window_reset_ms < self.coin_edge_window_ms {
            return Err(ConfigError::ValidationFailed(
                "coin_window_reset_ms must be ≥ coin_edge_window_ms > 0",
            ));
        }
        if !(1..=1_000).contains(&self.control_loop_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "control_loop_interval_ms must be 1–1000",
            ));
        }
        if self.state_publish_interval_ms < 1_000 {
            return Err(ConfigError::ValidationFailed(
                "state_publish_interval_ms must be ≥ 1 s",
            ));
        }
        if !(1..=1_000).contains(&self.bus_lock_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "bus_lock_timeout_ms must be 1–1000",
            ));
        }
        if self.load_auth_secret.len() < 16 {
            return Err(ConfigError::ValidationFailed(
                "load_auth_secret must be at least 16 bytes",
            ));
        }
        Ok(())
    }
}

/// Copy `s` into a fixed-capacity string, dropping whatever does not fit.
pub fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
