//! Session/token state machine.
//!
//! The machine is event-driven rather than table-driven: button presses,
//! coins, remote loads and timer checks each map to one function in
//! [`transitions`], all of which mutate a single [`MachineContext`]
//! blackboard and never touch hardware.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  MachineContext                                              │
//! │  ┌──────────┬──────────────┬──────────────┬───────────────┐  │
//! │  │  state   │ SessionLedger│ SessionTimers│ Outputs       │  │
//! │  │  active  │ tokens, ids  │ token clock, │ relays, LEDs  │  │
//! │  │  button  │ is_loaded    │ grace, guards│ pending events│  │
//! │  └──────────┴──────────────┴──────────────┴───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!              ▲ transitions::*              │
//!              │                             ▼
//!        Controller (reads inputs)    Controller (drives relays,
//!                                      emits events)
//! ```

pub mod context;
pub mod transitions;

pub use context::MachineContext;

use serde::Serialize;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Top-level machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// No session; only coins are accepted.
    #[default]
    Free,
    /// Session loaded, no function selected.
    Idle,
    /// One function energized.
    Running,
    /// Function selected but relay off.
    Paused,
}

impl MachineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
        }
    }

    pub const fn is_loaded(self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl core::fmt::Display for MachineState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action vocabulary shared with the event layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineAction {
    Setup,
    Start,
    Stop,
    Pause,
    Resume,
    TokenInserted,
}

impl MachineAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::TokenInserted => "TOKEN_INSERTED",
        }
    }
}

/// Whether an action came from a person or from a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Automatic,
}

/// Origin of the token an action concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenChannel {
    /// Granted remotely (backend or loader).
    #[default]
    Digital,
    /// Inserted as a coin.
    Physical,
}
