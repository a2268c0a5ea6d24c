//! Shared mutable context threaded through every transition.
//!
//! `MachineContext` is the blackboard the transition functions read from
//! and write to: the session ledger, the token/grace timers, the desired
//! outputs and the actions waiting to be published. The controller owns
//! exactly one.

use crate::clock::{Tick, Timestamp, elapsed_since};
use crate::config::MachineSettings;

use super::{MachineAction, MachineState, TokenChannel, TriggerType};

// ---------------------------------------------------------------------------
// Session ledger
// ---------------------------------------------------------------------------

/// Who is using the bay and how many tokens they have left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLedger {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    /// Remaining usage units, coins included.
    pub tokens: u32,
    /// Coin-inserted subset of `tokens`; informational only.
    pub physical_tokens: u32,
    pub is_loaded: bool,
    /// Channel of the most recently consumed or added token.
    pub token_channel: TokenChannel,
    /// Wall-clock time the session was created (empty if unsynced).
    pub loaded_at: Timestamp,
}

impl SessionLedger {
    /// Take one token, physical ones first. `None` when empty.
    pub fn consume(&mut self) -> Option<TokenChannel> {
        if self.tokens == 0 {
            return None;
        }
        self.tokens -= 1;
        let channel = if self.physical_tokens > 0 {
            self.physical_tokens -= 1;
            TokenChannel::Physical
        } else {
            TokenChannel::Digital
        };
        self.token_channel = channel;
        Some(channel)
    }

    pub fn add_physical(&mut self) {
        self.tokens = self.tokens.saturating_add(1);
        self.physical_tokens = self.physical_tokens.saturating_add(1);
        self.token_channel = TokenChannel::Physical;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Every timestamp the state machine keeps, all in wrapping ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTimers {
    /// Last user action; the inactivity horizon is measured from here.
    pub last_action: Tick,

    /// A token has been consumed and has not yet expired.
    pub token_active: bool,
    /// Tick the token clock last (re)started counting.
    pub token_start: Tick,
    /// Token time accumulated before `token_start`.
    pub token_elapsed: u32,

    pub grace_active: bool,
    pub grace_start: Tick,

    pub last_pause_resume: Option<Tick>,
    pub last_function_switch: Option<Tick>,
}

impl SessionTimers {
    /// The token clock advances only while a token exists and no grace
    /// window is open.
    pub fn clock_running(&self) -> bool {
        self.token_active && !self.grace_active
    }

    /// Token time used so far at `now`.
    pub fn token_used(&self, now: Tick) -> u32 {
        if self.clock_running() {
            self.token_elapsed
                .saturating_add(elapsed_since(now, self.token_start))
        } else {
            self.token_elapsed
        }
    }

    /// Begin a fresh token at `now`.
    pub fn start_token(&mut self, now: Tick) {
        self.token_active = true;
        self.token_elapsed = 0;
        self.token_start = now;
    }

    /// Fold running time into `token_elapsed` and restart the clock at `now`.
    pub fn fold(&mut self, now: Tick) {
        if self.clock_running() {
            self.token_elapsed = self.token_used(now);
        }
        self.token_start = now;
    }

    /// Open a grace window; the token clock stops at `now`.
    pub fn start_grace(&mut self, now: Tick) {
        self.fold(now);
        self.grace_active = true;
        self.grace_start = now;
    }

    /// Close the grace window; the token clock resumes from `now`.
    pub fn end_grace(&mut self, now: Tick) {
        self.grace_active = false;
        self.token_start = now;
    }

    /// Clear the anti-retrigger guards and any grace window.
    pub fn clear_transient(&mut self) {
        self.grace_active = false;
        self.last_pause_resume = None;
        self.last_function_switch = None;
    }
}

// ---------------------------------------------------------------------------
// Outputs (written by transitions, applied by the controller)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outputs {
    /// Desired function-relay bitmap, bit *i* = relay *i*.
    pub relays: u8,
    pub loaded_led: bool,
    pub running_led: bool,
}

/// An action captured at the moment it happened, before later
/// transitions in the same cycle can change the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub action: MachineAction,
    pub trigger: TriggerType,
    pub button: Option<u8>,
    pub channel: TokenChannel,
    pub session_id: String,
    pub user_id: String,
    pub tokens_left: u32,
    pub physical_tokens: u32,
    /// Present only while a function is running.
    pub seconds_left: Option<u32>,
    pub at: Tick,
}

// ---------------------------------------------------------------------------
// Timing parameters (subset of MachineSettings)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub token_time_ms: u32,
    pub inactivity_timeout_ms: u32,
    pub grace_period_ms: u32,
    pub pause_resume_cooldown_ms: u32,
    pub function_switch_cooldown_ms: u32,
    pub activation_guard_ms: u32,
}

impl From<&MachineSettings> for SessionTiming {
    fn from(s: &MachineSettings) -> Self {
        Self {
            token_time_ms: s.token_time_ms,
            inactivity_timeout_ms: s.inactivity_timeout_ms,
            grace_period_ms: s.grace_period_ms,
            pause_resume_cooldown_ms: s.pause_resume_cooldown_ms,
            function_switch_cooldown_ms: s.function_switch_cooldown_ms,
            activation_guard_ms: s.activation_guard_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// The context itself
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MachineContext {
    pub state: MachineState,
    /// Selected function, if any. At most one relay is ever energized.
    pub active_button: Option<u8>,
    pub ledger: SessionLedger,
    pub timers: SessionTimers,
    pub outputs: Outputs,
    pub timing: SessionTiming,
    /// Actions not yet handed to the event sink.
    pub pending: Vec<ActionRecord>,
}

impl MachineContext {
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            state: MachineState::Free,
            active_button: None,
            ledger: SessionLedger::default(),
            timers: SessionTimers::default(),
            outputs: Outputs::default(),
            timing,
            pending: Vec::new(),
        }
    }

    /// Token time left on the current token, in ms.
    pub fn token_ms_left(&self, now: Tick) -> u32 {
        if !self.timers.token_active {
            return 0;
        }
        self.timing
            .token_time_ms
            .saturating_sub(self.timers.token_used(now))
    }

    pub fn seconds_left(&self, now: Tick) -> u32 {
        self.token_ms_left(now) / 1000
    }

    /// Inactivity logout horizon: base + remaining tokens, plus the token
    /// currently being consumed.
    pub fn inactivity_horizon(&self) -> u32 {
        let per_token = self.timing.token_time_ms;
        let in_use = if self.timers.token_active { per_token } else { 0 };
        self.timing
            .inactivity_timeout_ms
            .saturating_add(self.ledger.tokens.saturating_mul(per_token))
            .saturating_add(in_use)
    }

    /// Milliseconds until the inactivity logout fires (0 when unloaded).
    pub fn time_to_inactivity(&self, now: Tick) -> u32 {
        if !self.state.is_loaded() {
            return 0;
        }
        self.inactivity_horizon()
            .saturating_sub(elapsed_since(now, self.timers.last_action))
    }

    /// Snapshot the ledger into a pending action.
    pub fn record(&mut self, action: MachineAction, trigger: TriggerType, now: Tick) {
        let seconds_left =
            (self.state == MachineState::Running).then(|| self.seconds_left(now));
        self.pending.push(ActionRecord {
            action,
            trigger,
            button: self.active_button,
            channel: self.ledger.token_channel,
            session_id: self.ledger.session_id.clone(),
            user_id: self.ledger.user_id.clone(),
            tokens_left: self.ledger.tokens,
            physical_tokens: self.ledger.physical_tokens,
            seconds_left,
            at: now,
        });
    }
}
