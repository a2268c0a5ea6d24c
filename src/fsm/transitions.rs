//! Transition functions.
//!
//! Each function applies one event to the [`MachineContext`], updating
//! state, timers, desired outputs and pending actions. None of them does
//! I/O; the controller decides *when* to call them and applies the
//! resulting outputs afterwards.
//!
//! ```text
//!            load / coin                  press(i), tokens > 0
//!   FREE ─────────────────▶ IDLE ──────────────────────────────▶ RUNNING(i)
//!    ▲                       │  ▲                                  │  ▲  │
//!    │                 grace │  │                    press(i)      │  │  │ press(j)
//!    │          auto-consume └──┘               (guards permitting)│  │  └──▶ RUNNING(j)
//!    │                                                             ▼  │
//!    │                                                        PAUSED(i)
//!    │                                       press(i|j), cooldown ─┘
//!    │
//!    └──── stop button · inactivity · last token expired ──── any loaded state
//! ```

use log::{debug, error, info, warn};

use crate::app::commands::SessionLoad;
use crate::clock::{Tick, Timestamp, elapsed_since};
use crate::error::MessageError;

use super::context::MachineContext;
use super::{MachineAction, MachineState, TokenChannel, TriggerType};

// ═══════════════════════════════════════════════════════════════════════════
//  Session entry
// ═══════════════════════════════════════════════════════════════════════════

/// Apply a remote session grant. Only valid while FREE.
pub fn load_session(
    ctx: &mut MachineContext,
    load: &SessionLoad,
    loaded_at: Timestamp,
    now: Tick,
) -> Result<(), MessageError> {
    if ctx.ledger.is_loaded {
        warn!(
            "load: rejected session {} while {} (session {})",
            load.session_id, ctx.state, ctx.ledger.session_id
        );
        return Err(MessageError::AlreadyLoaded);
    }

    ctx.ledger.clear();
    ctx.ledger.session_id.clone_from(&load.session_id);
    ctx.ledger.user_id.clone_from(&load.user_id);
    ctx.ledger.user_name.clone_from(&load.user_name);
    ctx.ledger.tokens = load.tokens;
    ctx.ledger.token_channel = TokenChannel::Digital;
    ctx.ledger.loaded_at = loaded_at;
    ctx.ledger.is_loaded = true;
    enter_idle(ctx, now);

    info!(
        "load: session {} for {} with {} token(s)",
        ctx.ledger.session_id, ctx.ledger.user_id, ctx.ledger.tokens
    );
    Ok(())
}

/// Accept one coin, creating an anonymous session if the bay is free.
pub fn accept_coin(ctx: &mut MachineContext, loaded_at: Timestamp, now: Tick) {
    ctx.ledger.add_physical();

    if ctx.ledger.is_loaded {
        if ctx.state == MachineState::Idle {
            ctx.timers.start_grace(now);
        }
    } else {
        ctx.ledger.session_id = format!("coin_{now}");
        ctx.ledger.user_id = "unknown".into();
        ctx.ledger.user_name.clear();
        ctx.ledger.loaded_at = loaded_at;
        ctx.ledger.is_loaded = true;
        enter_idle(ctx, now);
        info!("coin: anonymous session {}", ctx.ledger.session_id);
    }

    ctx.timers.last_action = now;
    info!(
        "coin: accepted, tokens={} (physical={})",
        ctx.ledger.tokens, ctx.ledger.physical_tokens
    );
    ctx.record(MachineAction::TokenInserted, TriggerType::Manual, now);
}

fn enter_idle(ctx: &mut MachineContext, now: Tick) {
    ctx.state = MachineState::Idle;
    ctx.active_button = None;
    ctx.timers = Default::default();
    ctx.timers.last_action = now;
    ctx.timers.start_grace(now);
    ctx.outputs.relays = 0;
    ctx.outputs.loaded_led = true;
    ctx.outputs.running_led = false;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Buttons
// ═══════════════════════════════════════════════════════════════════════════

/// Dispatch an accepted press of function button `button`.
pub fn press_function(ctx: &mut MachineContext, button: u8, now: Tick) {
    match ctx.state {
        MachineState::Free => {}
        MachineState::Idle => {
            activate(ctx, button, now);
        }
        MachineState::Running if ctx.active_button == Some(button) => pause(ctx, now),
        MachineState::Running => switch_function(ctx, button, now),
        MachineState::Paused => resume(ctx, button, now),
    }
}

/// IDLE → RUNNING on `button`. Returns whether the function started.
///
/// Invoked outside IDLE, the context is first forced back to IDLE with
/// relays off and transient timers cleared.
pub fn activate(ctx: &mut MachineContext, button: u8, now: Tick) -> bool {
    if ctx.state != MachineState::Idle {
        error!(
            "activate: invoked in {} (button {:?}), resetting to IDLE",
            ctx.state, ctx.active_button
        );
        ctx.state = MachineState::Idle;
        ctx.active_button = None;
        ctx.outputs.relays = 0;
        ctx.outputs.running_led = false;
        ctx.timers.clear_transient();
    }

    if ctx.ledger.consume().is_none() {
        warn!("activate: button {} pressed with no tokens", button + 1);
        return false;
    }

    ctx.timers.start_token(now);
    ctx.timers.grace_active = false;
    ctx.timers.last_action = now;
    ctx.state = MachineState::Running;
    ctx.active_button = Some(button);
    ctx.outputs.relays = 1 << button;
    ctx.outputs.running_led = true;

    info!("activate: button {} running, tokens left {}", button + 1, ctx.ledger.tokens);
    ctx.record(MachineAction::Start, TriggerType::Manual, now);
    true
}

fn pause(ctx: &mut MachineContext, now: Tick) {
    let since_start = elapsed_since(now, ctx.timers.token_start);
    if since_start < ctx.timing.activation_guard_ms {
        debug!("pause: ignored {since_start} ms after token start");
        return;
    }
    if let Some(t) = ctx.timers.last_function_switch {
        let since_switch = elapsed_since(now, t);
        if since_switch < ctx.timing.function_switch_cooldown_ms {
            debug!("pause: ignored {since_switch} ms after function switch");
            return;
        }
    }

    ctx.timers.start_grace(now);
    ctx.timers.last_pause_resume = Some(now);
    ctx.timers.last_action = now;
    ctx.state = MachineState::Paused;
    ctx.outputs.relays = 0;
    ctx.outputs.running_led = false;

    info!("pause: used {} ms of token", ctx.timers.token_elapsed);
    ctx.record(MachineAction::Pause, TriggerType::Manual, now);
}

fn switch_function(ctx: &mut MachineContext, button: u8, now: Tick) {
    let from = ctx.active_button;
    ctx.active_button = Some(button);
    ctx.outputs.relays = 1 << button;
    ctx.timers.last_function_switch = Some(now);
    ctx.timers.last_action = now;

    info!("switch: {:?} -> {}", from.map(|b| b + 1), button + 1);
    ctx.record(MachineAction::Start, TriggerType::Manual, now);
}

/// PAUSED → RUNNING on `button`, which may differ from the paused one.
fn resume(ctx: &mut MachineContext, button: u8, now: Tick) {
    if let Some(t) = ctx.timers.last_pause_resume {
        let since = elapsed_since(now, t);
        if since < ctx.timing.pause_resume_cooldown_ms {
            debug!("resume: ignored {since} ms after pause");
            return;
        }
    }

    ctx.timers.fold(now);
    ctx.timers.grace_active = false;
    ctx.timers.last_pause_resume = Some(now);
    ctx.timers.last_action = now;
    ctx.state = MachineState::Running;
    ctx.active_button = Some(button);
    ctx.outputs.relays = 1 << button;
    ctx.outputs.running_led = true;

    info!("resume: button {}, {} s left", button + 1, ctx.seconds_left(now));
    ctx.record(MachineAction::Resume, TriggerType::Manual, now);
}

/// Stop button. Ignored while unloaded and right after a token starts.
pub fn press_stop(ctx: &mut MachineContext, now: Tick) {
    if !ctx.ledger.is_loaded {
        return;
    }
    if ctx.state == MachineState::Running {
        let since_start = elapsed_since(now, ctx.timers.token_start);
        if since_start < ctx.timing.activation_guard_ms {
            debug!("stop: ignored {since_start} ms after token start");
            return;
        }
    }
    stop(ctx, TriggerType::Manual, now);
}

/// Any loaded state → FREE. The STOP action carries the session as it
/// was before clearing.
pub fn stop(ctx: &mut MachineContext, trigger: TriggerType, now: Tick) {
    info!(
        "stop: {:?} from {}, session {}, {} token(s) forfeited",
        trigger, ctx.state, ctx.ledger.session_id, ctx.ledger.tokens
    );
    ctx.record(MachineAction::Stop, trigger, now);

    ctx.ledger.clear();
    ctx.timers = Default::default();
    ctx.state = MachineState::Free;
    ctx.active_button = None;
    ctx.outputs.relays = 0;
    ctx.outputs.loaded_led = false;
    ctx.outputs.running_led = false;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Timer checks
// ═══════════════════════════════════════════════════════════════════════════

/// End an expired grace window. In IDLE with tokens and no token in use,
/// one token is consumed so time starts running without a selection.
pub fn check_grace_expiry(ctx: &mut MachineContext, now: Tick) {
    if !ctx.timers.grace_active
        || elapsed_since(now, ctx.timers.grace_start) < ctx.timing.grace_period_ms
    {
        return;
    }

    match ctx.state {
        MachineState::Idle if !ctx.timers.token_active && ctx.ledger.tokens > 0 => {
            ctx.ledger.consume();
            ctx.timers.grace_active = false;
            ctx.timers.start_token(now);
            ctx.timers.last_action = now;
            info!("grace: expired in IDLE, auto-consumed, tokens left {}", ctx.ledger.tokens);
            ctx.record(MachineAction::Start, TriggerType::Automatic, now);
        }
        MachineState::Idle | MachineState::Paused => {
            ctx.timers.end_grace(now);
            debug!("grace: expired in {}", ctx.state);
        }
        MachineState::Running | MachineState::Free => ctx.timers.grace_active = false,
    }
}

/// Log out an inactive session. Returns `true` if the machine stopped.
pub fn check_inactivity(ctx: &mut MachineContext, now: Tick) -> bool {
    if !ctx.state.is_loaded() {
        return false;
    }
    let idle_for = elapsed_since(now, ctx.timers.last_action);
    let horizon = ctx.inactivity_horizon();
    if idle_for <= horizon {
        return false;
    }
    warn!("inactivity: {idle_for} ms without action (limit {horizon} ms)");
    stop(ctx, TriggerType::Automatic, now);
    true
}

/// Roll over to the next token or stop. Returns `true` if the state changed.
pub fn check_token_expiry(ctx: &mut MachineContext, now: Tick) -> bool {
    if !ctx.timers.token_active || ctx.timers.token_used(now) < ctx.timing.token_time_ms {
        return false;
    }

    if ctx.ledger.consume().is_some() {
        ctx.timers.start_token(now);
        ctx.timers.last_action = now;
        info!("token: expired, next consumed, tokens left {}", ctx.ledger.tokens);
        ctx.record(MachineAction::Start, TriggerType::Automatic, now);
        false
    } else {
        info!("token: expired, none left");
        stop(ctx, TriggerType::Automatic, now);
        true
    }
}
