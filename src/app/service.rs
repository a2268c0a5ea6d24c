//! Application service: the hexagonal core.
//!
//! [`Controller`] owns the session state machine, the input debouncers
//! and the wall clock. All I/O flows through port traits injected at
//! call sites, so the whole service runs against mock adapters on the
//! host.
//!
//! ```text
//!   IoPort ─────▶ ┌──────────────────────────┐ ──▶ EventSink
//!   EdgePort ───▶ │        Controller        │
//!                 │ debounce · FSM · ledger  │ ──▶ IoPort (relays)
//!   Inbound ────▶ └──────────────────────────┘ ──▶ IndicatorPort
//! ```
//!
//! ## Cycle priority
//!
//! | # | Step                                        | Notes                        |
//! |---|---------------------------------------------|------------------------------|
//! | 1 | grace-period expiry                         | may auto-consume in IDLE     |
//! | 2 | inactivity timeout                          | stops and ends the cycle     |
//! | 3 | coin input                                  | every state                  |
//! | 4 | buttons (edge path, then level path)        | loaded states only           |
//! | 5 | token expiry                                | next token or stop           |
//! | 6 | relay reconciliation, indicators, events    | failed relay writes retried  |

use log::{debug, info, warn};

use crate::clock::{Tick, Timestamp, WallClock, elapsed_since};
use crate::config::MachineSettings;
use crate::drivers::button::ButtonDebouncer;
use crate::drivers::coin::CoinDetector;
use crate::error::MessageError;
use crate::fsm::context::{ActionRecord, SessionTiming};
use crate::fsm::{MachineContext, MachineAction, MachineState, transitions};
use crate::pins::{
    BUTTON_BITS, COIN_BIT, FUNCTION_RELAY_MASK, LIGHTING_RELAY, NUM_BUTTONS, NUM_RELAYS,
    RELAY_NAMES, STOP_BIT,
};

use super::commands::InboundMessage;
use super::events::{
    ActionContext, ActionEvent, AppEvent, SessionMetadata, StateReport, button_name,
};
use super::ports::{EdgePort, EventSink, IndicatorPort, InputEdges, IoPort};

/// Debouncer channel used for the stop button, after the function buttons.
const STOP_CHANNEL: usize = NUM_BUTTONS;

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller {
    ctx: MachineContext,
    settings: MachineSettings,
    clock: WallClock,
    buttons: ButtonDebouncer<{ NUM_BUTTONS + 1 }>,
    coin: CoinDetector,

    /// Function-relay bitmap as last successfully written.
    applied_relays: u8,
    applied_loaded: Option<bool>,
    applied_running: Option<bool>,

    last_report: Option<Tick>,
    last_reported_state: MachineState,
}

impl Controller {
    /// Build the controller. `boot` is the tick the coin settle period
    /// is measured from.
    ///
    /// Does **not** touch hardware; call [`start`](Self::start) next.
    pub fn new(settings: MachineSettings, boot: Tick) -> Self {
        Self {
            ctx: MachineContext::new(SessionTiming::from(&settings)),
            buttons: ButtonDebouncer::new(settings.debounce_delay_ms),
            coin: CoinDetector::new(&settings, boot),
            clock: WallClock::new(),
            applied_relays: 0,
            applied_loaded: None,
            applied_running: None,
            last_report: None,
            last_reported_state: MachineState::Free,
            settings,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring outputs to a known state and announce the machine.
    pub fn start(
        &mut self,
        now: Tick,
        hw: &mut (impl IoPort + IndicatorPort),
        sink: &mut impl EventSink,
    ) {
        self.applied_relays = match hw.read_relay_bitmap() {
            Ok(bits) => bits & FUNCTION_RELAY_MASK,
            Err(e) => {
                warn!("start: relay read-back failed ({e}), forcing all off");
                FUNCTION_RELAY_MASK
            }
        };
        if let Err(e) = hw.set_relay(LIGHTING_RELAY, true) {
            warn!("start: could not switch on {} ({e})", RELAY_NAMES[LIGHTING_RELAY as usize]);
        }
        self.apply_outputs(hw);

        sink.emit(&AppEvent::Action(ActionEvent {
            machine_id: self.settings.machine_id.clone(),
            action: MachineAction::Setup,
            timestamp: self.clock.timestamp(now),
            session: None,
        }));
        self.report_state(now, sink);

        info!("Controller started for machine {}", self.settings.machine_id);
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one control cycle.
    ///
    /// The `hw` parameter satisfies all three hardware ports; this avoids
    /// a triple mutable borrow while keeping the port boundary explicit.
    pub fn update(
        &mut self,
        now: Tick,
        hw: &mut (impl IoPort + EdgePort + IndicatorPort),
        sink: &mut impl EventSink,
    ) {
        // 1. Grace period
        transitions::check_grace_expiry(&mut self.ctx, now);

        // 2. Inactivity ends the cycle
        if transitions::check_inactivity(&mut self.ctx, now) {
            self.finish_cycle(now, hw, sink);
            return;
        }

        // 3. Coin (also consumes the edge event for the buttons below)
        let edges = self.poll_coin(now, hw);

        // 4. Buttons
        if self.ctx.ledger.is_loaded {
            self.poll_buttons(now, edges, hw);
        }

        // 5. Token expiry
        transitions::check_token_expiry(&mut self.ctx, now);

        // 6. Outputs and notifications
        self.finish_cycle(now, hw, sink);
    }

    /// Apply one inbound message. Malformed or out-of-turn messages are
    /// rejected without touching the ledger.
    pub fn handle_message(&mut self, msg: InboundMessage, now: Tick) -> Result<(), MessageError> {
        match msg {
            InboundMessage::LoadSession(load) => {
                load.validate()?;
                if let Some(ts) = load.timestamp.as_deref().filter(|ts| !ts.is_empty()) {
                    if let Err(e) = self.clock.sync(ts, now) {
                        warn!("load: ignoring timestamp {ts:?} ({e})");
                    }
                }
                let loaded_at = self.clock.timestamp(now);
                transitions::load_session(&mut self.ctx, &load, loaded_at, now)
            }
            InboundMessage::Config { timestamp } => {
                self.clock.sync(&timestamp, now)?;
                debug!("config: clock synced to {timestamp}");
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> MachineState {
        self.ctx.state
    }

    /// Selected function, 0-based.
    pub fn active_button(&self) -> Option<u8> {
        self.ctx.active_button
    }

    pub fn is_loaded(&self) -> bool {
        self.ctx.ledger.is_loaded
    }

    pub fn tokens_left(&self) -> u32 {
        self.ctx.ledger.tokens
    }

    pub fn physical_tokens(&self) -> u32 {
        self.ctx.ledger.physical_tokens
    }

    pub fn user_name(&self) -> &str {
        &self.ctx.ledger.user_name
    }

    pub fn session_id(&self) -> &str {
        &self.ctx.ledger.session_id
    }

    /// Whole seconds left on the current token (0 when none is active).
    pub fn seconds_left(&self, now: Tick) -> u32 {
        self.ctx.seconds_left(now)
    }

    /// Whole seconds until the inactivity logout (0 when unloaded).
    pub fn time_to_inactivity_timeout(&self, now: Tick) -> u32 {
        self.ctx.time_to_inactivity(now) / 1000
    }

    /// Function-relay bitmap the state machine wants energized.
    pub fn desired_relays(&self) -> u8 {
        self.ctx.outputs.relays
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn wall_clock(&self) -> &WallClock {
        &self.clock
    }

    // ── Inputs ────────────────────────────────────────────────

    fn poll_coin(&mut self, now: Tick, hw: &mut (impl IoPort + EdgePort)) -> InputEdges {
        let bits = match hw.read_coin_bitmap() {
            Ok(bits) => bits,
            Err(e) => {
                // Leave any pending edge for the next cycle.
                warn!("coin: input read failed ({e}), skipping cycle");
                return InputEdges::default();
            }
        };

        let edges = if hw.is_event_pending() {
            hw.consume_event().unwrap_or_else(|e| {
                warn!("edge: read failed ({e})");
                InputEdges::default()
            })
        } else {
            InputEdges::default()
        };

        let active = bits & (1 << COIN_BIT) == 0;
        if let Some(trigger) = self.coin.sample(active, edges.fell_on(COIN_BIT), now) {
            debug!("coin: {:?} in {}", trigger, self.ctx.state);
            let loaded_at = self.clock.timestamp(now);
            transitions::accept_coin(&mut self.ctx, loaded_at, now);
        }
        edges
    }

    fn poll_buttons(&mut self, now: Tick, edges: InputEdges, hw: &mut impl IoPort) {
        // Edge path first; those channels skip level polling this cycle.
        let mut handled = 0u8;
        for (channel, &bit) in BUTTON_BITS.iter().enumerate() {
            if edges.fell_on(bit) {
                self.buttons.mark_pressed(channel, now);
                handled |= 1 << channel;
                self.on_function_press(channel as u8, now);
            }
        }
        if edges.fell_on(STOP_BIT) {
            self.buttons.mark_pressed(STOP_CHANNEL, now);
            handled |= 1 << STOP_CHANNEL;
            transitions::press_stop(&mut self.ctx, now);
        }

        let bits = match hw.read_button_bitmap() {
            Ok(bits) => bits,
            Err(e) => {
                warn!("buttons: input read failed ({e}), skipping level poll");
                return;
            }
        };

        for (channel, &bit) in BUTTON_BITS.iter().enumerate() {
            if handled & (1 << channel) != 0 {
                continue;
            }
            let pressed = bits & (1 << bit) == 0;
            if self.buttons.sample(channel, pressed, now) {
                self.on_function_press(channel as u8, now);
            }
        }
        if handled & (1 << STOP_CHANNEL) == 0 {
            let pressed = bits & (1 << STOP_BIT) == 0;
            if self.buttons.sample(STOP_CHANNEL, pressed, now) {
                transitions::press_stop(&mut self.ctx, now);
            }
        }
    }

    fn on_function_press(&mut self, button: u8, now: Tick) {
        // A stop earlier in the same cycle may have unloaded the machine.
        if !self.ctx.ledger.is_loaded {
            return;
        }
        debug!("button {} pressed in {}", button + 1, self.ctx.state);
        transitions::press_function(&mut self.ctx, button, now);
    }

    // ── Outputs ───────────────────────────────────────────────

    fn finish_cycle(
        &mut self,
        now: Tick,
        hw: &mut (impl IoPort + IndicatorPort),
        sink: &mut impl EventSink,
    ) {
        self.apply_outputs(hw);
        self.flush_actions(sink);

        let state_changed = self.ctx.state != self.last_reported_state;
        let interval_due = self.last_report.is_none_or(|t| {
            elapsed_since(now, t) >= self.settings.state_publish_interval_ms
        });
        if state_changed || interval_due {
            if interval_due {
                self.verify_relays(hw);
            }
            self.report_state(now, sink);
        }
    }

    /// Drive relays toward the desired bitmap: everything that must go off
    /// first, then what must come on. Stops at the first failure; the rest
    /// is retried next cycle.
    fn apply_outputs(&mut self, hw: &mut (impl IoPort + IndicatorPort)) {
        let desired = self.ctx.outputs.relays & FUNCTION_RELAY_MASK;
        let diff = desired ^ self.applied_relays;

        'passes: for turn_on in [false, true] {
            for index in 0..NUM_RELAYS as u8 {
                let bit = 1 << index;
                if diff & bit == 0 || (desired & bit != 0) != turn_on {
                    continue;
                }
                match hw.set_relay(index, turn_on) {
                    Ok(()) => {
                        self.applied_relays = (self.applied_relays & !bit) | (desired & bit);
                        debug!(
                            "relay {} ({}) {}",
                            index,
                            RELAY_NAMES[index as usize],
                            if turn_on { "on" } else { "off" }
                        );
                    }
                    Err(e) => {
                        warn!("relay {index}: write failed ({e}), will retry");
                        break 'passes;
                    }
                }
            }
        }

        let loaded = self.ctx.outputs.loaded_led;
        if self.applied_loaded != Some(loaded) {
            hw.set_loaded(loaded);
            self.applied_loaded = Some(loaded);
        }
        let running = self.ctx.outputs.running_led;
        if self.applied_running != Some(running) {
            hw.set_running(running);
            self.applied_running = Some(running);
        }
    }

    /// Compare the expander's output port against what we believe we wrote.
    fn verify_relays(&mut self, hw: &mut impl IoPort) {
        match hw.read_relay_bitmap() {
            Ok(bits) => {
                let actual = bits & FUNCTION_RELAY_MASK;
                if actual != self.applied_relays {
                    warn!(
                        "relays: read back {:#08b}, expected {:#08b}; resyncing",
                        actual, self.applied_relays
                    );
                    self.applied_relays = actual;
                }
            }
            Err(e) => debug!("relays: read-back skipped ({e})"),
        }
    }

    fn flush_actions(&mut self, sink: &mut impl EventSink) {
        for record in core::mem::take(&mut self.ctx.pending) {
            let event = self.action_event(record);
            sink.emit(&AppEvent::Action(event));
        }
    }

    fn action_event(&self, rec: ActionRecord) -> ActionEvent {
        ActionEvent {
            machine_id: self.settings.machine_id.clone(),
            action: rec.action,
            timestamp: self.clock.timestamp(rec.at),
            session: Some(ActionContext {
                trigger_type: rec.trigger,
                button_name: rec.button.map(button_name),
                session_id: rec.session_id,
                user_id: rec.user_id,
                token_channel: rec.channel,
                tokens_left: rec.tokens_left,
                physical_tokens: rec.physical_tokens,
                seconds_left: rec.seconds_left,
            }),
        }
    }

    fn report_state(&mut self, now: Tick, sink: &mut impl EventSink) {
        let ledger = &self.ctx.ledger;
        let session_metadata = ledger.is_loaded.then(|| SessionMetadata {
            session_id: ledger.session_id.clone(),
            user_id: ledger.user_id.clone(),
            user_name: ledger.user_name.clone(),
            tokens_left: ledger.tokens,
            timestamp: ledger.loaded_at.clone(),
            seconds_left: self
                .ctx
                .timers
                .token_active
                .then(|| self.ctx.seconds_left(now)),
        });
        let report = StateReport {
            machine_id: self.settings.machine_id.clone(),
            timestamp: self.timestamp(now),
            status: self.ctx.state,
            session_metadata,
        };
        sink.emit(&AppEvent::State(report));
        self.last_report = Some(now);
        self.last_reported_state = self.ctx.state;
    }

    fn timestamp(&self, now: Tick) -> Timestamp {
        self.clock.timestamp(now)
    }
}
