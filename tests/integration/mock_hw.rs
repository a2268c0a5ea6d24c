//! Mock hardware adapter for integration tests.
//!
//! Models the expander's two ports as plain bytes: tests script the input
//! levels (and optional interrupt edges), and every relay write is
//! recorded so assertions can check both the final outputs and the
//! command history.

use fullwash::app::events::AppEvent;
use fullwash::app::ports::{EdgePort, EventSink, IndicatorPort, InputEdges, IoPort};
use fullwash::app::service::Controller;
use fullwash::clock::Tick;
use fullwash::config::MachineSettings;
use fullwash::error::BusError;
use fullwash::fsm::{MachineAction, MachineState, TriggerType};
use fullwash::pins::FUNCTION_RELAY_MASK;

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    /// Port 0 as the expander reads it; pulled up, so 0xFF is "nothing pressed".
    pub inputs: u8,
    /// Port 1 as currently driven.
    pub outputs: u8,
    /// Inputs that fell since the last interrupt was serviced.
    pub pending_fell: u8,
    pub interrupt: bool,

    pub fail_reads: bool,
    pub fail_writes: bool,

    pub relay_calls: Vec<(u8, bool)>,
    pub loaded_led: bool,
    pub running_led: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            inputs: 0xFF,
            outputs: 0,
            pending_fell: 0,
            interrupt: false,
            fail_reads: false,
            fail_writes: false,
            relay_calls: Vec::new(),
            loaded_led: false,
            running_led: false,
        }
    }

    /// Hold input `bit` at its active (low) level.
    pub fn press(&mut self, bit: u8) {
        self.inputs &= !(1 << bit);
    }

    pub fn release(&mut self, bit: u8) {
        self.inputs |= 1 << bit;
    }

    /// Press `bit` and raise the interrupt line, as the expander would.
    pub fn press_with_interrupt(&mut self, bit: u8) {
        self.press(bit);
        self.pending_fell |= 1 << bit;
        self.interrupt = true;
    }

    /// Function relays currently energized.
    pub fn function_relays(&self) -> u8 {
        self.outputs & FUNCTION_RELAY_MASK
    }

    pub fn relay_on(&self, index: u8) -> bool {
        self.outputs & (1 << index) != 0
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPort for MockHardware {
    fn read_button_bitmap(&mut self) -> Result<u8, BusError> {
        if self.fail_reads {
            return Err(BusError::LockTimeout);
        }
        Ok(self.inputs)
    }

    fn set_relay(&mut self, index: u8, on: bool) -> Result<(), BusError> {
        if self.fail_writes {
            return Err(BusError::Transfer);
        }
        self.relay_calls.push((index, on));
        if on {
            self.outputs |= 1 << index;
        } else {
            self.outputs &= !(1 << index);
        }
        Ok(())
    }

    fn read_relay_bitmap(&mut self) -> Result<u8, BusError> {
        if self.fail_reads {
            return Err(BusError::LockTimeout);
        }
        Ok(self.outputs)
    }

    fn read_coin_bitmap(&mut self) -> Result<u8, BusError> {
        self.read_button_bitmap()
    }
}

impl EdgePort for MockHardware {
    fn is_event_pending(&self) -> bool {
        self.interrupt
    }

    fn consume_event(&mut self) -> Result<InputEdges, BusError> {
        if self.fail_reads {
            return Err(BusError::LockTimeout);
        }
        self.interrupt = false;
        let fell = core::mem::take(&mut self.pending_fell);
        Ok(InputEdges { fell })
    }
}

impl IndicatorPort for MockHardware {
    fn set_loaded(&mut self, on: bool) {
        self.loaded_led = on;
    }

    fn set_running(&mut self, on: bool) {
        self.running_led = on;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Event sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<MachineAction> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Action(a) => Some(a.action),
                AppEvent::State(_) => None,
            })
            .collect()
    }

    /// Actions with their trigger, skipping `SETUP`.
    pub fn triggered(&self) -> Vec<(MachineAction, TriggerType)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Action(a) => a.session.as_ref().map(|s| (a.action, s.trigger_type)),
                AppEvent::State(_) => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<MachineState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::State(s) => Some(s.status),
                AppEvent::Action(_) => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Bay: controller + mocks + a test clock ────────────────────

/// Loop period used when stepping time forward.
pub const STEP_MS: u32 = 10;

pub struct Bay {
    pub controller: Controller,
    pub hw: MockHardware,
    pub sink: RecordingSink,
    pub now: Tick,
}

#[allow(dead_code)]
impl Bay {
    /// Controller booted at tick 0 and started.
    pub fn new() -> Self {
        Self::with_settings(MachineSettings::default())
    }

    pub fn with_settings(settings: MachineSettings) -> Self {
        Self::booted_at(settings, 0)
    }

    pub fn booted_at(settings: MachineSettings, boot: Tick) -> Self {
        let mut bay = Self {
            controller: Controller::new(settings, boot),
            hw: MockHardware::new(),
            sink: RecordingSink::new(),
            now: boot,
        };
        bay.controller.start(bay.now, &mut bay.hw, &mut bay.sink);
        bay
    }

    /// Advance the clock by `ms` and run one cycle.
    pub fn step(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(ms);
        self.controller.update(self.now, &mut self.hw, &mut self.sink);
    }

    /// Run cycles every `STEP_MS` for `ms` milliseconds.
    pub fn run_for(&mut self, ms: u32) {
        let mut left = ms;
        while left > 0 {
            let dt = left.min(STEP_MS);
            self.step(dt);
            left -= dt;
        }
    }

    /// Press and release input `bit` through the level path. Returns the
    /// tick the press was sampled at.
    pub fn tap(&mut self, bit: u8) -> Tick {
        self.hw.press(bit);
        self.step(STEP_MS);
        let pressed_at = self.now;
        self.hw.release(bit);
        self.step(STEP_MS);
        pressed_at
    }

    /// Press and release input `bit` with an interrupt edge.
    pub fn tap_with_interrupt(&mut self, bit: u8) -> Tick {
        self.hw.press_with_interrupt(bit);
        self.step(STEP_MS);
        let pressed_at = self.now;
        self.hw.release(bit);
        self.step(STEP_MS);
        pressed_at
    }

    /// Apply a backend session load at the current tick.
    pub fn load(&mut self, tokens: u32) {
        let msg = fullwash::app::commands::InboundMessage::LoadSession(
            fullwash::app::commands::SessionLoad {
                session_id: "sess-1".into(),
                user_id: "user-1".into(),
                user_name: "Ana".into(),
                tokens,
                timestamp: None,
            },
        );
        self.controller
            .handle_message(msg, self.now)
            .expect("load should be accepted");
    }
}
