//! Level-polled button debouncer for the expander's input port.
//!
//! ## Hardware
//!
//! Active-low momentary switches with pull-ups on the TCA9535. The
//! expander raises its INT line on any input change; that edge path is
//! serviced first by the controller, which then calls
//! [`ButtonDebouncer::mark_pressed`] so the level path below does not
//! report the same press a second time.
//!
//! ## Acceptance rule (per channel)
//!
//! | Sample   | Condition                                        | Result        |
//! |----------|--------------------------------------------------|---------------|
//! | released | -                                                | record release|
//! | pressed  | < `debounce` since last event                    | chatter, drop |
//! | pressed  | channel was released                             | **event**     |
//! | pressed  | held, ≥ `debounce × 5` since last event          | **event**     |
//! | pressed  | held, otherwise                                  | nothing       |

use crate::clock::{Tick, elapsed_since};

/// Multiple of the debounce delay after which a held button repeats.
pub const HOLD_REPEAT_FACTOR: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ChannelState {
    pressed: bool,
    last_event: Option<Tick>,
}

/// Debounce state for `N` active-low channels.
#[derive(Debug, Clone)]
pub struct ButtonDebouncer<const N: usize> {
    channels: [ChannelState; N],
    debounce_ms: u32,
}

impl<const N: usize> ButtonDebouncer<N> {
    pub fn new(debounce_ms: u32) -> Self {
        Self {
            channels: [ChannelState::default(); N],
            debounce_ms,
        }
    }

    /// Feed one sample for `channel` (`pressed` already inverted from the
    /// active-low level). Returns `true` when the sample is a new press.
    pub fn sample(&mut self, channel: usize, pressed: bool, now: Tick) -> bool {
        let Some(ch) = self.channels.get_mut(channel) else {
            return false;
        };

        if !pressed {
            ch.pressed = false;
            return false;
        }

        let since_event = ch.last_event.map(|t| elapsed_since(now, t));
        let accept = match since_event {
            Some(dt) if dt < self.debounce_ms => false,
            Some(dt) => !ch.pressed || dt >= self.debounce_ms * HOLD_REPEAT_FACTOR,
            None => true,
        };

        ch.pressed = true;
        if accept {
            ch.last_event = Some(now);
        }
        accept
    }

    /// Record a press that was already handled via the edge path.
    pub fn mark_pressed(&mut self, channel: usize, now: Tick) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.pressed = true;
            ch.last_event = Some(now);
        }
    }

    /// True if the level path currently considers `channel` held.
    pub fn is_held(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(|c| c.pressed)
    }
}
