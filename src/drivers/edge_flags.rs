//! Interrupt-to-loop handoff for the expander's INT line.
//!
//! ```text
//! ┌─────────────┐  raise()   ┌────────────┐  take()   ┌──────────────┐
//! │ GPIO23 ISR  │──────────▶│ AtomicBool │─────────▶│ control loop │
//! └─────────────┘            └────────────┘           └──────────────┘
//! ```
//!
//! The ISR only flips a flag; the I²C read that tells *which* input
//! changed happens later on the control loop, outside interrupt context.
//! No callbacks are registered into the controller.

use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct EdgeFlags {
    pending: AtomicBool,
}

impl EdgeFlags {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// ISR-safe: mark that the expander reported an input change.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear and return the flag.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
