//! Port traits: the hexagonal boundary between the controller and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (I/O expander, LEDs, event sinks, settings storage,
//! message transport) implement these traits. The
//! [`Controller`](super::service::Controller) consumes them via generics,
//! so the domain core never touches a bus directly and can be driven by
//! mocks on the host.
//!
//! Every bus-facing method returns a typed [`BusError`]; the controller
//! treats any failure as transient and retries on the next cycle.

use crate::config::MachineSettings;
use crate::error::{BusError, PublishError};

// ───────────────────────────────────────────────────────────────
// I/O port (expander inputs and relay outputs)
// ───────────────────────────────────────────────────────────────

/// Access to the expander's input and output ports.
///
/// Input bitmaps are the raw port-0 value: inputs are pulled up, so a
/// pressed button or a coin pulse reads as a **0** bit.
pub trait IoPort {
    /// Read the input port carrying the function and stop buttons.
    fn read_button_bitmap(&mut self) -> Result<u8, BusError>;

    /// Drive relay `index` (0..[`NUM_RELAYS`](crate::pins::NUM_RELAYS)).
    fn set_relay(&mut self, index: u8, on: bool) -> Result<(), BusError>;

    /// Read back the output port as the expander currently drives it.
    fn read_relay_bitmap(&mut self) -> Result<u8, BusError>;

    /// Read the input port carrying the coin acceptor line.
    fn read_coin_bitmap(&mut self) -> Result<u8, BusError>;
}

/// Inputs that went low since the previous edge read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputEdges {
    /// Bit *n* set = input *n* fell (was released, now active).
    pub fell: u8,
}

impl InputEdges {
    pub const fn fell_on(self, bit: u8) -> bool {
        self.fell & (1 << bit) != 0
    }
}

/// Edge notifications from the expander's interrupt line.
pub trait EdgePort {
    /// Whether the interrupt fired since the last [`consume_event`](Self::consume_event).
    fn is_event_pending(&self) -> bool;

    /// Clear the pending flag and report which inputs fell.
    ///
    /// On failure the flag stays raised so the edge is not lost.
    fn consume_event(&mut self) -> Result<InputEdges, BusError>;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (status LEDs on direct GPIO)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    fn set_loaded(&mut self, on: bool);
    fn set_running(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / publishing)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, the
/// outbound publish queue, or both).
///
/// Emission must never block the control loop.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

/// Fan an event out to two sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Settings port (domain ↔ persistent settings)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`MachineSettings`].
///
/// Implementations MUST validate before persisting and reject invalid
/// ranges with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait SettingsPort {
    /// Load settings, or [`MachineSettings::default()`] if none are stored.
    fn load(&self) -> Result<MachineSettings, ConfigError>;

    /// Validate and persist settings.
    fn save(&self, settings: &MachineSettings) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Message transport (outbound publish)
// ───────────────────────────────────────────────────────────────

/// Delivery guarantee requested for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// Publish-side of the broker connection.
pub trait MessageTransport {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos) -> Result<(), PublishError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`SettingsPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing stored yet (first boot).
    NotFound,
    /// Stored blob failed to deserialize.
    Corrupted,
    /// A field failed range validation; the text names it.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
