//! Hardware adapter: bridges the I/O expander and status LEDs to the
//! domain port traits.
//!
//! Owns a handle on the shared, lock-guarded [`Tca9535`] and the two LED
//! pins, exposing them through [`IoPort`], [`EdgePort`] and
//! [`IndicatorPort`]. Every expander access goes through
//! [`BusLock::with`], so a contended bus surfaces as
//! [`BusError::LockTimeout`] instead of blocking the control loop.
//!
//! Edge detection diffs the input port against the snapshot taken at the
//! previous interrupt; level reads never move that snapshot.
//!
//! The ISR only raises a flag; the port is read when the control loop
//! services it. A press that is made and released inside that gap (at
//! most one `control_loop_interval_ms` plus bus contention) leaves no
//! falling edge and is also invisible to level polling.

use std::sync::Arc;

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use log::warn;

use crate::app::ports::{EdgePort, IndicatorPort, InputEdges, IoPort};
use crate::drivers::bus_lock::BusLock;
use crate::drivers::edge_flags::EdgeFlags;
use crate::drivers::tca9535::Tca9535;
use crate::error::BusError;

/// Shared expander handle.
pub type SharedExpander<I2C> = Arc<BusLock<Tca9535<I2C>>>;

pub struct HardwareAdapter<I2C, LED> {
    expander: SharedExpander<I2C>,
    edges: Arc<EdgeFlags>,
    loaded_led: LED,
    running_led: LED,
    /// Input port as of the last serviced interrupt; all released at boot.
    edge_snapshot: u8,
}

impl<I2C: I2c, LED: OutputPin> HardwareAdapter<I2C, LED> {
    pub fn new(
        expander: SharedExpander<I2C>,
        edges: Arc<EdgeFlags>,
        loaded_led: LED,
        running_led: LED,
    ) -> Self {
        Self {
            expander,
            edges,
            loaded_led,
            running_led,
            edge_snapshot: 0xFF,
        }
    }

    fn read_inputs(&self) -> Result<u8, BusError> {
        self.expander.with(|x| x.read_inputs())
    }
}

// ── IoPort implementation ─────────────────────────────────────

impl<I2C: I2c, LED: OutputPin> IoPort for HardwareAdapter<I2C, LED> {
    fn read_button_bitmap(&mut self) -> Result<u8, BusError> {
        self.read_inputs()
    }

    fn set_relay(&mut self, index: u8, on: bool) -> Result<(), BusError> {
        self.expander.with(|x| x.set_output_bit(index, on))
    }

    fn read_relay_bitmap(&mut self) -> Result<u8, BusError> {
        self.expander.with(|x| x.read_outputs())
    }

    fn read_coin_bitmap(&mut self) -> Result<u8, BusError> {
        self.read_inputs()
    }
}

// ── EdgePort implementation ───────────────────────────────────

impl<I2C: I2c, LED: OutputPin> EdgePort for HardwareAdapter<I2C, LED> {
    fn is_event_pending(&self) -> bool {
        self.edges.is_pending()
    }

    /// Inputs that fell since the previous serviced interrupt, as seen by
    /// a port read made now. Reading also clears the expander's INT line.
    fn consume_event(&mut self) -> Result<InputEdges, BusError> {
        if !self.edges.take() {
            return Ok(InputEdges::default());
        }
        match self.read_inputs() {
            Ok(now) => {
                let fell = self.edge_snapshot & !now;
                self.edge_snapshot = now;
                Ok(InputEdges { fell })
            }
            Err(e) => {
                self.edges.raise();
                Err(e)
            }
        }
    }
}

// ── IndicatorPort implementation ──────────────────────────────

impl<I2C: I2c, LED: OutputPin> IndicatorPort for HardwareAdapter<I2C, LED> {
    fn set_loaded(&mut self, on: bool) {
        if let Err(e) = drive(&mut self.loaded_led, on) {
            warn!("loaded LED: {:?}", e);
        }
    }

    fn set_running(&mut self, on: bool) {
        if let Err(e) = drive(&mut self.running_led, on) {
            warn!("running LED: {:?}", e);
        }
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) -> Result<(), P::Error> {
    if on { pin.set_high() } else { pin.set_low() }
}
