//! GPIO and I/O-expander pin assignments for the FullWash controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin or bit numbers.
//!
//! ```text
//!   ESP32 ──I2C──▶ TCA9535 @0x24
//!                   P00..P05  function buttons (active-low, BT6..BT1)
//!                   P06       coin acceptor signal (active-low)
//!                   P07       stop button (active-low)
//!                   P10..P15  function relays 1..6
//!                   P16       bay lighting relay
//! ```

// ---------------------------------------------------------------------------
// ESP32 GPIO
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 19;
pub const I2C_SCL_GPIO: i32 = 18;
/// Open-drain interrupt output of the expander, falling edge on any input change.
pub const EXPANDER_INT_GPIO: i32 = 23;

/// "Session loaded" indicator LED.
pub const LED_LOADED_GPIO: i32 = 16;
/// "Function running" indicator LED.
pub const LED_RUNNING_GPIO: i32 = 21;

pub const I2C_BAUDRATE_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// TCA9535 16-bit I/O expander
// ---------------------------------------------------------------------------

pub const TCA9535_ADDR: u8 = 0x24;

/// Register map (datasheet table 4).
pub mod reg {
    pub const INPUT_PORT0: u8 = 0x00;
    pub const INPUT_PORT1: u8 = 0x01;
    pub const OUTPUT_PORT0: u8 = 0x02;
    pub const OUTPUT_PORT1: u8 = 0x03;
    pub const POLARITY_PORT0: u8 = 0x04;
    pub const POLARITY_PORT1: u8 = 0x05;
    pub const CONFIG_PORT0: u8 = 0x06;
    pub const CONFIG_PORT1: u8 = 0x07;
}

// ---------------------------------------------------------------------------
// Port 0: inputs
// ---------------------------------------------------------------------------

pub const NUM_BUTTONS: usize = 6;

/// Port-0 bit for each function button, indexed by function (BT1 first).
pub const BUTTON_BITS: [u8; NUM_BUTTONS] = [5, 4, 3, 2, 1, 0];

pub const COIN_BIT: u8 = 6;
pub const STOP_BIT: u8 = 7;

// ---------------------------------------------------------------------------
// Port 1: relays
// ---------------------------------------------------------------------------

pub const NUM_RELAYS: usize = 7;

/// Relays driven by the function buttons; relay *i* belongs to button *i*.
pub const FUNCTION_RELAY_MASK: u8 = 0b0011_1111;

/// Bay lighting, switched on at boot and never touched by the controller.
pub const LIGHTING_RELAY: u8 = 6;

/// Wash function wired to each relay, for logs.
pub const RELAY_NAMES: [&str; NUM_RELAYS] = [
    "clear water",
    "foam",
    "vacuum",
    "hand wash",
    "inflator",
    "disinfect",
    "lighting",
];
