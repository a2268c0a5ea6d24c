//! FullWash Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single cooperative control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter        LogEventSink   NvsSettingsStore        │
//! │  (Io+Edge+Indicator)    (EventSink)    (SettingsPort)          │
//! │  QueuedPublisher ──▶ EventQueue ──▶ publisher thread ──▶ MQTT  │
//! │  MQTT callback ──▶ InboundQueue ──┐                            │
//! │                                   │                            │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                   ▼                            │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Controller (pure logic)                   │    │
//! │  │  debounce · session FSM · relay reconciliation         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, InterruptType, PinDriver, Pull};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use fullwash::adapters::hardware::HardwareAdapter;
use fullwash::adapters::log_sink::LogEventSink;
use fullwash::adapters::mqtt::{EspMqttTransport, InboundQueue, Topics};
use fullwash::adapters::nvs::NvsSettingsStore;
use fullwash::adapters::publisher::{self, EventQueue, QueuedPublisher};
use fullwash::adapters::time::MonotonicClock;
use fullwash::app::service::Controller;
use fullwash::drivers::bus_lock::BusLock;
use fullwash::drivers::edge_flags::EdgeFlags;
use fullwash::drivers::tca9535::Tca9535;
use fullwash::pins;

// ── Build-time network settings ───────────────────────────────

const WIFI_SSID: &str = env_or(option_env!("FULLWASH_WIFI_SSID"), "fullwash");
const WIFI_PASS: &str = env_or(option_env!("FULLWASH_WIFI_PASS"), "");
const MQTT_URL: &str = env_or(option_env!("FULLWASH_MQTT_URL"), "mqtt://192.168.1.10:1883");

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

const PUBLISHER_STACK_SIZE: usize = 8 * 1024;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FullWash v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let clock = MonotonicClock::new();

    // ── 2. Settings from NVS (or defaults) ────────────────────
    let settings = match NvsSettingsStore::new(nvs_partition.clone()) {
        Ok(store) => store.load_or_default(),
        Err(e) => {
            warn!("NVS unavailable ({e}), running with default settings");
            fullwash::config::MachineSettings::default()
        }
    };
    info!("Machine id {}", settings.machine_id);

    // ── 3. I/O expander on the shared bus ─────────────────────
    // SAFETY: pin numbers come from `pins` and are claimed exactly once.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
        )
    };
    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_BAUDRATE_HZ));
    let i2c = I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config)?;
    let mut expander = Tca9535::new(i2c, pins::TCA9535_ADDR);
    expander
        .init()
        .map_err(|e| anyhow!("TCA9535 init failed: {e}"))?;
    let expander = Arc::new(BusLock::new(expander, settings.bus_lock_timeout_ms));

    // ── 4. Expander INT line → edge flag ──────────────────────
    let edges = Arc::new(EdgeFlags::new());
    // SAFETY: see above.
    let mut int_pin = PinDriver::input(unsafe { AnyIOPin::new(pins::EXPANDER_INT_GPIO) })?;
    int_pin.set_pull(Pull::Up)?;
    int_pin.set_interrupt_type(InterruptType::NegEdge)?;
    let isr_edges = edges.clone();
    // SAFETY: the callback only stores an atomic flag.
    unsafe { int_pin.subscribe(move || isr_edges.raise())? };
    int_pin.enable_interrupt()?;

    // ── 5. Indicator LEDs ─────────────────────────────────────
    // SAFETY: see above.
    let (loaded_led, running_led) = unsafe {
        (
            PinDriver::output(AnyOutputPin::new(pins::LED_LOADED_GPIO))?,
            PinDriver::output(AnyOutputPin::new(pins::LED_RUNNING_GPIO))?,
        )
    };
    let mut hw = HardwareAdapter::new(expander, edges, loaded_led, running_led);

    // ── 6. Network: WiFi, MQTT, publisher thread ──────────────
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?,
        sysloop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID.try_into().map_err(|_| anyhow!("SSID too long"))?,
        password: WIFI_PASS.try_into().map_err(|_| anyhow!("password too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;
    if let Err(e) = wifi.connect().and_then(|()| wifi.wait_netif_up()) {
        // The controller runs offline; events are dropped until the link is up.
        warn!("WiFi connect failed ({e}), continuing offline");
    }

    let topics = Topics::new(&settings.machine_id);
    let inbound = Arc::new(InboundQueue::new());
    let outbound = Arc::new(EventQueue::new());
    let mut transport = EspMqttTransport::connect(
        MQTT_URL,
        &settings.machine_id,
        topics.clone(),
        inbound.clone(),
    )?;

    let drain_queue = outbound.clone();
    std::thread::Builder::new()
        .name("publisher".into())
        .stack_size(PUBLISHER_STACK_SIZE)
        .spawn(move || {
            futures_lite::future::block_on(publisher::run(&drain_queue, &mut transport));
        })?;

    let mut sink = (QueuedPublisher::new(outbound, topics), LogEventSink::new());

    // ── 7. Controller ─────────────────────────────────────────
    let loop_interval = Duration::from_millis(u64::from(settings.control_loop_interval_ms));
    let mut controller = Controller::new(settings, clock.now_ms());
    controller.start(clock.now_ms(), &mut hw, &mut sink);

    info!("Entering control loop");
    loop {
        let now = clock.now_ms();

        while let Some(msg) = inbound.try_pop() {
            if let Err(e) = controller.handle_message(msg, now) {
                warn!("inbound message rejected: {e}");
            }
        }

        controller.update(now, &mut hw, &mut sink);

        // The driver disables the interrupt after each notification.
        if let Err(e) = int_pin.enable_interrupt() {
            warn!("INT re-arm failed: {e}");
        }

        std::thread::sleep(loop_interval);
    }
}
