//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                          | Connects to                  |
//! |-------------|-------------------------------------|------------------------------|
//! | `hardware`  | IoPort, EdgePort, IndicatorPort     | TCA9535 expander, status LEDs|
//! | `log_sink`  | EventSink                           | Serial log output            |
//! | `mqtt`      | MessageTransport                    | ESP-IDF MQTT client          |
//! | `nvs`       | SettingsPort                        | NVS / in-memory store        |
//! | `publisher` | EventSink                           | Bounded outbound queue       |
//! | `time`      | -                                   | ESP32 system timer           |

pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod publisher;
pub mod time;
