//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to              |
//! |----------------|--------------------|--------------------------|
//! | `hardware`     | ProbeBus           | 1-Wire DS18B20 bus       |
//! |                | FanPort            | LEDC PWM, tach ISR       |
//! |                | AnalogPort         | ESP32 ADC1 (PSU divider) |
//! | `log_sink`     | EventSink          | Serial log output        |
//! | `nvs`          | ConfigPort         | NVS / in-memory store    |
//! |                | StoragePort        |                          |
//! | `mdns`         | ServiceBrowser     | ESP-IDF mDNS responder   |
//! | `ws_transport` | LinkTransport      | ESP-IDF WebSocket client |
//! | `time`         | (clock)            | ESP32 system timer       |
//! | `wifi`         | (connectivity)     | ESP-IDF WiFi STA         |
//! | `device_id`    | (hostname)         | eFuse factory MAC        |

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod mdns;
pub mod nvs;
pub mod time;
pub mod wifi;
pub mod ws_transport;
