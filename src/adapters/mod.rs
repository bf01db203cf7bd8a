//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter | Implements         | Connects to                     |
//! |---------|--------------------|---------------------------------|
//! | `time`  | ClockPort          | RTC wall clock (sleep-proof)    |
//! | `power` | PowerPort          | ESP-IDF deep-sleep API          |
//! | `wifi`  | ConnectivityPort   | ESP-IDF WiFi STA                |
//! | `mqtt`  | TransportPort      | esp-mqtt client + event bridge  |
//! | `ota`   | OtaPort            | HTTPS fetch into inactive slot  |
//!
//! Each module carries a host-side simulation behind
//! `#[cfg(not(target_os = "espidf"))]` so the domain logic tests off
//! the device.

pub mod mqtt;
pub mod ota;
pub mod power;
pub mod time;
pub mod wifi;
