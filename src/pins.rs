//! GPIO / peripheral assignments for the envnode board.
//!
//! Single source of truth — every adapter references this module rather
//! than hard-coding pin numbers.  Change a pin here and it propagates
//! everywhere.

// ---------------------------------------------------------------------------
// Battery voltage sense (resistive divider, 1:1 → ×2.2 with ADC atten)
// ---------------------------------------------------------------------------

/// ADC1 channel 3 (GPIO 4 on ESP32-S3) — battery divider midpoint.
pub const BATTERY_ADC_GPIO: i32 = 4;
/// ADC attenuation for the battery channel (6 dB → 0 – 1.75 V range,
/// matching the 2.2x divider full scale).
pub const BATTERY_ADC_ATTEN: u32 = 2; // ADC_ATTEN_DB_6

// ---------------------------------------------------------------------------
// I²C bus (BME280 environmental sensor)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 14;
pub const I2C_SCL_GPIO: i32 = 15;
/// 100 kHz keeps the bus reliable on long sensor leads.
pub const I2C_FREQ_HZ: u32 = 100_000;

/// BME280 I²C address (SDO tied low).
pub const BME280_ADDR: u8 = 0x76;
