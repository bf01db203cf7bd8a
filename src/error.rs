//! Unified error types for the envnode firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! wake-cycle error handling uniform. All variants are `Copy` so they can
//! be cheaply threaded through the upload session and sleep scheduler
//! without allocation.
//!
//! Propagation policy: sensor failures are absorbed at the point of
//! failure (the cycle continues with whatever readings it got); transport
//! failures abort the upload and bubble up, where the only recovery is a
//! forced-sleep request.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned out-of-range data.
    Sensor(SensorError),
    /// The pub/sub transport or the underlying network failed.
    Transport(TransportError),
    /// A firmware update could not be started or applied.
    Ota(OtaError),
    /// Peripheral or platform initialisation failed.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC read returned an error or timed out.
    AdcReadFailed,
    /// I2C transaction failed (NACK, bus error, timeout).
    I2cFailed,
    /// Device did not identify itself or never left reset.
    NotResponding,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::I2cFailed => write!(f, "I2C transaction failed"),
            Self::NotResponding => write!(f, "device not responding"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Transport failures abort the current wake cycle; unacknowledged log
/// groups stay in the ring for retry on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Wi-Fi association or IP acquisition failed.
    WifiFailed,
    /// The broker connection could not be established.
    ConnectFailed,
    /// The broker dropped the connection mid-session.
    Disconnected,
    /// Subscribe request was rejected or never confirmed.
    SubscribeFailed,
    /// Publish was rejected by the client.
    PublishFailed,
    /// The broker reported a protocol-level error.
    Broker,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiFailed => write!(f, "WiFi connect failed"),
            Self::ConnectFailed => write!(f, "broker connect failed"),
            Self::Disconnected => write!(f, "broker disconnected"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::Broker => write!(f, "broker error"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// The commanded URL is empty, oversized or not http(s).
    InvalidUrl,
    /// The update task could not be spawned.
    StartFailed,
    /// Download or slot write failed partway through.
    UpdateFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl => write!(f, "invalid OTA URL"),
            Self::StartFailed => write!(f, "OTA start failed"),
            Self::UpdateFailed => write!(f, "OTA update failed"),
        }
    }
}

impl std::error::Error for OtaError {}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
