//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ sleep scheduler / upload session (domain)
//! ```
//!
//! Driven adapters (clock, power management, broker transport, OTA)
//! implement these traits.  The domain consumes them via generics or
//! trait objects, so the sleep and upload logic never touches ESP-IDF
//! directly and runs unchanged under test mocks.

use crate::app::events::{MessageId, TransportEvent};
use crate::error::{OtaError, TransportError};

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic-across-deep-sleep time source.
///
/// Implementations must keep counting through deep sleep (the RTC domain
/// does on real hardware), because retained timestamps from previous
/// cycles are compared against it.
pub trait ClockPort {
    /// Microseconds since cold boot.
    fn now_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Power port
// ───────────────────────────────────────────────────────────────

/// Why the chip is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// First power application or reset — retained memory is garbage.
    PowerOn,
    /// The deep-sleep timer alarm fired — retained memory is valid.
    Timer,
    /// Some other wake source (external pin, watchdog).
    Other,
}

/// Deep-sleep and power-domain control.
pub trait PowerPort {
    /// What woke the chip this cycle.
    fn wake_cause(&self) -> WakeCause;

    /// Stop the radio before sleeping.
    fn radio_off(&mut self);

    /// Arm the timer wake alarm for `interval_us` from now.
    fn arm_timer_wakeup(&mut self, interval_us: u64);

    /// Enter deep sleep.  On real hardware this does not return; mocks
    /// record the call and do.
    fn enter_deep_sleep(&mut self);

    /// Force every power domain off, for the terminal battery-critical
    /// shutdown.  A subsequent [`PowerPort::enter_deep_sleep`] with no
    /// armed alarm never resumes.
    fn power_down_all(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Connectivity port
// ───────────────────────────────────────────────────────────────

/// Station-mode network link for the duration of one upload.
pub trait ConnectivityPort {
    /// Associate and acquire an address.  Blocks until usable or failed.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the link down at the end of the cycle.
    fn disconnect(&mut self);

    /// Latch the link up: a disconnect after this must not trigger the
    /// usual sleep-on-disconnect reaction (set once an OTA download is
    /// in flight).
    fn hold_for_update(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Transport port
// ───────────────────────────────────────────────────────────────

/// Publish quality of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget; no ack event follows.
    AtMostOnce,
    /// Broker acks with [`TransportEvent::Published`].
    AtLeastOnce,
}

/// Pub/sub broker session.
///
/// Implementations convert their client's callbacks into
/// [`TransportEvent`]s delivered through [`TransportPort::next_event`];
/// the session logic is written as ordinary sequential code on top.
pub trait TransportPort {
    /// Subscribe at QoS 1.  Confirmation arrives as
    /// [`TransportEvent::Subscribed`].
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publish.  For [`QoS::AtLeastOnce`] the returned id is echoed in
    /// the matching [`TransportEvent::Published`] ack.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, TransportError>;

    /// Block until the next transport event.
    fn next_event(&mut self) -> TransportEvent;

    /// Flush and close the broker session.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// OTA port
// ───────────────────────────────────────────────────────────────

/// Firmware update starter.
pub trait OtaPort {
    /// Validate `url` and start downloading the new image into the
    /// inactive slot in a background task.  Returns once the download
    /// is underway; completion reboots the node.
    fn begin_update(&mut self, url: &str) -> Result<(), OtaError>;
}
