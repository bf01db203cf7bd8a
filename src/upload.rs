//! Upload session: publish the datalog backlog and expire what the
//! broker acknowledges.
//!
//! One session per wake cycle, written as straight-line code over a
//! blocking [`TransportPort::next_event`]:
//!
//! 1. wait for the broker connection
//! 2. subscribe to the OTA command topic
//! 3. publish an empty QoS 1 probe to that topic — it guarantees at
//!    least one message flows back on the subscription, so step 6
//!    always terminates
//! 4. drain the datalog, publishing each group as retained QoS 1 JSON
//! 5. consume publish acks: the probe's first, then one datalog expiry
//!    per data ack — a group leaves retained memory only once the
//!    broker has taken responsibility for it
//! 6. wait for the OTA-topic message: empty means no command pending; a
//!    URL means clear the retained command and start the update
//! 7. disconnect
//!
//! Any disconnect or broker error aborts the session with unexpired
//! groups still in the ring; they are retried next cycle (duplicates on
//! the data topic are possible, by design of at-least-once delivery).

use log::{info, warn};

use crate::app::events::TransportEvent;
use crate::app::ports::{ConnectivityPort, OtaPort, QoS, TransportPort};
use crate::config::TOPIC_MAX;
use crate::datalog::{Datalog, FormatOutcome};
use crate::error::TransportError;
use crate::sleep::SleepScheduler;

/// Formatting buffer for one group's JSON.
const FORMAT_BUF: usize = 256;

/// How a session ended, short of a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Backlog published and acknowledged; no update pending.
    Complete { published: usize },
    /// A firmware download is running; the caller must keep the node
    /// awake and let the update reboot it.
    OtaInProgress,
}

/// Control-flow events surfaced by the wait loop; inbound messages are
/// stashed aside instead of being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Connected,
    Subscribed,
    Published,
}

pub struct UploadSession<'a, T: TransportPort> {
    transport: &'a mut T,
    data_topic: heapless::String<TOPIC_MAX>,
    ota_topic: heapless::String<TOPIC_MAX>,
    /// Retained OTA command (or the empty probe echo), once seen.
    ota_response: Option<heapless::Vec<u8, 256>>,
}

impl<'a, T: TransportPort> UploadSession<'a, T> {
    pub fn new(
        transport: &'a mut T,
        data_topic: heapless::String<TOPIC_MAX>,
        ota_topic: heapless::String<TOPIC_MAX>,
    ) -> Self {
        Self {
            transport,
            data_topic,
            ota_topic,
            ota_response: None,
        }
    }

    /// Run the whole session.  On `Err` the transport is left as-is and
    /// unacknowledged groups stay in the log; the caller's recovery is a
    /// forced-sleep request.
    pub fn run(
        &mut self,
        log: &mut Datalog<'_>,
        sched: &SleepScheduler,
        conn: &mut dyn ConnectivityPort,
        ota: &mut dyn OtaPort,
    ) -> core::result::Result<UploadOutcome, TransportError> {
        self.wait_for(Control::Connected)?;

        let ota_topic = self.ota_topic.clone();
        self.transport.subscribe(&ota_topic)?;
        self.wait_for(Control::Subscribed)?;

        // Probe: not retained, so it never overwrites a real command.
        self.transport
            .publish(&ota_topic, b"", QoS::AtLeastOnce, false)?;

        // Drain the backlog.  Groups that cannot fit the format buffer
        // can never be delivered; they are counted for expiry so the
        // ack accounting stays aligned with what was actually sent.
        let mut cursor = log.cursor();
        let mut buf = [0u8; FORMAT_BUF];
        let mut published = 0usize;
        let mut undeliverable = 0usize;
        loop {
            match log.format_next(&mut cursor, &mut buf) {
                FormatOutcome::Group(n) => {
                    info!(
                        "data publish {published} '{}'",
                        core::str::from_utf8(&buf[..n]).unwrap_or("<invalid utf8>")
                    );
                    self.transport
                        .publish(&self.data_topic, &buf[..n], QoS::AtLeastOnce, true)?;
                    published += 1;
                }
                FormatOutcome::BufferTooSmall => {
                    warn!("dropping oversized log group");
                    undeliverable += 1;
                }
                FormatOutcome::Exhausted => break,
            }
        }

        // Probe ack first (the probe was published before any data).
        self.wait_for(Control::Published)?;
        for _ in 0..published {
            self.wait_for(Control::Published)?;
            log.expire_oldest();
        }
        for _ in 0..undeliverable {
            log.expire_oldest();
        }

        // The subscription delivers either a retained command or our
        // probe echo; the stash holds it if it raced the publish acks,
        // otherwise consume events until it shows up.
        let response = loop {
            if let Some(r) = self.ota_response.take() {
                break r;
            }
            match self.transport.next_event() {
                TransportEvent::Message { topic, payload } => {
                    if topic.as_str() == self.ota_topic.as_str() {
                        break payload;
                    }
                }
                TransportEvent::Disconnected => return Err(TransportError::Disconnected),
                TransportEvent::BrokerError => return Err(TransportError::Broker),
                other => warn!("ignoring transport event {other:?} while awaiting command"),
            }
        };

        if !response.is_empty() {
            return self.start_update(&response, published, sched, conn, ota);
        }

        self.transport.disconnect();
        Ok(UploadOutcome::Complete { published })
    }

    /// A non-empty retained message on the command topic is an update
    /// request carrying the image URL.
    fn start_update(
        &mut self,
        response: &[u8],
        published: usize,
        sched: &SleepScheduler,
        conn: &mut dyn ConnectivityPort,
        ota: &mut dyn OtaPort,
    ) -> core::result::Result<UploadOutcome, TransportError> {
        info!("got firmware update request, {} bytes", response.len());
        sched.note_ota_start();
        conn.hold_for_update();

        // Clear the retained command so the next wake doesn't re-run it.
        let ota_topic = self.ota_topic.clone();
        self.transport
            .publish(&ota_topic, b"", QoS::AtMostOnce, true)?;

        let outcome = match core::str::from_utf8(response) {
            Ok(url) => match ota.begin_update(url.trim()) {
                Ok(()) => UploadOutcome::OtaInProgress,
                Err(e) => {
                    warn!("firmware update rejected: {e}");
                    UploadOutcome::Complete { published }
                }
            },
            Err(_) => {
                warn!("firmware update command is not valid utf-8");
                UploadOutcome::Complete { published }
            }
        };
        self.transport.disconnect();
        Ok(outcome)
    }

    /// Block until the wanted control event arrives.  Inbound messages
    /// on the command topic are stashed; other control events are
    /// ignored with a warning (the broker may interleave them).
    fn wait_for(&mut self, wanted: Control) -> core::result::Result<Control, TransportError> {
        loop {
            match self.transport.next_event() {
                TransportEvent::Connected if wanted == Control::Connected => {
                    return Ok(Control::Connected);
                }
                TransportEvent::Subscribed if wanted == Control::Subscribed => {
                    return Ok(Control::Subscribed);
                }
                TransportEvent::Published(_) if wanted == Control::Published => {
                    return Ok(Control::Published);
                }
                TransportEvent::Message { topic, payload } => {
                    if topic.as_str() == self.ota_topic.as_str() && self.ota_response.is_none() {
                        self.ota_response = Some(payload);
                    }
                }
                TransportEvent::Disconnected => return Err(TransportError::Disconnected),
                TransportEvent::BrokerError => return Err(TransportError::Broker),
                other => warn!("ignoring out-of-order transport event {other:?}"),
            }
        }
    }
}
