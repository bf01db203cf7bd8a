//! Mock hardware and transport adapters for integration tests.
//!
//! Records every port call so tests can assert on the full interaction
//! history without real peripherals or a broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use envnode::app::events::{MessageId, TransportEvent};
use envnode::app::ports::{
    ClockPort, ConnectivityPort, OtaPort, PowerPort, QoS, TransportPort, WakeCause,
};
use envnode::error::{OtaError, TransportError};

// ── Clock ─────────────────────────────────────────────────────

/// Settable clock shared between the test and the code under test.
#[derive(Clone)]
pub struct MockClock(pub Arc<AtomicU64>);

#[allow(dead_code)]
impl MockClock {
    pub fn at(now_us: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now_us)))
    }

    pub fn advance_to(&self, now_us: u64) {
        self.0.store(now_us, Ordering::Relaxed);
    }
}

impl ClockPort for MockClock {
    fn now_us(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ── Power ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCall {
    RadioOff,
    ArmTimer(u64),
    DeepSleep,
    PowerDownAll,
}

pub struct MockPower {
    pub cause: WakeCause,
    pub calls: Arc<Mutex<Vec<PowerCall>>>,
}

#[allow(dead_code)]
impl MockPower {
    pub fn new(cause: WakeCause) -> Self {
        Self {
            cause,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl PowerPort for MockPower {
    fn wake_cause(&self) -> WakeCause {
        self.cause
    }
    fn radio_off(&mut self) {
        self.calls.lock().unwrap().push(PowerCall::RadioOff);
    }
    fn arm_timer_wakeup(&mut self, interval_us: u64) {
        self.calls
            .lock()
            .unwrap()
            .push(PowerCall::ArmTimer(interval_us));
    }
    fn enter_deep_sleep(&mut self) {
        self.calls.lock().unwrap().push(PowerCall::DeepSleep);
    }
    fn power_down_all(&mut self) {
        self.calls.lock().unwrap().push(PowerCall::PowerDownAll);
    }
}

// ── Connectivity ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockConnectivity {
    pub connects: usize,
    pub disconnects: usize,
    pub held: bool,
}

impl ConnectivityPort for MockConnectivity {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connects += 1;
        Ok(())
    }
    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
    fn hold_for_update(&mut self) {
        self.held = true;
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Replays a scripted event sequence and records every outbound call.
pub struct MockTransport {
    pub events: VecDeque<TransportEvent>,
    pub published: Vec<PublishRecord>,
    pub subscribed: Vec<String>,
    pub disconnects: usize,
    next_id: MessageId,
}

impl MockTransport {
    pub fn scripted(events: Vec<TransportEvent>) -> Self {
        Self {
            events: events.into(),
            published: Vec::new(),
            subscribed: Vec::new(),
            disconnects: 0,
            next_id: 1,
        }
    }
}

impl TransportPort for MockTransport {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscribed.push(topic.to_string());
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, TransportError> {
        self.published.push(PublishRecord {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    fn next_event(&mut self) -> TransportEvent {
        // Running off the script means the test forgot an event; fail
        // the session rather than hang.
        self.events
            .pop_front()
            .unwrap_or(TransportEvent::BrokerError)
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

// ── OTA ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockOta {
    pub urls: Vec<String>,
}

impl OtaPort for MockOta {
    fn begin_update(&mut self, url: &str) -> Result<(), OtaError> {
        self.urls.push(url.to_string());
        Ok(())
    }
}
