//! MQTT transport adapter.
//!
//! The esp-mqtt client reports everything through a callback running on
//! its own task.  The callback does exactly one thing here: translate
//! the raw event into a [`TransportEvent`] and push it onto a bounded
//! channel.  The wake-cycle task consumes the channel with a blocking
//! receive, so the upload protocol reads as sequential code and every
//! broker interaction is observable in one place.
//!
//! ```text
//!  esp-mqtt task ──callback──▶ EventBridge ──block_on(receive)──▶ session
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::TransportEvent;

/// Channel depth: a session has at most a handful of events in flight
/// (acks for the backlog drain are the worst case).
const EVENT_DEPTH: usize = 16;

static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, TransportEvent, EVENT_DEPTH> =
    Channel::new();

/// Callback-to-task handoff for transport events.
pub struct EventBridge;

impl EventBridge {
    /// Push from the client callback.  Never blocks there; a full
    /// channel drops the event with a warning (the session will then
    /// fail its wait and force sleep, which is the safe direction).
    pub fn push(event: TransportEvent) {
        if EVENT_CHANNEL.try_send(event).is_err() {
            warn!("transport event channel full, dropping event");
        }
    }

    /// Blocking receive on the wake-cycle task.
    pub fn recv_blocking() -> TransportEvent {
        futures_lite::future::block_on(EVENT_CHANNEL.receive())
    }

    /// Drop anything queued from a previous session.
    pub fn drain() {
        while EVENT_CHANNEL.try_receive().is_ok() {}
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::mqtt::client::{
        EspMqttClient, EventPayload, MqttClientConfiguration, QoS as EspQoS,
    };
    use log::{info, warn};

    use super::EventBridge;
    use crate::app::events::{MessageId, TransportEvent};
    use crate::app::ports::{QoS, TransportPort};
    use crate::error::TransportError;

    /// One broker session per wake cycle; auto-reconnect stays off so a
    /// dropped connection surfaces as an event instead of a retry loop.
    pub struct MqttAdapter {
        client: EspMqttClient<'static>,
    }

    impl MqttAdapter {
        pub fn connect(broker_url: &str) -> Result<Self, TransportError> {
            EventBridge::drain();
            let conf = MqttClientConfiguration {
                disable_clean_session: false,
                reconnect_timeout: None,
                ..Default::default()
            };
            let client = EspMqttClient::new_cb(broker_url, &conf, |event| {
                if let Some(mapped) = map_event(event.payload()) {
                    EventBridge::push(mapped);
                }
            })
            .map_err(|e| {
                warn!("mqtt client init failed: {e}");
                TransportError::ConnectFailed
            })?;
            Ok(Self { client })
        }
    }

    fn map_event(payload: EventPayload<'_, esp_idf_svc::sys::EspError>) -> Option<TransportEvent> {
        match payload {
            EventPayload::Connected(_) => Some(TransportEvent::Connected),
            EventPayload::Subscribed(_) => Some(TransportEvent::Subscribed),
            EventPayload::Published(id) => Some(TransportEvent::Published(id as MessageId)),
            EventPayload::Received { topic, data, .. } => {
                let mut t = heapless::String::new();
                let mut p = heapless::Vec::new();
                if t.push_str(topic.unwrap_or("")).is_err()
                    || p.extend_from_slice(data).is_err()
                {
                    warn!("inbound message exceeds buffers, dropping");
                    return None;
                }
                Some(TransportEvent::Message { topic: t, payload: p })
            }
            EventPayload::Disconnected => Some(TransportEvent::Disconnected),
            EventPayload::Error(e) => {
                warn!("mqtt error event: {e:?}");
                Some(TransportEvent::BrokerError)
            }
            other => {
                info!("unmapped mqtt event: {other:?}");
                None
            }
        }
    }

    impl TransportPort for MqttAdapter {
        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            self.client
                .subscribe(topic, EspQoS::AtLeastOnce)
                .map(|_| ())
                .map_err(|e| {
                    warn!("subscribe failed: {e}");
                    TransportError::SubscribeFailed
                })
        }

        fn publish(
            &mut self,
            topic: &str,
            payload: &[u8],
            qos: QoS,
            retain: bool,
        ) -> Result<MessageId, TransportError> {
            let qos = match qos {
                QoS::AtMostOnce => EspQoS::AtMostOnce,
                QoS::AtLeastOnce => EspQoS::AtLeastOnce,
            };
            self.client
                .enqueue(topic, qos, retain, payload)
                .map(|id| id as MessageId)
                .map_err(|e| {
                    warn!("publish failed: {e}");
                    TransportError::PublishFailed
                })
        }

        fn next_event(&mut self) -> TransportEvent {
            EventBridge::recv_blocking()
        }

        fn disconnect(&mut self) {
            // The client flushes and closes when dropped at the end of
            // the wake cycle; nothing further to do here.
            info!("mqtt session closing");
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::MqttAdapter;

#[cfg(test)]
mod tests {
    use super::*;

    // EventBridge is a process-wide singleton; exercise push, order,
    // overflow and drain in one sequential test.
    #[test]
    fn bridge_delivers_in_order_and_drops_on_overflow() {
        EventBridge::drain();
        EventBridge::push(TransportEvent::Connected);
        EventBridge::push(TransportEvent::Subscribed);
        EventBridge::push(TransportEvent::Published(7));
        assert_eq!(EventBridge::recv_blocking(), TransportEvent::Connected);
        assert_eq!(EventBridge::recv_blocking(), TransportEvent::Subscribed);
        assert_eq!(EventBridge::recv_blocking(), TransportEvent::Published(7));

        for i in 0..EVENT_DEPTH as i32 {
            EventBridge::push(TransportEvent::Published(i));
        }
        // One past capacity is dropped, not queued out of order.
        EventBridge::push(TransportEvent::BrokerError);
        for i in 0..EVENT_DEPTH as i32 {
            assert_eq!(EventBridge::recv_blocking(), TransportEvent::Published(i));
        }
        EventBridge::drain();
    }
}
