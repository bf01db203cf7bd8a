//! Inbound transport events.
//!
//! The MQTT adapter's callback translates raw client events into these
//! and pushes them onto a bounded channel; the upload session consumes
//! them one at a time with a blocking receive.  Every broker interaction
//! the protocol depends on is visible here — there are no side effects
//! hiding in callbacks.

use crate::config::TOPIC_MAX;

/// Broker message id for a QoS>0 publish, echoed back in the ack.
pub type MessageId = i32;

/// Events the transport delivers to the upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker session established.
    Connected,

    /// A subscribe request was confirmed.
    Subscribed,

    /// A QoS>0 publish was acknowledged by the broker.
    Published(MessageId),

    /// An inbound message on a subscribed topic.
    Message {
        topic: heapless::String<TOPIC_MAX>,
        payload: heapless::Vec<u8, 256>,
    },

    /// The broker dropped the connection.
    Disconnected,

    /// The client reported a protocol or transport error.
    BrokerError,
}
