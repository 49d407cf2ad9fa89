//! Transport-agnostic envelopes + delivery service interface.
//!
//! The engine never talks to a concrete transport; it consumes this trait
//! and leaves connect/reconnect, encryption, and grant mechanics to the
//! implementation.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::chat::ChatDescriptor;
use crate::ds::DeliveryServiceError;
use crate::event;
use crate::state::State;

/// A transport-agnostic packet that should be sent to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPacket {
    pub event: String,
    pub payload: Value,
    pub channel: String,
    /// Engine instance identifier, carried so other sessions of the same
    /// identity can tell relayed packets apart from their own echoes.
    pub instance: String,
}

impl OutboundPacket {
    pub fn new(event: &str, payload: Value, channel: &str, instance: &str) -> Self {
        Self {
            event: event.to_string(),
            payload,
            channel: channel.to_string(),
            instance: instance.to_string(),
        }
    }
}

/// A transport-agnostic packet delivered from the network into the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub event: String,
    pub payload: Value,
    pub channel: String,
    /// Instance id of the session that originated the packet.
    pub instance: String,
    /// Network publish time in milliseconds, as stamped by the transport.
    pub timestamp: i64,
}

impl InboundPacket {
    pub fn new(
        event: &str,
        payload: Value,
        channel: &str,
        instance: &str,
        timestamp: i64,
    ) -> Self {
        Self {
            event: event.to_string(),
            payload,
            channel: channel.to_string(),
            instance: instance.to_string(),
            timestamp,
        }
    }
}

/// Abstract pub/sub transport consumed by the engine.
///
/// `publish` is fire-and-forget from the engine's point of view: the
/// synchronous result only covers handing the packet to the transport,
/// never remote delivery. `fetch_state` is the one genuinely asynchronous
/// operation; it is boxed so the trait stays object-safe.
pub trait DeliveryService: Send + Sync {
    /// Hand a packet to the network.
    fn publish(&self, pkt: OutboundPacket) -> Result<(), DeliveryServiceError>;

    /// Subscribe to inbound packets.
    ///
    /// Each call creates a new channel and registers its sender
    /// internally; drain the receiver through [`Me::pump`].
    ///
    /// [`Me::pump`]: crate::me::Me::pump
    fn subscribe(&self) -> std::sync::mpsc::Receiver<InboundPacket>;

    /// Retrieve the stored state for `uuid` from the network.
    fn fetch_state(&self, uuid: &str) -> BoxFuture<'_, Result<State, DeliveryServiceError>>;
}

/// A decoded remote-origin notification the engine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Some session of this identity joined a chat.
    ChatCreated(ChatDescriptor),
    /// Some session of this identity left a chat.
    ChatDeleted(ChatDescriptor),
    /// A peer broadcast a state update on the global channel.
    StateUpdate { uuid: String, state: State },
}

impl ServerEvent {
    /// Decode a packet into a server event. Unknown event names are not
    /// an error; they simply do not concern this subsystem.
    pub fn from_packet(pkt: &InboundPacket) -> Result<Option<Self>, DeliveryServiceError> {
        match pkt.event.as_str() {
            event::SERVER_CHAT_CREATED => {
                let descriptor: ChatDescriptor = serde_json::from_value(pkt.payload.clone())?;
                Ok(Some(Self::ChatCreated(descriptor)))
            }
            event::SERVER_CHAT_DELETED => {
                let descriptor: ChatDescriptor = serde_json::from_value(pkt.payload.clone())?;
                Ok(Some(Self::ChatDeleted(descriptor)))
            }
            event::SERVER_STATE => {
                let update: StateBroadcast = serde_json::from_value(pkt.payload.clone())?;
                Ok(Some(Self::StateUpdate {
                    uuid: update.uuid,
                    state: update.state,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Wire body of a `server.state` broadcast.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct StateBroadcast {
    pub uuid: String,
    pub state: State,
}
