//! Closed event-name vocabulary and the payload type carried by the bus.
//!
//! Event names form a small, versioned protocol surface; everything the
//! engine emits or consumes is listed here as a constant. Free-form
//! strings are never part of the protocol.

use std::sync::Arc;

use serde_json::Value;

use crate::chat::Chat;
use crate::peer::Peer;

/// A peer changed state. Payload: peer, new state, old state.
pub const PEER_STATE: &str = "peer.state";
/// A peer appeared in a chat. Payload: peer, chat.
pub const PEER_ONLINE: &str = "peer.online";
/// A peer left a chat. Payload: peer, chat.
pub const PEER_OFFLINE: &str = "peer.offline";
/// Another session of this identity joined a chat this session did not
/// know about. Payload: chat.
pub const SESSION_CHAT_JOINED: &str = "session.chat.joined";
/// This session is about to drop a chat from its session view.
/// Emitted before the membership maps are mutated. Payload: chat.
pub const SESSION_CHAT_LEAVE: &str = "session.chat.leave";

/// Relayed by the delivery service when any session of this identity
/// creates a chat.
pub const SERVER_CHAT_CREATED: &str = "server.chat.created";
/// Relayed by the delivery service when any session of this identity
/// deletes a chat.
pub const SERVER_CHAT_DELETED: &str = "server.chat.deleted";
/// Broadcast state update for some peer, including the echo of our own.
pub const SERVER_STATE: &str = "server.state";

/// Prefix for scoped error events (`error.<operation>`).
pub const ERROR_PREFIX: &str = "error";

/// Payload delivered to every matching handler of an emission.
///
/// `peer`/`chat` are typed references to the objects involved, set where
/// the event concerns one; `data` carries the event-specific JSON body.
#[derive(Clone, Default)]
pub struct EventPayload {
    pub event: String,
    pub peer: Option<Arc<Peer>>,
    pub chat: Option<Arc<Chat>>,
    pub data: Value,
}

impl EventPayload {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, peer: Arc<Peer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_chat(mut self, chat: Arc<Chat>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl std::fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPayload")
            .field("event", &self.event)
            .field("peer", &self.peer.as_ref().map(|p| p.uuid().to_string()))
            .field("chat", &self.chat.as_ref().map(|c| c.channel().to_string()))
            .field("data", &self.data)
            .finish()
    }
}
