//! Shared engine context: peer/chat registries, delivery handle, and the
//! centralized error-reporting contract.
//!
//! The context is injected explicitly into everything built on it; there
//! is no ambient global state, so tests can run any number of independent
//! engines side by side.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::chat::{Chat, ChatDescriptor};
use crate::config::Config;
use crate::ds::DeliveryService;
use crate::emitter::Emitter;
use crate::error::ErrorReport;
use crate::event::{self, EventPayload};
use crate::peer::Peer;
use crate::state::State;

/// Process-wide shared state for one engine instance.
///
/// Registry lifecycle is populate-on-first-reference; entries are never
/// proactively garbage-collected by this subsystem.
pub struct Context {
    config: Config,
    delivery: Arc<dyn DeliveryService>,
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    chats: RwLock<HashMap<String, Arc<Chat>>>,
    emitter: Emitter,
    instance_id: String,
}

impl Context {
    pub fn new(config: Config, delivery: Arc<dyn DeliveryService>) -> Arc<Self> {
        Arc::new(Self {
            config,
            delivery,
            peers: RwLock::new(HashMap::new()),
            chats: RwLock::new(HashMap::new()),
            emitter: Emitter::new(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn delivery(&self) -> &Arc<dyn DeliveryService> {
        &self.delivery
    }

    /// Engine-level event surface; peer- and chat-scoped events are
    /// forwarded here as well.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Identifier of this engine instance, distinct per session of the
    /// same identity. Used to tell relayed packets apart from echoes of
    /// our own.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Look up a peer by uuid.
    pub fn peer(&self, uuid: &str) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uuid)
            .cloned()
    }

    /// Fetch or create the single in-memory peer for `uuid`.
    ///
    /// Creation applies `initial_state` through the assign path, so a
    /// `peer.state` notification fires for a fresh peer. When the peer
    /// already exists this is a no-op registration: the existing entry is
    /// returned untouched and `initial_state` is discarded.
    pub fn get_or_create_peer(self: &Arc<Self>, uuid: &str, initial_state: State) -> Arc<Peer> {
        if let Some(existing) = self.peer(uuid) {
            return existing;
        }
        let created = {
            let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = peers.get(uuid) {
                return Arc::clone(existing);
            }
            let peer = Peer::new(self, uuid);
            peers.insert(uuid.to_string(), Arc::clone(&peer));
            peer
        };
        log::debug!("registered peer {uuid}");
        created.assign(&initial_state);
        created
    }

    /// Look up a chat by channel name.
    pub fn chat(&self, channel: &str) -> Option<Arc<Chat>> {
        self.chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    /// Fetch or create the chat handle for `descriptor.channel`.
    ///
    /// Returns the handle and whether it was freshly constructed. The
    /// registry never holds two distinct handles for one channel, so an
    /// existing entry wins over the incoming descriptor.
    pub fn get_or_create_chat(&self, descriptor: &ChatDescriptor) -> (Arc<Chat>, bool) {
        let mut chats = self.chats.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = chats.get(&descriptor.channel) {
            return (Arc::clone(existing), false);
        }
        let chat = Arc::new(Chat::new(
            descriptor.channel.clone(),
            descriptor.private,
            descriptor.group.clone(),
        ));
        chats.insert(descriptor.channel.clone(), Arc::clone(&chat));
        log::debug!(
            "registered chat {} (group {})",
            descriptor.channel,
            descriptor.group
        );
        (chat, true)
    }

    /// Drop a chat from the global registry. Holders keep their `Arc`s;
    /// only the registry entry goes away.
    pub fn remove_chat(&self, channel: &str) -> Option<Arc<Chat>> {
        self.chats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel)
    }

    pub fn peer_count(&self) -> usize {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn chat_count(&self) -> usize {
        self.chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Centralized error-reporting contract.
    ///
    /// Builds a structured [`ErrorReport`], logs it, and emits
    /// `error.<operation>` on the scoped emitter and on the engine
    /// emitter. Reported errors are recoverable by definition: control
    /// flow continues in the caller.
    pub fn report_error(
        &self,
        scope: &Emitter,
        category: &str,
        operation: &str,
        source: anyhow::Error,
    ) {
        let report = ErrorReport::new(category, operation, &source);
        log::error!("{report}");
        let payload = EventPayload::new(format!("{}.{operation}", event::ERROR_PREFIX))
            .with_data(serde_json::json!(report));
        scope.emit(&payload);
        if !std::ptr::eq(scope, &self.emitter) {
            self.emitter.emit(&payload);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("instance_id", &self.instance_id)
            .field("peers", &self.peer_count())
            .field("chats", &self.chat_count())
            .finish()
    }
}
