//! The privileged local participant: the one peer whose state changes are
//! published, and the reconciliation point for multi-session chat
//! membership.
//!
//! # Loop avoidance
//!
//! A local state change has to reach the network, and the network echoes
//! it back on the global channel. Exactly one of the two state entry
//! points touches the network: [`Me::update`] merges locally and then
//! publishes once; [`Me::assign`] merges locally and never publishes.
//! Routing every remote-origin update through `assign` is what keeps the
//! echo from re-broadcasting forever.
//!
//! # Session reconciliation
//!
//! The same identity may be connected from several sessions (tabs,
//! devices). Each session converges on the same per-group view of joined
//! chats using only the discrete `server.chat.created` /
//! `server.chat.deleted` notifications relayed by the delivery service
//! from whichever session performed the action. Joins deduplicate against
//! the global chat registry; removals of unknown targets are reported
//! errors, not state corruption.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;

use crate::chat::{Chat, ChatDescriptor};
use crate::context::Context;
use crate::ds::{InboundPacket, OutboundPacket, ServerEvent};
use crate::error::{PeerError, SessionError};
use crate::event::{self, EventPayload};
use crate::peer::Peer;
use crate::state::State;

type SessionMap = HashMap<String, HashMap<String, Arc<Chat>>>;

/// The local client's identity. Composes a [`Peer`] rather than extending
/// one; everything privileged lives here.
pub struct Me {
    peer: Arc<Peer>,
    auth_data: Value,
    /// Grouped view of the chats this session has joined, group tag →
    /// channel → shared handle. Distinct from the flat membership map on
    /// [`Peer`], which other sessions never reconcile.
    session: RwLock<SessionMap>,
    /// (group, channel) pairs currently mid-removal, so a leave handler
    /// that re-triggers removal sees the unknown-target error instead of
    /// racing the outer removal.
    removing: Mutex<HashSet<(String, String)>>,
    ctx: Arc<Context>,
}

impl Me {
    pub fn new(ctx: &Arc<Context>, uuid: &str, auth_data: Value) -> Self {
        let peer = ctx.get_or_create_peer(uuid, State::new());
        Self {
            peer,
            auth_data,
            session: RwLock::new(HashMap::new()),
            removing: Mutex::new(HashSet::new()),
            ctx: Arc::clone(ctx),
        }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    pub fn uuid(&self) -> &str {
        self.peer.uuid()
    }

    pub fn state(&self) -> State {
        self.peer.state()
    }

    pub fn auth_data(&self) -> &Value {
        &self.auth_data
    }

    /// Snapshot of the session view.
    pub fn session(&self) -> SessionMap {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of one session group.
    pub fn session_group(&self, group: &str) -> Option<HashMap<String, Arc<Chat>>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .cloned()
    }

    /// Local intent: merge `incoming` and publish the resulting state on
    /// the global channel. This is the only path that publishes state.
    ///
    /// The publish is fire-and-forget; an `Err` only means the transport
    /// refused the packet, and the local merge has already happened. The
    /// failure is also reported on this peer's emitter.
    pub fn update(&self, incoming: &State) -> Result<(), PeerError> {
        self.peer.update(incoming);
        let payload = serde_json::json!({
            "uuid": self.peer.uuid(),
            "state": self.peer.state(),
        });
        let packet = OutboundPacket::new(
            event::SERVER_STATE,
            payload,
            &self.ctx.config().global_channel,
            self.ctx.instance_id(),
        );
        if let Err(err) = self.ctx.delivery().publish(packet) {
            self.ctx.report_error(
                self.peer.emitter(),
                "delivery",
                "set_state",
                anyhow::anyhow!("{err}"),
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Network-echo entry point: merge `incoming` locally and nothing
    /// else. Must never publish, or the echo loops.
    pub fn assign(&self, incoming: &State) {
        self.peer.update(incoming);
    }

    /// Record that some session of this identity joined a chat.
    ///
    /// The global chat registry is consulted first: an existing handle is
    /// attached to the session silently. Only a freshly constructed chat
    /// emits `session.chat.joined`, which is the signal that this session
    /// caught up to a membership change it did not initiate.
    pub fn add_chat_to_session(&self, descriptor: &ChatDescriptor) -> Arc<Chat> {
        let (chat, created) = self.ctx.get_or_create_chat(descriptor);
        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            session
                .entry(descriptor.group.clone())
                .or_default()
                .insert(descriptor.channel.clone(), Arc::clone(&chat));
        }
        if created {
            log::info!(
                "session joined chat {} (group {})",
                descriptor.channel,
                descriptor.group
            );
            let payload =
                EventPayload::new(event::SESSION_CHAT_JOINED).with_chat(Arc::clone(&chat));
            self.peer.broadcast(&payload);
        }
        chat
    }

    /// Record that some session of this identity left a chat.
    ///
    /// `session.chat.leave` fires before any mutation so observers can
    /// still read the membership that is about to go away. Afterwards the
    /// chat is dropped from the global registry and from the session
    /// group. The flat membership map on [`Peer`] is deliberately left
    /// alone: in-flight handlers may still need the handle to emit
    /// trailing events for that chat.
    ///
    /// Removing a chat the session does not track is an error: it is
    /// reported, returned, and leaves every map unchanged.
    pub fn remove_chat_from_session(
        &self,
        descriptor: &ChatDescriptor,
    ) -> Result<(), SessionError> {
        let key = (descriptor.group.clone(), descriptor.channel.clone());

        // Locks are released before anything is reported or emitted.
        let tracked = {
            let mut removing = self.removing.lock().unwrap_or_else(PoisonError::into_inner);
            let tracked = if removing.contains(&key) {
                None
            } else {
                self.session
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&descriptor.group)
                    .and_then(|chats| chats.get(&descriptor.channel))
                    .cloned()
            };
            if tracked.is_some() {
                removing.insert(key.clone());
            }
            tracked
        };
        let Some(chat) = tracked else {
            let err = SessionError::UnknownSessionChat {
                group: descriptor.group.clone(),
                channel: descriptor.channel.clone(),
            };
            self.ctx.report_error(
                self.peer.emitter(),
                "session",
                "remove_chat",
                anyhow::anyhow!("{err}"),
            );
            return Err(err);
        };

        let payload = EventPayload::new(event::SESSION_CHAT_LEAVE).with_chat(Arc::clone(&chat));
        self.peer.broadcast(&payload);

        self.ctx.remove_chat(&descriptor.channel);
        if let Some(chats) = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&descriptor.group)
        {
            chats.remove(&descriptor.channel);
        }
        self.removing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        log::info!(
            "session left chat {} (group {})",
            descriptor.channel,
            descriptor.group
        );
        Ok(())
    }

    /// React to one decoded remote-origin notification.
    pub fn handle_server_event(&self, server_event: ServerEvent) {
        match server_event {
            ServerEvent::ChatCreated(descriptor) => {
                self.add_chat_to_session(&descriptor);
            }
            ServerEvent::ChatDeleted(descriptor) => {
                // Already reported inside; out-of-order created/deleted
                // pairs land here and must not corrupt state.
                if self.remove_chat_from_session(&descriptor).is_err() {
                    log::debug!(
                        "dropped deletion of untracked chat {}",
                        descriptor.channel
                    );
                }
            }
            ServerEvent::StateUpdate { uuid, state } => {
                if uuid == self.peer.uuid() {
                    // Echo of our own broadcast; merge without publishing.
                    self.assign(&state);
                } else if let Some(peer) = self.ctx.peer(&uuid) {
                    peer.assign(&state);
                } else {
                    self.ctx.get_or_create_peer(&uuid, state);
                }
            }
        }
    }

    /// Route one raw packet. Packets from this very instance are echoes
    /// the transport relayed back and are skipped wholesale; malformed
    /// payloads are reported, not raised.
    pub fn handle_inbound(&self, packet: &InboundPacket) {
        if packet.instance == self.ctx.instance_id() {
            log::debug!("skipping own echo of '{}'", packet.event);
            return;
        }
        match ServerEvent::from_packet(packet) {
            Ok(Some(server_event)) => self.handle_server_event(server_event),
            Ok(None) => {}
            Err(err) => self.ctx.report_error(
                self.peer.emitter(),
                "delivery",
                "decode_packet",
                err.into(),
            ),
        }
    }

    /// Drain every packet currently buffered on `receiver` through
    /// [`Me::handle_inbound`]. Call from the application's event loop;
    /// the engine does not own a loop of its own.
    pub fn pump(&self, receiver: &Receiver<InboundPacket>) {
        for packet in receiver.try_iter() {
            self.handle_inbound(&packet);
        }
    }
}

impl std::fmt::Debug for Me {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Me")
            .field("uuid", &self.peer.uuid())
            .field("state", &self.peer.state())
            .field(
                "session_groups",
                &self
                    .session
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}
