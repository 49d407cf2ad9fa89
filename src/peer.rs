//! A connected participant: identity, state, and chat membership.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio_util::sync::CancellationToken;

use crate::chat::{Chat, ChatDescriptor};
use crate::context::Context;
use crate::ds::{direct_channel, feed_channel, DIRECT_GROUP, FEED_GROUP};
use crate::emitter::Emitter;
use crate::event::{self, EventPayload};
use crate::state::State;

/// An identity observed on the network.
///
/// At most one `Peer` exists per uuid within a [`Context`]; construction
/// goes through [`Context::get_or_create_peer`]. The `chats` map only
/// holds channels the local client is also a member of — a privacy
/// preserving view, not the peer's global membership.
pub struct Peer {
    uuid: String,
    state: RwLock<State>,
    chats: RwLock<HashMap<String, Arc<Chat>>>,
    feed: Arc<Chat>,
    direct: Arc<Chat>,
    emitter: Emitter,
    ctx: Arc<Context>,
    /// Back-reference to the shared handle, so notifications can carry a
    /// typed reference to this peer.
    weak_self: Weak<Peer>,
}

impl Peer {
    /// Registry-only constructor; see [`Context::get_or_create_peer`].
    /// The initial state is applied by the caller through the assign
    /// path once the peer is registered.
    pub(crate) fn new(ctx: &Arc<Context>, uuid: &str) -> Arc<Self> {
        let global = &ctx.config().global_channel;
        let (feed, _) = ctx.get_or_create_chat(&ChatDescriptor::new(
            feed_channel(global, uuid),
            false,
            FEED_GROUP,
        ));
        let (direct, _) = ctx.get_or_create_chat(&ChatDescriptor::new(
            direct_channel(global, uuid),
            false,
            DIRECT_GROUP,
        ));
        Arc::new_cyclic(|weak_self| Self {
            uuid: uuid.to_string(),
            state: RwLock::new(State::new()),
            chats: RwLock::new(HashMap::new()),
            feed,
            direct,
            emitter: Emitter::new(),
            ctx: Arc::clone(ctx),
            weak_self: weak_self.clone(),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Channels this peer shares with the local client, keyed by channel
    /// name.
    pub fn chats(&self) -> HashMap<String, Arc<Chat>> {
        self.chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn feed(&self) -> &Arc<Chat> {
        &self.feed
    }

    pub fn direct(&self) -> &Arc<Chat> {
        &self.direct
    }

    /// Peer-scoped event surface; everything emitted here is forwarded
    /// to the engine emitter as well.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Local-only mutation primitive: shallow merge, no notification, no
    /// network interaction.
    pub fn update(&self, incoming: &State) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(incoming);
    }

    /// Remote-origin entry point: merge `incoming` and notify observers
    /// with both the resulting and the previous state. This is the single
    /// path by which network state changes become visible locally.
    pub fn assign(&self, incoming: &State) {
        let old_state = self.state();
        self.update(incoming);
        let mut payload = EventPayload::new(event::PEER_STATE).with_data(serde_json::json!({
            "state": self.state(),
            "oldState": old_state,
        }));
        payload.peer = self.weak_self.upgrade();
        self.broadcast(&payload);
    }

    /// Record shared membership in `chat` and notify `peer.online`.
    pub fn add_chat(&self, chat: &Arc<Chat>) {
        self.chats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat.channel().to_string(), Arc::clone(chat));
        let mut payload = EventPayload::new(event::PEER_ONLINE).with_chat(Arc::clone(chat));
        payload.peer = self.weak_self.upgrade();
        self.broadcast(&payload);
    }

    /// Drop shared membership in `chat` and notify `peer.offline`.
    /// Removing a chat that was never added is a silent no-op.
    pub fn remove_chat(&self, chat: &Arc<Chat>) {
        let removed = self
            .chats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(chat.channel());
        if removed.is_none() {
            return;
        }
        let mut payload = EventPayload::new(event::PEER_OFFLINE).with_chat(Arc::clone(chat));
        payload.peer = self.weak_self.upgrade();
        self.broadcast(&payload);
    }

    /// Fetch this peer's stored state from the network and apply it via
    /// [`Peer::assign`]. Failures are reported on `chat`'s emitter, never
    /// raised into the caller; the prior state stands. Calling this
    /// outside a tokio runtime is such a failure: it is reported as
    /// `error.get_state` and nothing is fetched.
    ///
    /// The returned handle can cancel the in-flight fetch; dropping it
    /// simply detaches.
    pub fn fetch_state(&self, chat: &Arc<Chat>) -> FetchHandle {
        let token = CancellationToken::new();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.ctx.report_error(
                chat.emitter(),
                "fetch",
                "get_state",
                anyhow::anyhow!("no async runtime available for the state fetch"),
            );
            return FetchHandle { token, task: None };
        };
        let Some(peer) = self.weak_self.upgrade() else {
            // Only reachable mid-drop; there is nobody left to notify.
            return FetchHandle { token, task: None };
        };
        let task_token = token.clone();
        let chat = Arc::clone(chat);
        let task = runtime.spawn(async move {
            let fetch = peer.ctx.delivery().fetch_state(peer.uuid());
            tokio::select! {
                // Cancellation wins over an already-completed fetch.
                biased;
                () = task_token.cancelled() => {
                    log::debug!("state fetch for {} cancelled", peer.uuid());
                }
                result = fetch => match result {
                    Ok(state) => peer.assign(&state),
                    Err(err) => peer.ctx.report_error(
                        chat.emitter(),
                        "fetch",
                        "get_state",
                        err.into(),
                    ),
                },
            }
        });
        FetchHandle {
            token,
            task: Some(task),
        }
    }

    pub(crate) fn broadcast(&self, payload: &EventPayload) {
        self.emitter.emit(payload);
        self.ctx.emitter().emit(payload);
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .finish()
    }
}

/// Discardable handle to an in-flight state fetch. Carries no task when
/// the fetch never started.
#[derive(Debug)]
pub struct FetchHandle {
    token: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FetchHandle {
    /// Cancel the fetch. The peer's state is left as it was.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the fetch (or its cancellation) to finish. Only useful
    /// for tests and shutdown paths; the fetch completes on its own
    /// otherwise.
    pub async fn done(self) {
        if let Some(task) = self.task {
            if let Err(err) = task.await {
                log::warn!("state fetch task failed: {err}");
            }
        }
    }
}
