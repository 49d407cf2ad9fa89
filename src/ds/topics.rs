//! Deterministic channel naming for per-peer feed and direct chats.
//!
//! Every peer owns two well-known channels scoped under the global
//! channel. Feed is world-readable but only the peer writes to it;
//! direct is world-writable but only the peer reads it. Grants are
//! enforced server-side; the names only need to be reproducible from
//! `(global_channel, uuid)` on every client.

/// Group tag under which feed chats are registered.
pub const FEED_GROUP: &str = "feed";
/// Group tag under which direct chats are registered.
pub const DIRECT_GROUP: &str = "direct";

/// Channel the peer publishes presence-style events on.
pub fn feed_channel(global_channel: &str, uuid: &str) -> String {
    [global_channel, "user", uuid, "read.", "feed"].join("#")
}

/// Channel other clients push notifications to the peer on.
pub fn direct_channel(global_channel: &str, uuid: &str) -> String {
    [global_channel, "user", uuid, "write.", "direct"].join("#")
}
