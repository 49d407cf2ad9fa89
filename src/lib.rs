//! Client-side identity and presence layer on top of a pub/sub delivery
//! service.
//!
//! The engine models connected participants ([`Peer`]), the privileged
//! local participant ([`Me`]), and named channels ([`Chat`]), and keeps
//! each peer's state and chat membership consistent as notifications
//! arrive from the network and from other sessions of the same identity.
//!
//! The transport itself is out of scope: the engine consumes the
//! [`ds::DeliveryService`] trait and assumes best-effort delivery with
//! last-applied-wins semantics. There is no causal ordering and no
//! exactly-once guarantee.

pub mod chat;
pub mod config;
pub mod context;
pub mod ds;
pub mod emitter;
pub mod error;
pub mod event;
pub mod me;
pub mod peer;
pub mod state;

pub use chat::{Chat, ChatDescriptor};
pub use config::Config;
pub use context::Context;
pub use emitter::{Emitter, HandlerId, Pattern};
pub use error::{ErrorReport, PeerError, SessionError};
pub use event::EventPayload;
pub use me::Me;
pub use peer::{FetchHandle, Peer};
pub use state::State;
