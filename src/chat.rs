//! Chat handles: named pub/sub channels with privacy and grouping tags.
//!
//! The chat internals (join/leave mechanics, history, encryption) belong
//! to the transport layer; the engine only tracks shared handles. A chat
//! is always held as `Arc<Chat>` and is shared between the global chat
//! registry and any peer or session map that references it, so dropping
//! it from one holder never invalidates the others.

use serde::{Deserialize, Serialize};

use crate::emitter::Emitter;

/// Wire description of a chat, as relayed in `server.chat.created` and
/// `server.chat.deleted` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDescriptor {
    pub channel: String,
    #[serde(default)]
    pub private: bool,
    pub group: String,
}

impl ChatDescriptor {
    pub fn new(channel: impl Into<String>, private: bool, group: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            private,
            group: group.into(),
        }
    }
}

/// A shared handle to one named channel.
#[derive(Debug)]
pub struct Chat {
    channel: String,
    private: bool,
    group: String,
    emitter: Emitter,
}

impl Chat {
    /// Construction goes through [`Context::get_or_create_chat`] so the
    /// global registry stays deduplicated.
    ///
    /// [`Context::get_or_create_chat`]: crate::context::Context::get_or_create_chat
    pub(crate) fn new(channel: impl Into<String>, private: bool, group: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            private,
            group: group.into(),
            emitter: Emitter::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The chat's own event surface, used for chat-scoped notifications
    /// and error reports.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn descriptor(&self) -> ChatDescriptor {
        ChatDescriptor::new(self.channel.clone(), self.private, self.group.clone())
    }
}
