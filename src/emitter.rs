//! In-process hierarchical event bus with dotted-segment wildcard matching.
//!
//! Event names are dotted paths (`session.chat.joined`). A subscription
//! pattern may use `*` for a segment: in an interior position it matches
//! exactly one segment, in the trailing position it matches one or more
//! segments (everything below the prefix). `session.*` therefore matches
//! both `session.chat.joined` and `session.chat.leave`.
//!
//! Dispatch is synchronous and runs in registration order over a snapshot
//! of the handler list taken at emit time: a handler registered while an
//! event is being dispatched does not receive that event, and a handler
//! removed mid-dispatch is skipped. A failing handler is logged and does
//! not prevent delivery to the remaining handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::event::EventPayload;

/// Shared subscriber callback. Returning an error aborts only this
/// handler's delivery; the error is logged and dispatch continues.
pub type Handler = Arc<dyn Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync>;

/// Opaque handle identifying a single registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: u64,
    pattern: Pattern,
    once: bool,
    handler: Handler,
}

/// Hierarchical, wildcard-capable local publish/subscribe bus.
#[derive(Default)]
pub struct Emitter {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future emission matching `pattern`.
    pub fn on(
        &self,
        pattern: &str,
        handler: impl Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(pattern, Arc::new(handler), false)
    }

    /// Register `handler` for the first future emission matching
    /// `pattern`; the registration is removed before the handler runs.
    pub fn once(
        &self,
        pattern: &str,
        handler: impl Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(pattern, Arc::new(handler), true)
    }

    fn register(&self, pattern: &str, handler: Handler, once: bool) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            id,
            pattern: Pattern::parse(pattern),
            once,
            handler,
        };
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);
        HandlerId(id)
    }

    /// Remove a registration. Removing an unknown handle is a no-op.
    pub fn off(&self, id: HandlerId) {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| r.id != id.0);
    }

    /// Dispatch `payload` synchronously to all currently registered
    /// handlers whose pattern matches `payload.event`.
    ///
    /// Re-entrant: a handler may itself call `emit`, and the nested
    /// emission is fully processed before the outer dispatch resumes —
    /// including delivery back to the very handler that emitted it.
    pub fn emit(&self, payload: &EventPayload) {
        let matching: Vec<(u64, Handler, bool)> = {
            let registrations = self
                .registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registrations
                .iter()
                .filter(|r| r.pattern.matches(&payload.event))
                .map(|r| (r.id, Arc::clone(&r.handler), r.once))
                .collect()
        };

        for (id, handler, once) in matching {
            // Re-check against the live list so handlers removed during
            // this dispatch are skipped; `once` registrations come off
            // the list before their handler runs.
            let still_registered = {
                let mut registrations = self
                    .registrations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match registrations.iter().position(|r| r.id == id) {
                    Some(pos) => {
                        if once {
                            registrations.remove(pos);
                        }
                        true
                    }
                    None => false,
                }
            };
            if !still_registered {
                continue;
            }

            // No lock is held while the handler runs, so it is free to
            // emit, register, or remove handlers, including itself.
            if let Err(err) = handler(payload) {
                log::warn!("handler for '{}' failed: {err:#}", payload.event);
            }
        }
    }

    /// Number of live registrations.
    pub fn handler_count(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// A parsed dotted-segment subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| {
                if s == "*" {
                    Segment::Any
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, event: &str) -> bool {
        let event: Vec<&str> = event.split('.').collect();
        let trailing_any = matches!(self.segments.last(), Some(Segment::Any));

        if trailing_any {
            // The trailing `*` consumes one or more segments.
            if event.len() < self.segments.len() {
                return false;
            }
            let prefix = &self.segments[..self.segments.len() - 1];
            prefix
                .iter()
                .zip(event.iter())
                .all(|(seg, ev)| seg.matches_segment(ev))
        } else {
            if event.len() != self.segments.len() {
                return false;
            }
            self.segments
                .iter()
                .zip(event.iter())
                .all(|(seg, ev)| seg.matches_segment(ev))
        }
    }
}

impl Segment {
    fn matches_segment(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == segment,
            Segment::Any => true,
        }
    }
}
