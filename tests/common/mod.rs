#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;

use presence_engine::ds::{DeliveryService, DeliveryServiceError, InboundPacket, OutboundPacket};
use presence_engine::{Config, Context, State};

/// Recording in-memory delivery service.
#[derive(Default)]
pub struct MockDeliveryService {
    published: Mutex<Vec<OutboundPacket>>,
    stored_state: Mutex<Option<State>>,
    fail_fetch: AtomicBool,
    subscribers: Mutex<Vec<Sender<InboundPacket>>>,
}

impl MockDeliveryService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<OutboundPacket> {
        self.published.lock().expect("mock lock poisoned").clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().expect("mock lock poisoned").len()
    }

    /// Set the state the next fetch returns.
    pub fn set_stored_state(&self, state: State) {
        *self.stored_state.lock().expect("mock lock poisoned") = Some(state);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Deliver a packet to every subscriber, as the network would.
    pub fn relay(&self, packet: InboundPacket) {
        let subscribers = self.subscribers.lock().expect("mock lock poisoned");
        for subscriber in subscribers.iter() {
            let _ = subscriber.send(packet.clone());
        }
    }
}

impl DeliveryService for MockDeliveryService {
    fn publish(&self, pkt: OutboundPacket) -> Result<(), DeliveryServiceError> {
        self.published.lock().expect("mock lock poisoned").push(pkt);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<InboundPacket> {
        let (tx, rx) = channel();
        self.subscribers.lock().expect("mock lock poisoned").push(tx);
        rx
    }

    fn fetch_state(&self, _uuid: &str) -> BoxFuture<'_, Result<State, DeliveryServiceError>> {
        let result = if self.fail_fetch.load(Ordering::SeqCst) {
            Err(DeliveryServiceError::StateFetchError(
                "mock fetch failure".to_string(),
            ))
        } else {
            Ok(self
                .stored_state
                .lock()
                .expect("mock lock poisoned")
                .clone()
                .unwrap_or_default())
        };
        async move { result }.boxed()
    }
}

/// Inbound packet stamped with the current wall clock, the way a live
/// transport relays it.
pub fn inbound(
    event: &str,
    payload: serde_json::Value,
    channel: &str,
    instance: &str,
) -> InboundPacket {
    InboundPacket::new(
        event,
        payload,
        channel,
        instance,
        chrono::Utc::now().timestamp_millis(),
    )
}

/// Fresh engine context backed by a recording mock transport.
pub fn engine() -> (Arc<Context>, Arc<MockDeliveryService>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let delivery = MockDeliveryService::new();
    let ctx = Context::new(
        Config::new("global"),
        Arc::clone(&delivery) as Arc<dyn DeliveryService>,
    );
    (ctx, delivery)
}
