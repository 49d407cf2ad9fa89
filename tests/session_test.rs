mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use presence_engine::{ChatDescriptor, Me, SessionError, State};

use common::{engine, inbound};

fn counter(
    emitter: &presence_engine::Emitter,
    pattern: &str,
) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    emitter.on(pattern, move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    count
}

#[test]
fn update_publishes_and_assign_never_does() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));

    for _ in 0..3 {
        me.update(&State::from_value(&json!({"typing": true})))
            .expect("publish failed");
    }
    assert_eq!(delivery.publish_count(), 3);

    for _ in 0..5 {
        me.assign(&State::from_value(&json!({"typing": false})));
    }
    assert_eq!(delivery.publish_count(), 3);
    assert_eq!(me.state().get("typing"), Some(&json!(false)));
}

#[test]
fn published_state_lands_on_the_global_channel() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));

    me.update(&State::from_value(&json!({"away": true})))
        .expect("publish failed");

    let published = delivery.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].channel, "global");
    assert_eq!(published[0].event, "server.state");
    assert_eq!(published[0].payload["uuid"], json!("u1"));
    assert_eq!(published[0].payload["state"], json!({"away": true}));
    assert_eq!(published[0].instance, ctx.instance_id());
}

#[test]
fn session_join_deduplicates_against_the_chat_registry() {
    let (ctx, _delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let joined = counter(ctx.emitter(), "session.chat.joined");
    let descriptor = ChatDescriptor::new("c1", false, "g1");

    // Fresh construction: the chat is unknown, so the session signals
    // that it caught up to a membership change it did not initiate.
    let first = me.add_chat_to_session(&descriptor);
    assert_eq!(joined.load(Ordering::SeqCst), 1);

    // Dedup attach: the registry already holds the handle, no signal.
    let second = me.add_chat_to_session(&descriptor);
    assert_eq!(joined.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));

    let group = me.session_group("g1").expect("group missing");
    assert_eq!(group.len(), 1);
    assert!(Arc::ptr_eq(&group["c1"], &first));
}

#[test]
fn attaching_a_registry_chat_emits_nothing() {
    let (ctx, _delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let joined = counter(ctx.emitter(), "session.chat.joined");

    let descriptor = ChatDescriptor::new("c1", true, "g1");
    let (existing, created) = ctx.get_or_create_chat(&descriptor);
    assert!(created);

    let attached = me.add_chat_to_session(&descriptor);
    assert!(Arc::ptr_eq(&existing, &attached));
    assert_eq!(joined.load(Ordering::SeqCst), 0);
}

#[test]
fn removing_an_unknown_session_chat_reports_and_changes_nothing() {
    let (ctx, _delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let reports = counter(ctx.emitter(), "error.remove_chat");
    let left = counter(ctx.emitter(), "session.chat.leave");

    me.add_chat_to_session(&ChatDescriptor::new("c1", false, "g1"));
    let before = me.session();

    // Unknown group.
    let result = me.remove_chat_from_session(&ChatDescriptor::new("c1", false, "nope"));
    assert!(matches!(result, Err(SessionError::UnknownSessionChat { .. })));

    // Known group, unknown channel.
    let result = me.remove_chat_from_session(&ChatDescriptor::new("nope", false, "g1"));
    assert!(matches!(result, Err(SessionError::UnknownSessionChat { .. })));

    assert_eq!(reports.load(Ordering::SeqCst), 2);
    assert_eq!(left.load(Ordering::SeqCst), 0);
    assert_eq!(me.session().len(), before.len());
    assert!(me.session_group("g1").expect("group missing").contains_key("c1"));
}

#[test]
fn leave_fires_before_the_membership_is_deleted() {
    let (ctx, _delivery) = engine();
    let me = Arc::new(Me::new(&ctx, "u1", json!(null)));
    let descriptor = ChatDescriptor::new("c1", false, "g1");
    me.add_chat_to_session(&descriptor);

    let observed_membership = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed_membership);
    let me_in_handler = Arc::clone(&me);
    ctx.emitter().on("session.chat.leave", move |_| {
        let still_tracked = me_in_handler
            .session_group("g1")
            .is_some_and(|group| group.contains_key("c1"));
        *sink.lock().expect("lock poisoned") = Some(still_tracked);
        Ok(())
    });

    me.remove_chat_from_session(&descriptor).expect("remove failed");

    assert_eq!(*observed_membership.lock().expect("lock poisoned"), Some(true));
    assert!(ctx.chat("c1").is_none());
    assert!(!me.session_group("g1").expect("group missing").contains_key("c1"));
}

#[test]
fn reentrant_removal_from_a_leave_handler_sees_the_unknown_target_error() {
    let (ctx, _delivery) = engine();
    let me = Arc::new(Me::new(&ctx, "u1", json!(null)));
    let descriptor = ChatDescriptor::new("c1", false, "g1");
    me.add_chat_to_session(&descriptor);

    let inner_result = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&inner_result);
    let me_in_handler = Arc::clone(&me);
    let reentrant = descriptor.clone();
    ctx.emitter().on("session.chat.leave", move |_| {
        let result = me_in_handler.remove_chat_from_session(&reentrant);
        *sink.lock().expect("lock poisoned") = Some(result);
        Ok(())
    });
    let left = counter(ctx.emitter(), "session.chat.leave");

    let outer = me.remove_chat_from_session(&descriptor);

    assert!(outer.is_ok());
    let inner = inner_result.lock().expect("lock poisoned");
    assert!(matches!(
        inner.as_ref().expect("handler never ran"),
        Err(SessionError::UnknownSessionChat { .. })
    ));
    // One leave for the outer removal; the re-entrant attempt emits none.
    assert_eq!(left.load(Ordering::SeqCst), 1);
    assert!(!me.session_group("g1").expect("group missing").contains_key("c1"));
}

#[test]
fn session_removal_leaves_the_flat_peer_membership_alone() {
    let (ctx, _delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let descriptor = ChatDescriptor::new("c1", false, "g1");

    let chat = me.add_chat_to_session(&descriptor);
    me.peer().add_chat(&chat);

    me.remove_chat_from_session(&descriptor).expect("remove failed");

    // The global registry entry is gone, but in-flight handlers can
    // still reach the chat through the peer's flat map.
    assert!(ctx.chat("c1").is_none());
    assert!(me.peer().chats().contains_key("c1"));
}

#[test]
fn inbound_packets_from_other_sessions_reconcile_the_session() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let receiver = ctx.delivery().subscribe();
    let joined = counter(ctx.emitter(), "session.chat.joined");

    delivery.relay(inbound(
        "server.chat.created",
        json!({"channel": "c1", "private": false, "group": "g1"}),
        "global",
        "some-other-session",
    ));
    me.pump(&receiver);

    assert_eq!(joined.load(Ordering::SeqCst), 1);
    assert!(me.session_group("g1").expect("group missing").contains_key("c1"));

    delivery.relay(inbound(
        "server.chat.deleted",
        json!({"channel": "c1", "private": false, "group": "g1"}),
        "global",
        "some-other-session",
    ));
    me.pump(&receiver);

    assert!(!me.session_group("g1").expect("group missing").contains_key("c1"));
    assert!(ctx.chat("c1").is_none());
}

#[test]
fn own_echoes_are_skipped_wholesale() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let receiver = ctx.delivery().subscribe();
    let joined = counter(ctx.emitter(), "session.chat.joined");

    delivery.relay(inbound(
        "server.chat.created",
        json!({"channel": "c1", "private": false, "group": "g1"}),
        "global",
        ctx.instance_id(),
    ));
    me.pump(&receiver);

    assert_eq!(joined.load(Ordering::SeqCst), 0);
    assert!(me.session_group("g1").is_none());
}

#[test]
fn state_broadcasts_route_to_the_right_peer() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let receiver = ctx.delivery().subscribe();

    // Echo of our own state: merged silently, never re-published.
    delivery.relay(inbound(
        "server.state",
        json!({"uuid": "u1", "state": {"typing": true}}),
        "global",
        "some-other-session",
    ));
    // A broadcast for a peer we have never seen: created on first
    // reference with the broadcast state.
    delivery.relay(inbound(
        "server.state",
        json!({"uuid": "u2", "state": {"away": true}}),
        "global",
        "some-other-session",
    ));
    me.pump(&receiver);

    assert_eq!(me.state().get("typing"), Some(&json!(true)));
    assert_eq!(delivery.publish_count(), 0);
    let other = ctx.peer("u2").expect("peer not created");
    assert_eq!(other.state().get("away"), Some(&json!(true)));
}

#[test]
fn malformed_packets_are_reported_not_raised() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let receiver = ctx.delivery().subscribe();
    let reports = counter(ctx.emitter(), "error.decode_packet");

    delivery.relay(inbound(
        "server.chat.created",
        json!("not a descriptor"),
        "global",
        "some-other-session",
    ));
    me.pump(&receiver);

    assert_eq!(reports.load(Ordering::SeqCst), 1);
    assert!(me.session().is_empty());
}

#[test]
fn end_to_end_scenario() {
    let (ctx, delivery) = engine();
    let me = Me::new(&ctx, "u1", json!(null));
    let joined = counter(ctx.emitter(), "session.chat.joined");

    me.update(&State::from_value(&json!({"typing": true})))
        .expect("publish failed");
    assert_eq!(me.state(), State::from_value(&json!({"typing": true})));
    assert_eq!(delivery.publish_count(), 1);

    me.assign(&State::from_value(&json!({"typing": false, "away": true})));
    assert_eq!(
        me.state(),
        State::from_value(&json!({"typing": false, "away": true}))
    );
    assert_eq!(delivery.publish_count(), 1);

    let descriptor = ChatDescriptor::new("c1", false, "g1");
    me.add_chat_to_session(&descriptor);
    me.add_chat_to_session(&descriptor);
    assert_eq!(me.session_group("g1").expect("group missing").len(), 1);
    assert_eq!(joined.load(Ordering::SeqCst), 1);
}
