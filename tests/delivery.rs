//! End-to-end tests for the delivery engine against an in-memory database.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;

use pulse_chat::db::{ConversationRepository, MessageRepository, UserRepository};
use pulse_chat::error::AppError;
use pulse_chat::realtime::{
    DedupWindow, DeleteScope, DeliveryEngine, PresenceTable, ServerEvent,
};

async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

async fn create_user(pool: &Pool<Sqlite>, username: &str) -> String {
    let user = UserRepository::create(
        pool,
        username.to_string(),
        format!("{} Test", username),
        "male".to_string(),
        format!("https://example.com/{}.png", username),
        &[0u8; 32],
        &[0u8; 32],
    )
    .await
    .expect("create user");
    user.id
}

fn engine(pool: &Pool<Sqlite>, presence: &Arc<PresenceTable>) -> DeliveryEngine {
    DeliveryEngine::new(pool.clone(), presence.clone(), Arc::new(DedupWindow::new()))
}

#[tokio::test]
async fn send_then_history_includes_message_for_both_sides() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let sent = engine.send(&alice, &bob, "hello bob").await.unwrap();
    assert_eq!(sent.sender_id, alice);
    assert_eq!(sent.receiver_id, bob);
    assert_eq!(sent.body, "hello bob");

    // Pair lookup is order-independent, so both perspectives see it.
    let from_bob = engine.history(&bob, &alice).await.unwrap();
    assert_eq!(from_bob.len(), 1);
    assert_eq!(from_bob[0].id, sent.id);

    let from_alice = engine.history(&alice, &bob).await.unwrap();
    assert_eq!(from_alice.len(), 1);
}

#[tokio::test]
async fn concurrent_first_sends_create_exactly_one_conversation() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    // Opposite directions so both sides race the first-contact creation.
    let (a, b) = tokio::join!(
        engine.send(&alice, &bob, "first"),
        engine.send(&bob, &alice, "second"),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.conversation_id, b.conversation_id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn empty_body_is_rejected_before_persistence() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let err = engine.send(&alice, &bob, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn send_to_unknown_receiver_is_not_found() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;

    let err = engine.send(&alice, "no-such-user", "hi").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_by_non_participant_is_forbidden_and_leaves_message() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;
    let mallory = create_user(&pool, "mallory").await;

    let sent = engine.send(&alice, &bob, "private").await.unwrap();

    let err = engine
        .delete(&mallory, &sent.id, DeleteScope::AnyParticipant)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert!(MessageRepository::get_by_id(&pool, &sent.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn delete_by_receiver_removes_record_and_sequence_entry() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let sent = engine.send(&alice, &bob, "soon gone").await.unwrap();

    engine
        .delete(&bob, &sent.id, DeleteScope::AnyParticipant)
        .await
        .unwrap();

    assert!(MessageRepository::get_by_id(&pool, &sent.id)
        .await
        .unwrap()
        .is_none());
    let ids = ConversationRepository::message_ids(&pool, &sent.conversation_id)
        .await
        .unwrap();
    assert!(ids.is_empty());
    assert!(engine.history(&alice, &bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn wire_delete_scope_is_sender_only() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let sent = engine.send(&alice, &bob, "mine").await.unwrap();

    // The receiver may delete over the request/response surface but not
    // through the push protocol's sender-only variant.
    let err = engine
        .delete(&bob, &sent.id, DeleteScope::SenderOnly)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    engine
        .delete(&alice, &sent.id, DeleteScope::SenderOnly)
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_of_missing_message_is_not_found() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;

    let err = engine
        .delete(&alice, "ghost", DeleteScope::AnyParticipant)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn send_to_offline_receiver_persists_without_push() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    // Bob has no live connection; the send must still succeed.
    let sent = engine.send(&alice, &bob, "hi").await.unwrap();

    assert_eq!(engine.history(&bob, &alice).await.unwrap().len(), 1);
    assert_eq!(engine.history(&alice, &bob).await.unwrap()[0].id, sent.id);
}

#[tokio::test]
async fn online_receiver_gets_exactly_one_push() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    presence.connect(bob.clone(), tx).await;

    let sent = engine.send(&alice, &bob, "ping you").await.unwrap();

    match rx.recv().await {
        Some(ServerEvent::NewMessage(pushed)) => {
            assert_eq!(pushed.id, sent.id);
            assert_eq!(pushed.body, "ping you");
        }
        other => panic!("expected newMessage push, got {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn deletion_notifies_both_live_participants() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let sent = engine.send(&alice, &bob, "retracted").await.unwrap();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    presence.connect(alice.clone(), tx_a).await;
    presence.connect(bob.clone(), tx_b).await;

    engine
        .delete(&alice, &sent.id, DeleteScope::SenderOnly)
        .await
        .unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        match rx.recv().await {
            Some(ServerEvent::MessageDeleted {
                message_id,
                conversation_id,
                sender_id,
            }) => {
                assert_eq!(message_id, sent.id);
                assert_eq!(conversation_id, sent.conversation_id);
                assert_eq!(sender_id, alice);
            }
            other => panic!("expected messageDeleted, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn reads_skip_dangling_sequence_entries() {
    let pool = test_pool().await;
    let presence = Arc::new(PresenceTable::new());
    let engine = engine(&pool, &presence);

    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let kept = engine.send(&alice, &bob, "kept").await.unwrap();
    let dangled = engine.send(&alice, &bob, "dangled").await.unwrap();

    // Simulate a crash between sequence removal and record delete, in the
    // other direction: record gone, sequence entry left behind.
    MessageRepository::delete(&pool, &dangled.id).await.unwrap();
    let ids = ConversationRepository::message_ids(&pool, &kept.conversation_id)
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let history = engine.history(&alice, &bob).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, kept.id);
}
