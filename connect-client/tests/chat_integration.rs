//! Conversation tests: delivery, read receipts, dedup, deletion.

use std::sync::Arc;
use std::time::Duration;

use connect_backend::Backend;
use connect_client::{AppStore, Conversation, RegistrationForm, StoreError};
use connect_core::{User, UserRole};

async fn signed_in(backend: &Arc<Backend>, name: &str) -> (Arc<AppStore>, User) {
    let store = AppStore::new(Arc::clone(backend));
    let form = RegistrationForm {
        email: format!("{name}@example.com"),
        password: "secret1".to_owned(),
        full_name: format!("{name} tester"),
        username: name.to_owned(),
        role: UserRole::Entrepreneur,
    };
    store.register(&form).await.unwrap();
    let user = store.complete_registration(&form.email).await.unwrap();
    (store, user)
}

/// Let spawned intake/watcher tasks drain the feed.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_sent_message_is_not_doubled_by_its_echo() {
    let backend = Backend::new();
    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    let (_bob_store, bob) = signed_in(&backend, "bob").await;

    let conversation = Conversation::open(&alice_store, bob.id).await.unwrap();
    let sent = conversation.send("hello").await.unwrap().unwrap();
    assert_eq!(sent.content, "hello");

    // The insert comes back over the change feed; dedup keeps one copy
    settle().await;
    let messages = conversation.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, sent.id);
}

#[tokio::test]
async fn test_blank_input_is_a_silent_noop() {
    let backend = Backend::new();
    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    let (_bob_store, bob) = signed_in(&backend, "bob").await;

    let conversation = Conversation::open(&alice_store, bob.id).await.unwrap();
    assert!(conversation.send("").await.unwrap().is_none());
    assert!(conversation.send("   \n").await.unwrap().is_none());
    assert!(conversation.messages().await.is_empty());
}

#[tokio::test]
async fn test_opening_marks_backlog_read_and_clears_badge() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;

    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();
    bob_side.send("one").await.unwrap();
    bob_side.send("two").await.unwrap();

    settle().await;
    assert_eq!(alice_store.state().await.unread_total, 2);

    // Opening the conversation reads the backlog in one batch
    let alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    let messages = alice_side.messages().await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.read));
    assert_eq!(alice_store.state().await.unread_total, 0);

    // Bob's transcript picks the read receipts up over the feed
    settle().await;
    assert!(bob_side.messages().await.iter().all(|m| m.read));
}

#[tokio::test]
async fn test_live_delivery_is_read_on_sight() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;

    let alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();

    bob_side.send("are you there?").await.unwrap();
    settle().await;

    let messages = alice_side.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].read);
    // Watching the conversation means the badge never sticks
    assert_eq!(alice_store.state().await.unread_total, 0);
}

#[tokio::test]
async fn test_messages_outside_the_pair_are_ignored() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (_bob_store, bob) = signed_in(&backend, "bob").await;
    let (carol_store, _carol) = signed_in(&backend, "carol").await;

    let alice_bob = Conversation::open(&alice_store, bob.id).await.unwrap();
    let carol_alice = Conversation::open(&carol_store, alice.id).await.unwrap();
    carol_alice.send("psst").await.unwrap();

    settle().await;
    assert!(alice_bob.messages().await.is_empty());
    // But it still counts toward alice's total badge
    assert_eq!(alice_store.state().await.unread_total, 1);
}

#[tokio::test]
async fn test_only_the_sender_may_delete() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;

    let alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();
    let sent = alice_side.send("regrettable").await.unwrap().unwrap();
    settle().await;

    assert_eq!(
        bob_side.delete_messages(&[sent.id]).await.unwrap_err(),
        StoreError::NotOwner
    );
    assert_eq!(bob_side.messages().await.len(), 1);

    alice_side.delete_messages(&[sent.id]).await.unwrap();
    assert!(alice_side.messages().await.is_empty());
    // The delete event removes it from bob's transcript too
    settle().await;
    assert!(bob_side.messages().await.is_empty());
}

#[tokio::test]
async fn test_failed_delete_restores_the_transcript() {
    let backend = Backend::new();
    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    let (_bob_store, bob) = signed_in(&backend, "bob").await;

    let conversation = Conversation::open(&alice_store, bob.id).await.unwrap();
    let sent = conversation.send("sticky").await.unwrap().unwrap();
    settle().await;

    backend.fail_next_writes(1);
    assert!(conversation.delete_messages(&[sent.id]).await.is_err());

    // Reconciled by re-fetch: the message survived remotely
    let messages = conversation.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, sent.id);
}

#[tokio::test]
async fn test_transcript_is_oldest_first() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;

    let alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();
    alice_side.send("first").await.unwrap();
    bob_side.send("second").await.unwrap();
    alice_side.send("third").await.unwrap();
    settle().await;

    let contents: Vec<String> = alice_side
        .messages()
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["first", "second", "third"]);

    // A fresh open sees the same order
    drop(alice_side);
    let reopened = Conversation::open(&alice_store, bob.id).await.unwrap();
    let contents: Vec<String> = reopened
        .messages()
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reload_keeps_messages_delivered_mid_fetch() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;

    let alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();

    // Bob keeps sending while alice re-loads; anything the intake task
    // delivers between a reload's fetch and its writeback must survive
    let sender = tokio::spawn(async move {
        for i in 0..8 {
            bob_side.send(&format!("live {i}")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        bob_side
    });
    for _ in 0..8 {
        alice_side.load().await.unwrap();
    }
    let _bob_side = sender.await.unwrap();
    settle().await;

    let contents: Vec<String> = alice_side
        .messages()
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents.len(), 8, "transcript lost messages: {contents:?}");
    for i in 0..8 {
        assert!(contents.contains(&format!("live {i}")));
    }
}

#[tokio::test]
async fn test_unread_from_is_scoped_to_one_sender() {
    let backend = Backend::new();
    let (alice_store, alice) = signed_in(&backend, "alice").await;
    let (bob_store, bob) = signed_in(&backend, "bob").await;
    let (carol_store, carol) = signed_in(&backend, "carol").await;

    let bob_side = Conversation::open(&bob_store, alice.id).await.unwrap();
    bob_side.send("from bob 1").await.unwrap();
    bob_side.send("from bob 2").await.unwrap();
    let carol_side = Conversation::open(&carol_store, alice.id).await.unwrap();
    carol_side.send("from carol").await.unwrap();
    settle().await;

    assert_eq!(alice_store.unread_from(bob.id).await.unwrap(), 2);
    assert_eq!(alice_store.unread_from(carol.id).await.unwrap(), 1);

    // Reading bob's conversation leaves carol's count alone
    let _alice_side = Conversation::open(&alice_store, bob.id).await.unwrap();
    assert_eq!(alice_store.unread_from(bob.id).await.unwrap(), 0);
    assert_eq!(alice_store.unread_from(carol.id).await.unwrap(), 1);
    assert_eq!(alice_store.state().await.unread_total, 1);
}

#[tokio::test]
async fn test_conversation_requires_a_signed_in_viewer() {
    let backend = Backend::new();
    let store = AppStore::new(Arc::clone(&backend));
    let err = Conversation::open(&store, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::AuthRequired);
}
