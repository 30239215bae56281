//! End-to-end store tests against the in-process backend.

use std::sync::Arc;

use serde_json::json;

use connect_backend::{tables, Backend};
use connect_client::{AppStore, RegistrationForm, StoreError, ToggleOutcome};
use connect_core::{PostDraft, ProfileUpdate, User, UserRole};

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

fn draft(title: &str) -> PostDraft {
    PostDraft {
        title: title.to_owned(),
        content: "body".to_owned(),
        ..PostDraft::default()
    }
}

#[tokio::test]
async fn test_follow_shows_up_in_followed_profiles() {
    let backend = Backend::new();
    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    let (_bob_store, bob) = signed_in(&backend, "bob").await;

    let outcome = alice_store.toggle_follow(bob.id).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Committed);
    assert!(alice_store.state().await.followed.contains(&bob.id));

    let followed = alice_store.fetch_followed_profiles().await.unwrap();
    assert_eq!(followed.len(), 1);
    assert_eq!(followed[0].id, bob.id);
    assert!(followed[0].followed);

    // Toggle back
    alice_store.toggle_follow(bob.id).await.unwrap();
    assert!(alice_store.fetch_followed_profiles().await.unwrap().is_empty());
    assert!(!alice_store.state().await.followed.contains(&bob.id));
}

#[tokio::test]
async fn test_self_follow_is_rejected_locally() {
    let backend = Backend::new();
    let (store, alice) = signed_in(&backend, "alice").await;

    let before = backend.feed_events();
    assert_eq!(
        store.toggle_follow(alice.id).await.unwrap_err(),
        StoreError::SelfFollow
    );
    // Nothing was written
    assert_eq!(backend.feed_events(), before);
}

#[tokio::test]
async fn test_like_rolls_back_to_pre_toggle_count_on_failure() {
    let backend = Backend::new();
    let (bob_store, bob) = signed_in(&backend, "bob").await;
    let post = bob_store.create_post(&draft("micro-grids")).await.unwrap();

    // Three other users already like the post
    for i in 0..3 {
        backend
            .insert(
                tables::POST_LIKES,
                json!({
                    "post_id": post.id.to_string(),
                    "user_id": format!("00000000-0000-0000-0000-00000000000{i}"),
                }),
            )
            .await
            .unwrap();
    }

    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    let feed = alice_store.fetch_posts().await.unwrap();
    assert_eq!(feed[0].likes, 3);
    assert!(!feed[0].liked);

    backend.fail_next_writes(1);
    let outcome = alice_store.toggle_like(post.id).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::RolledBack);

    let state = alice_store.state().await;
    assert_eq!(state.posts[0].likes, 3);
    assert!(!state.posts[0].liked);

    // With the fault consumed the same toggle commits
    let outcome = alice_store.toggle_like(post.id).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Committed);
    let state = alice_store.state().await;
    assert_eq!(state.posts[0].likes, 4);
    assert!(state.posts[0].liked);

    // And the commit is visible to a fresh fetch
    let feed = alice_store.fetch_posts().await.unwrap();
    assert_eq!(feed[0].likes, 4);
    assert!(feed[0].liked);
}

#[tokio::test]
async fn test_follow_rollback_restores_derived_flags() {
    let backend = Backend::new();
    let (bob_store, bob) = signed_in(&backend, "bob").await;
    bob_store.create_post(&draft("by bob")).await.unwrap();

    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    alice_store.fetch_posts().await.unwrap();
    alice_store.fetch_users().await.unwrap();

    backend.fail_next_writes(1);
    let outcome = alice_store.toggle_follow(bob.id).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::RolledBack);

    let state = alice_store.state().await;
    assert!(!state.followed.contains(&bob.id));
    assert!(!state.posts[0].author_followed);
    let bob_entry = state.users.iter().find(|u| u.id == bob.id).unwrap();
    assert!(!bob_entry.followed);
}

#[tokio::test]
async fn test_feed_annotations_follow_the_viewer() {
    let backend = Backend::new();
    let (bob_store, bob) = signed_in(&backend, "bob").await;
    bob_store.create_post(&draft("seen by alice")).await.unwrap();

    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    alice_store.toggle_follow(bob.id).await.unwrap();

    let feed = alice_store.fetch_posts().await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].author.username, "bob");
    assert!(feed[0].author_followed);
    assert!(!feed[0].liked);

    // Bob's own view of the same post is not annotated by alice's follows
    let feed = bob_store.fetch_posts().await.unwrap();
    assert!(!feed[0].author_followed);
}

#[tokio::test]
async fn test_post_mutation_requires_ownership() {
    let backend = Backend::new();
    let (bob_store, _bob) = signed_in(&backend, "bob").await;
    let post = bob_store.create_post(&draft("original")).await.unwrap();

    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    alice_store.fetch_posts().await.unwrap();
    assert_eq!(
        alice_store
            .update_post(post.id, &draft("hijacked"))
            .await
            .unwrap_err(),
        StoreError::NotOwner
    );
    assert_eq!(
        alice_store.delete_post(post.id).await.unwrap_err(),
        StoreError::NotOwner
    );

    let updated = bob_store.update_post(post.id, &draft("edited")).await.unwrap();
    assert_eq!(updated.title, "edited");
    bob_store.delete_post(post.id).await.unwrap();
    assert!(bob_store.state().await.posts.is_empty());
}

#[tokio::test]
async fn test_create_post_prepends_with_author_card() {
    let backend = Backend::new();
    let (store, _user) = signed_in(&backend, "carol").await;
    store.create_post(&draft("first")).await.unwrap();
    store.create_post(&draft("second")).await.unwrap();

    let state = store.state().await;
    assert_eq!(state.posts[0].title, "second");
    assert_eq!(state.posts[1].title, "first");
    assert_eq!(state.posts[0].author.username, "carol");
}

#[tokio::test]
async fn test_duplicate_username_surfaces_as_its_own_error() {
    let backend = Backend::new();
    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    signed_in(&backend, "bob").await;

    let update = ProfileUpdate {
        username: Some("bob".to_owned()),
        ..ProfileUpdate::default()
    };
    assert_eq!(
        alice_store.update_profile(&update).await.unwrap_err(),
        StoreError::DuplicateUsername
    );
    // Local state untouched
    assert_eq!(
        alice_store.state().await.current_user.unwrap().username,
        "alice"
    );
}

#[tokio::test]
async fn test_profile_update_propagates_to_own_posts() {
    let backend = Backend::new();
    let (store, _user) = signed_in(&backend, "dora").await;
    store.create_post(&draft("mine")).await.unwrap();

    let update = ProfileUpdate {
        full_name: Some("Dora Explorer".to_owned()),
        ..ProfileUpdate::default()
    };
    let user = store.update_profile(&update).await.unwrap();
    assert_eq!(user.full_name, "Dora Explorer");

    let state = store.state().await;
    assert_eq!(state.posts[0].author.full_name, "Dora Explorer");
}

#[tokio::test]
async fn test_like_toggle_round_trip_restores_baseline() {
    let backend = Backend::new();
    let (bob_store, _bob) = signed_in(&backend, "bob").await;
    let post = bob_store.create_post(&draft("baseline")).await.unwrap();
    for i in 0..2 {
        backend
            .insert(
                tables::POST_LIKES,
                json!({
                    "post_id": post.id.to_string(),
                    "user_id": format!("00000000-0000-0000-0000-00000000000{i}"),
                }),
            )
            .await
            .unwrap();
    }

    let (alice_store, _alice) = signed_in(&backend, "alice").await;
    alice_store.fetch_posts().await.unwrap();

    // Like then unlike: the like set ends where it started
    assert_eq!(
        alice_store.toggle_like(post.id).await.unwrap(),
        ToggleOutcome::Committed
    );
    assert_eq!(
        alice_store.toggle_like(post.id).await.unwrap(),
        ToggleOutcome::Committed
    );
    let state = alice_store.state().await;
    assert_eq!(state.posts[0].likes, 2);
    assert!(!state.posts[0].liked);

    let feed = alice_store.fetch_posts().await.unwrap();
    assert_eq!(feed[0].likes, 2);
    assert!(!feed[0].liked);
}

#[tokio::test]
async fn test_avatar_upload_updates_profile_and_storage() {
    let backend = Backend::new();
    let (store, alice) = signed_in(&backend, "alice").await;
    store.create_post(&draft("with avatar")).await.unwrap();

    let url = store
        .upload_avatar(vec![0x89, 0x50, 0x4e, 0x47], "image/png")
        .await
        .unwrap();
    assert!(url.ends_with(&format!("avatars/{}.png", alice.id)));

    // Profile, local state, and the stored object all agree
    let state = store.state().await;
    assert_eq!(state.current_user.unwrap().avatar_url, Some(url.clone()));
    assert_eq!(state.posts[0].author.avatar_url, Some(url.clone()));
    let rows = backend
        .select(
            tables::PROFILES,
            &connect_backend::Filter::new().eq("id", alice.id.to_string()),
        )
        .await
        .unwrap();
    assert_eq!(rows[0]["avatar_url"], json!(url));
    let object = backend
        .storage
        .download(&format!("avatars/{}.png", alice.id))
        .await
        .unwrap();
    assert_eq!(object.content_type, "image/png");

    // Re-upload replaces in place
    store.upload_avatar(vec![1, 2, 3], "image/png").await.unwrap();
    let object = backend
        .storage
        .download(&format!("avatars/{}.png", alice.id))
        .await
        .unwrap();
    assert_eq!(object.bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_toggle_on_unknown_post_is_an_error() {
    let backend = Backend::new();
    let (store, _user) = signed_in(&backend, "alice").await;
    let ghost = uuid::Uuid::new_v4();
    assert_eq!(
        store.toggle_like(ghost).await.unwrap_err(),
        StoreError::UnknownEntity(ghost)
    );
}

#[tokio::test]
async fn test_anonymous_store_requires_auth_for_mutations() {
    let backend = Backend::new();
    let store = AppStore::new(Arc::clone(&backend));
    assert_eq!(
        store.create_post(&draft("nope")).await.unwrap_err(),
        StoreError::AuthRequired
    );
    assert_eq!(
        store.toggle_follow(uuid::Uuid::new_v4()).await.unwrap_err(),
        StoreError::AuthRequired
    );
    // Anonymous feed still loads, with zeroed annotations
    let feed = store.fetch_posts().await.unwrap();
    assert!(feed.is_empty());
}
