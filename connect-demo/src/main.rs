//! StartupConnect demo — a scripted two-user session against the
//! in-process platform.
//!
//! Walks through the whole client surface: registration with email
//! confirmation, the annotated post feed, optimistic like/follow toggles
//! (including a forced rollback), a live conversation with read receipts,
//! and presence. Run with `RUST_LOG=info` for the store's own logging.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use connect_backend::Backend;
use connect_client::{AppStore, Conversation, PresenceWatcher, RegistrationForm};
use connect_core::{PostDraft, StartupDetails, UserRole};

async fn sign_up(
    backend: &Arc<Backend>,
    name: &str,
    role: UserRole,
) -> Result<Arc<AppStore>, Box<dyn Error>> {
    let store = AppStore::new(Arc::clone(backend));
    let form = RegistrationForm {
        email: format!("{name}@startupconnect.test"),
        password: "hunter22".to_owned(),
        full_name: name.to_owned(),
        username: name.to_owned(),
        role,
    };
    store.register(&form).await?;
    // Stand in for the user clicking the confirmation link
    let user = store.complete_registration(&form.email).await?;
    info!("{} is signed in as {:?}", user.username, user.role);
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let backend = Backend::new();

    let maya = sign_up(&backend, "maya", UserRole::Entrepreneur).await?;
    let viktor = sign_up(&backend, "viktor", UserRole::Investor).await?;

    // Maya pitches her startup
    let post = maya
        .create_post(&PostDraft {
            title: "Solar micro-grids for off-grid towns".to_owned(),
            content: "Pay-as-you-go energy with zero upfront hardware cost.".to_owned(),
            tags: vec!["energy".to_owned(), "climate".to_owned()],
            startup_details: Some(StartupDetails {
                problem: "600M people lack reliable power".to_owned(),
                solution: "Container-sized solar micro-grids".to_owned(),
                funding_needs: "$1.2M seed".to_owned(),
                ..StartupDetails::default()
            }),
            ..PostDraft::default()
        })
        .await?;
    println!("maya posted: {}", post.title);

    // Viktor browses the feed and reacts
    let feed = viktor.fetch_posts().await?;
    println!("viktor sees {} post(s), top: {:?}", feed.len(), feed[0].title);

    let outcome = viktor.toggle_like(post.id).await?;
    println!("viktor likes the post: {outcome:?}");
    let outcome = viktor.toggle_follow(post.author_id).await?;
    println!("viktor follows maya: {outcome:?}");

    // A flaky network turns the next toggle into a rollback
    backend.fail_next_writes(1);
    let outcome = viktor.toggle_like(post.id).await?;
    println!("viktor un-likes during an outage: {outcome:?}");
    let state = viktor.state().await;
    println!(
        "feed after rollback: {} like(s), liked={}",
        state.posts[0].likes, state.posts[0].liked
    );

    let maya_id = post.author_id;
    let viktor_id = state.current_user.as_ref().map(|u| u.id).unwrap_or_default();

    // Presence: maya can see viktor is online
    let watcher = PresenceWatcher::watch(&backend, viktor_id);
    println!("viktor online: {}", watcher.is_online());

    // They take it to direct messages
    let viktor_chat = Conversation::open(&viktor, maya_id).await?;
    viktor_chat
        .send("Impressive numbers. What does the $1.2M buy?")
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("maya's unread badge: {}", maya.state().await.unread_total);

    let maya_chat = Conversation::open(&maya, viktor_id).await?;
    maya_chat
        .send("Two pilot deployments and a 6-person field team.")
        .await?;
    println!("maya's badge after opening the chat: {}", maya.state().await.unread_total);

    tokio::time::sleep(Duration::from_millis(50)).await;
    for message in viktor_chat.messages().await {
        let who = if message.sender_id == viktor_id { "viktor" } else { "maya" };
        let receipt = if message.read { "read" } else { "unread" };
        println!("  [{receipt}] {who}: {}", message.content);
    }

    // Viktor heads out
    viktor.logout().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("viktor online after logout: {}", watcher.is_online());

    Ok(())
}
