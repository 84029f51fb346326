//! Integration tests for the auth event listener
//!
//! Run with: cargo test --test listener_tests -- --nocapture

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};

use farma_core::adapters::{GatewayOp, InMemoryGateway, UrlLocation};
use farma_core::domain::{AuthEvent, AuthEventKind, User};
use farma_core::ports::AuthGateway;
use farma_core::services::{AuthListener, RecoveryService, SessionStore};

const EMAIL: &str = "asha@example.com";
const PASSWORD: &str = "secret1";

fn setup() -> (
    Arc<InMemoryGateway>,
    Arc<SessionStore<InMemoryGateway>>,
    Arc<UrlLocation>,
) {
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(SessionStore::new(Arc::clone(&gateway), "http://localhost:3000"));
    let location = Arc::new(UrlLocation::parse("http://localhost:3000/account").unwrap());
    (gateway, store, location)
}

/// Poll until `check` holds, giving the listener task time to run
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_signed_in_event_loads_user_profile_and_addresses() {
    let (gateway, store, location) = setup();
    let user = gateway.register(EMAIL, PASSWORD, Map::new());
    gateway.insert_address(&user.id, json!({"id": 7, "user_id": user.id, "city": "Pune"}));
    let _listener = AuthListener::spawn(Arc::clone(&store), location);

    // Sign-in happening outside the store, e.g. an OAuth redirect
    gateway.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    assert!(eventually(|| store.snapshot().addresses.len() == 1).await);
    let state = store.snapshot();
    assert_eq!(state.user.map(|u| u.id), Some(user.id.clone()));
    assert_eq!(state.profile.map(|p| p.id), Some(user.id));
}

#[tokio::test]
async fn test_signed_out_event_clears_state_and_navigates_home() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    assert!(store.sign_in(EMAIL, PASSWORD).await.success);
    let _listener = AuthListener::spawn(Arc::clone(&store), location.clone());

    // Signed out by another part of the app
    gateway.sign_out().await.unwrap();

    assert!(eventually(|| store.current_user().is_none()).await);
    assert!(store.profile().is_none());
    assert!(eventually(|| location.history() == vec!["/".to_string()]).await);
}

#[tokio::test]
async fn test_token_refresh_leaves_state_alone() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    let session = gateway
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap()
        .session
        .unwrap();
    let listener = AuthListener::new(Arc::clone(&store), location);

    listener
        .handle(AuthEvent::new(AuthEventKind::TokenRefreshed, Some(session.clone())))
        .await;
    listener
        .handle(AuthEvent::new(AuthEventKind::PasswordRecovery, Some(session)))
        .await;

    assert!(store.current_user().is_none());
}

#[tokio::test]
async fn test_user_updated_replaces_cached_user() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    assert!(store.sign_in(EMAIL, PASSWORD).await.success);
    let mut session = gateway.current_session().unwrap();
    session.user = User {
        email: Some("new@example.com".into()),
        ..session.user
    };
    let listener = AuthListener::new(Arc::clone(&store), location);

    listener
        .handle(AuthEvent::new(AuthEventKind::UserUpdated, Some(session)))
        .await;

    let user = store.current_user().unwrap();
    assert_eq!(user.email.as_deref(), Some("new@example.com"));
    // Same user id, so the profile survives
    assert!(store.profile().is_some());
}

#[tokio::test]
async fn test_user_updated_for_uncached_user_is_ignored() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    let session = gateway
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap()
        .session
        .unwrap();
    let listener = AuthListener::new(Arc::clone(&store), location);

    listener
        .handle(AuthEvent::new(AuthEventKind::UserUpdated, Some(session)))
        .await;

    assert!(store.current_user().is_none());
}

#[tokio::test]
async fn test_password_reset_stays_signed_out_when_sign_out_fails() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    assert!(store.sign_in(EMAIL, PASSWORD).await.success);
    let listener = AuthListener::spawn(Arc::clone(&store), location.clone());
    let recovery = RecoveryService::new(Arc::clone(&store), location);
    gateway.fail_always(GatewayOp::SignOut, "network down");

    let result = recovery.update_password_with_token("n3w-secret").await;
    assert!(result.success, "{}", result.error_message());
    assert!(store.current_user().is_none());

    // Let the queued user-updated event reach the store
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(listener.is_running());
    assert!(store.current_user().is_none());
    assert!(store.profile().is_none());
}

#[tokio::test]
async fn test_signed_in_without_session_is_ignored() {
    let (_gateway, store, location) = setup();
    let listener = AuthListener::new(Arc::clone(&store), location);

    listener
        .handle(AuthEvent::new(AuthEventKind::SignedIn, None))
        .await;

    assert!(store.current_user().is_none());
}

#[tokio::test]
async fn test_shutdown_stops_dispatch() {
    let (gateway, store, location) = setup();
    gateway.register(EMAIL, PASSWORD, Map::new());
    let mut listener = AuthListener::spawn(Arc::clone(&store), location);
    assert!(listener.is_running());

    listener.shutdown();
    assert!(!listener.is_running());
    gateway.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.current_user().is_none());
}
