//! Integration tests for resolving external identities to local users.

mod common;

use common::store;
use flare::directory::{DirectoryUser, StaticDirectory};
use flare::domain::IdentityType;
use flare::error::ResolutionError;
use flare::storage::in_memory::InMemoryStore;
use flare::storage::IncidentStorage;
use flare::users::UserResolver;
use std::sync::Arc;
use tokio::sync::Barrier;

fn resolver(store: Arc<InMemoryStore>, dir: StaticDirectory) -> UserResolver {
    UserResolver::new(store, Arc::new(dir))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_email_resolution_converges_on_one_user() {
    let store = store();
    // Both callers pass the "not found" check before either inserts
    let gate = Arc::new(Barrier::new(2));
    let directory = StaticDirectory::new()
        .with_user(DirectoryUser::new("U1", "dana@example.com"))
        .with_lookup_gate(gate);
    let resolver = resolver(store.clone(), directory);

    let a = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve_by_email("dana@example.com").await })
    };
    let b = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve_by_email("Dana@Example.com").await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(store.list_users().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_chat_resolution_converges_on_one_user() {
    let store = store();
    let gate = Arc::new(Barrier::new(2));
    let directory = StaticDirectory::new()
        .with_user(DirectoryUser::new("U7", "erin@example.com"))
        .with_lookup_gate(gate);
    let resolver = resolver(store.clone(), directory);

    let (a, b) = tokio::join!(
        resolver.resolve_by_chat_id("U7"),
        resolver.resolve_by_chat_id("U7")
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.id, b.id);
    let users = store.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    let linked = store
        .find_user_by_identity(IdentityType::Chat, "U7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked.id, a.id);
}

#[tokio::test]
async fn test_chat_and_sso_identities_share_a_user() {
    let store = store();
    let directory = StaticDirectory::new().with_user(DirectoryUser {
        display_name: Some("frank".to_string()),
        ..DirectoryUser::new("U8", "frank@example.com")
    });
    let resolver = resolver(store.clone(), directory);

    let via_chat = resolver.resolve_by_chat_id("U8").await.unwrap();
    let via_sso = resolver
        .resolve_by_sso("okta|frank", "FRANK@example.com")
        .await
        .unwrap();

    assert_eq!(via_chat.id, via_sso.id);
    assert_eq!(via_sso.display_name, "frank");
    assert!(via_sso.identity(IdentityType::Chat).is_some());
    assert!(via_sso.identity(IdentityType::Sso).is_some());
    assert!(!via_sso.password_usable);
}

#[tokio::test]
async fn test_stub_user_is_enriched_once_directory_recovers() {
    let store = store();
    let directory = StaticDirectory::new().with_user(DirectoryUser {
        first_name: Some("Gina".to_string()),
        ..DirectoryUser::new("U9", "gina@example.com")
    });
    directory.fail_lookups(true);
    let resolver = resolver(store.clone(), directory.clone());

    // Outage: chat id resolves to a stub user with a synthesized email
    let stub = resolver.resolve_by_chat_id("U9").await.unwrap();
    assert_eq!(stub.email, "u9@chat.invalid");
    assert!(stub.has_empty_profile());

    // Same chat id later finds the stub through its identity link
    directory.fail_lookups(false);
    let again = resolver.resolve_by_chat_id("U9").await.unwrap();
    assert_eq!(again.id, stub.id);

    // Resolving by the real email creates the real user and enriches it
    let real = resolver.resolve_by_email("gina@example.com").await.unwrap();
    assert_ne!(real.id, stub.id);
    assert_eq!(real.first_name, "Gina");
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let store = store();
    let resolver = resolver(store.clone(), StaticDirectory::new());

    let err = resolver.resolve_by_email("not-an-email").await.unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidEmail(_)));
    assert!(store.list_users().await.unwrap().is_empty());
}
