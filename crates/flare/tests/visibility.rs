//! Integration tests for private-incident visibility over stored incidents.

mod common;

use common::{new_incident, store};
use flare::domain::{IncidentFilter, NewIncident, NewUser, User};
use flare::storage::IncidentStorage;
use flare::storage::in_memory::InMemoryStore;
use flare::visibility::{filter_visible, is_visible, Viewer};

async fn user(store: &InMemoryStore, email: &str, superuser: bool) -> User {
    store
        .insert_user(NewUser {
            is_superuser: superuser,
            ..NewUser::with_email(email)
        })
        .await
        .unwrap()
}

fn titles(incidents: &[flare::domain::Incident]) -> Vec<&str> {
    incidents.iter().map(|i| i.title.as_str()).collect()
}

#[tokio::test]
async fn test_listing_respects_private_incidents() {
    let store = store();
    let captain = user(&store, "captain@example.com", false).await;
    let participant = user(&store, "participant@example.com", false).await;
    let outsider = user(&store, "outsider@example.com", false).await;
    let admin = user(&store, "admin@example.com", true).await;

    store.create(new_incident("Public outage")).await.unwrap();
    let private = store
        .create(NewIncident {
            is_private: true,
            captain: Some(captain.id),
            ..new_incident("Security breach")
        })
        .await
        .unwrap();
    store
        .add_participants(private.id, &[participant.id])
        .await
        .unwrap();

    let all = store.list(&IncidentFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let as_viewer = |u: &User| filter_visible(all.clone(), Some(&Viewer::from(u)));

    assert_eq!(titles(&as_viewer(&captain)), ["Security breach", "Public outage"]);
    assert_eq!(titles(&as_viewer(&participant)), ["Security breach", "Public outage"]);
    assert_eq!(titles(&as_viewer(&outsider)), ["Public outage"]);
    assert_eq!(titles(&as_viewer(&admin)), ["Security breach", "Public outage"]);
    assert!(filter_visible(all.clone(), None).is_empty());
}

#[tokio::test]
async fn test_becoming_a_participant_grants_access() {
    let store = store();
    let responder = user(&store, "responder@example.com", false).await;
    let private = store
        .create(NewIncident {
            is_private: true,
            ..new_incident("Data leak")
        })
        .await
        .unwrap();
    let viewer = Viewer::from(&responder);

    assert!(!is_visible(&private, &viewer));

    let updated = store
        .add_participants(private.id, &[responder.id])
        .await
        .unwrap();
    assert!(is_visible(&updated.incident, &viewer));
}
