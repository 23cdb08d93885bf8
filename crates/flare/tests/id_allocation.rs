//! Integration tests for incident ID allocation through the store.
//!
//! These cover concurrent creators, gapless numbering, rollback of failed
//! creates, and counter self-healing after an import without a counter row.

mod common;

use common::{new_incident, store};
use flare::domain::{IncidentFilter, NewIncident, Severity, UserId};
use flare::error::{Error, ValidationError};
use flare::id_allocation::IdCounterState;
use flare::storage::{IncidentStorage, StoreSettings, StoreSnapshot};
use flare::storage::in_memory::InMemoryStore;
use std::collections::BTreeSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_unique_ids() {
    const CREATORS: u64 = 50;
    let store = store();

    let handles: Vec<_> = (0..CREATORS)
        .map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create(new_incident(&format!("Outage {n}"))).await })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        let incident = handle.await.unwrap().unwrap();
        assert!(ids.insert(incident.id.as_u64()), "duplicate id {}", incident.id);
    }

    // Unique, at or above the floor, and with no holes
    let expected: BTreeSet<u64> = (2000..2000 + CREATORS).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_ids_are_gapless_and_start_at_floor() {
    let store = store();

    for expected in 2000..2005 {
        let incident = store.create(new_incident("Outage")).await.unwrap();
        assert_eq!(incident.id.as_u64(), expected);
    }
}

#[tokio::test]
async fn test_custom_floor() {
    let store = InMemoryStore::new(StoreSettings {
        id_floor: 1,
        ..Default::default()
    });

    let incident = store.create(new_incident("First")).await.unwrap();
    assert_eq!(incident.id.as_u64(), 1);
}

#[tokio::test]
async fn test_failed_creates_do_not_consume_ids() {
    let store = store();

    let first = store.create(new_incident("First")).await.unwrap();

    // Validation failure
    let err = store
        .create(NewIncident {
            title: "   ".to_string(),
            severity: Some(Severity::P1),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::EmptyTitle)));

    // Missing severity
    let err = store
        .create(NewIncident {
            title: "No severity".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::MissingSeverity)));

    // Unknown captain fails after an ID was drawn and must roll it back
    let err = store
        .create(NewIncident {
            captain: Some(UserId::new(404)),
            ..new_incident("Ghost captain")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UserNotFound(_)));

    let second = store.create(new_incident("Second")).await.unwrap();
    assert_eq!(second.id.as_u64(), first.id.as_u64() + 1);

    let all = store.list(&IncidentFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_import_without_counter_heals_from_max_id() {
    let source = store();
    for n in 0..4 {
        source.create(new_incident(&format!("Old {n}"))).await.unwrap();
    }
    let mut snapshot = source.export_all().await.unwrap();
    snapshot.counter = None;

    let target = store();
    target.import(snapshot).await.unwrap();

    let incident = target.create(new_incident("After import")).await.unwrap();
    assert_eq!(incident.id.as_u64(), 2004);
}

#[tokio::test]
async fn test_stale_counter_moves_forward() {
    let source = store();
    for n in 0..3 {
        source.create(new_incident(&format!("Old {n}"))).await.unwrap();
    }
    let snapshot = StoreSnapshot {
        counter: Some(IdCounterState { next_id: 2000 }),
        ..source.export_all().await.unwrap()
    };

    let target = store();
    target.import(snapshot).await.unwrap();

    let incident = target.create(new_incident("After import")).await.unwrap();
    assert_eq!(incident.id.as_u64(), 2003);
}
