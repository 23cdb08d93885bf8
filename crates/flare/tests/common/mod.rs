//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use flare::directory::{DirectoryAdapter, StaticDirectory};
use flare::domain::{Incident, LinkType, NewIncident, Severity};
use flare::storage::in_memory::InMemoryStore;
use flare::storage::{IncidentStorage, StoreSettings};
use flare::sync::{ParticipantSync, SyncConfig};
use flare::users::UserResolver;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

/// Channel URL used by linked incidents.
pub const CHANNEL_URL: &str = "https://acme.slack.com/archives/C0INC";

/// Channel id inside [`CHANNEL_URL`].
pub const CHANNEL_ID: &str = "C0INC";

/// Fresh in-memory store with default settings.
pub fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(StoreSettings::default()))
}

/// Minimal valid creation request.
pub fn new_incident(title: &str) -> NewIncident {
    NewIncident {
        title: title.to_string(),
        severity: Some(Severity::P2),
        ..Default::default()
    }
}

/// Create an incident linked to [`CHANNEL_URL`].
pub async fn linked_incident(store: &dyn IncidentStorage, title: &str) -> Incident {
    let incident = store.create(new_incident(title)).await.unwrap();
    store
        .set_external_link(incident.id, LinkType::SlackChannel, CHANNEL_URL)
        .await
        .unwrap()
}

/// Reconciliation engine wired to `store` and `directory`.
pub fn participant_sync(
    store: Arc<InMemoryStore>,
    directory: &StaticDirectory,
    config: SyncConfig,
) -> ParticipantSync {
    let adapter: Arc<dyn DirectoryAdapter> = Arc::new(directory.clone());
    let resolver = UserResolver::new(store.clone(), adapter.clone())
        .with_lookup_timeout(config.adapter_timeout);
    ParticipantSync::new(store, adapter, resolver, config)
}

/// Path of the flare binary built for this test run.
pub fn flare_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_flare"))
}

/// Run the flare binary in the specified directory.
pub fn run_flare_in_dir(dir: &Path, args: &[&str]) -> Output {
    Command::new(flare_binary())
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute flare binary")
}
