//! In-memory storage backend.
//!
//! All data lives in RAM behind one `tokio::sync::Mutex` and is **lost when
//! the process exits** unless it is written out with [`save_to_jsonl`].
//!
//! # Persistence
//!
//! - **In-memory only**: use [`new_in_memory_storage`]
//! - **With persistence**: use [`load_from_jsonl`] to load from disk, then
//!   call [`save_to_jsonl`] to persist changes. The JSONL backend returned by
//!   [`crate::storage::create_storage`] does this for you.
//!
//! # Transactions
//!
//! Every trait method runs under the mutex, which makes each one atomic
//! with respect to the others. `create` additionally opens a counter
//! transaction: the ID counter is snapshotted before allocation and
//! restored if anything fails before the incident is stored, so a failed
//! create never leaves a gap in the ID sequence.
//!
//! Waiting for the mutex inside `create` is bounded by
//! [`StoreSettings::lock_timeout`]; other methods wait indefinitely.
//!
//! # Unique Keys
//!
//! The inner state maintains the indexes a relational store would enforce
//! as unique constraints:
//!
//! - user email
//! - `(identity type, external id)`, plus one link per `(user, identity type)`
//! - `(tag kind, lower-cased tag name)`

mod inner;
mod jsonl;
mod trait_impl;

use crate::error::AllocationError;
use crate::id_allocation::IdAllocator;
use crate::storage::{IncidentStorage, StoreSettings};
use inner::InMemoryStorageInner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

// Re-export public API
pub use jsonl::{load_from_jsonl, save_to_jsonl, LoadWarning};

/// Thread-safe in-memory store.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InMemoryStorageInner>>,
    allocator: IdAllocator,
    lock_timeout: Duration,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_inner(InMemoryStorageInner::new(), settings)
    }

    fn with_inner(inner: InMemoryStorageInner, settings: StoreSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            allocator: IdAllocator::new(settings.id_floor),
            lock_timeout: settings.lock_timeout,
        }
    }

    async fn lock(&self) -> MutexGuard<'_, InMemoryStorageInner> {
        self.inner.lock().await
    }

    /// Acquire the lock that serializes ID allocation, giving up after the
    /// configured timeout.
    async fn lock_for_allocation(
        &self,
    ) -> Result<MutexGuard<'_, InMemoryStorageInner>, AllocationError> {
        tokio::time::timeout(self.lock_timeout, self.inner.lock())
            .await
            .map_err(|_| AllocationError::LockTimeout(self.lock_timeout))
    }

    /// Replace this store's contents with a copy of `other`'s.
    pub(crate) async fn replace_contents(&self, other: &InMemoryStore) {
        let fresh = other.lock().await.clone();
        *self.lock().await = fresh;
    }
}

/// Create a new in-memory storage instance.
///
/// # Example
///
/// ```
/// use flare::storage::in_memory::new_in_memory_storage;
/// use flare::storage::StoreSettings;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let storage = new_in_memory_storage(StoreSettings::default());
///     // Use storage...
/// }
/// ```
pub fn new_in_memory_storage(settings: StoreSettings) -> Box<dyn IncidentStorage> {
    Box::new(InMemoryStore::new(settings))
}
