//! Gapless incident ID allocation.
//!
//! Incident IDs are plain integers issued from a singleton counter row. The
//! allocator never keeps its own state: every call reads and increments the
//! counter through a [`CounterStorage`] that the caller has already locked
//! for the enclosing transaction, so the ID and the incident that uses it
//! commit (or roll back) together.
//!
//! # Features
//!
//! - **Gapless**: sequential allocations return consecutive integers
//! - **Unique under concurrency**: the read-increment-write runs while the
//!   caller holds exclusive access to the counter
//! - **Self-healing**: a missing counter is recreated from `max(id) + 1`
//!   (or the configured floor), and a stale counter that lags behind the
//!   highest stored ID is bumped forward instead of handing out a duplicate
//!
//! # Example
//!
//! ```
//! use flare::id_allocation::{CounterStorage, IdAllocator, IdCounterState};
//!
//! #[derive(Default)]
//! struct Row(Option<IdCounterState>);
//!
//! impl CounterStorage for Row {
//!     fn counter_for_update(&mut self) -> Option<&mut IdCounterState> {
//!         self.0.as_mut()
//!     }
//!     fn get_or_create_counter(&mut self, next_id: u64) -> bool {
//!         if self.0.is_some() {
//!             return false;
//!         }
//!         self.0 = Some(IdCounterState { next_id });
//!         true
//!     }
//!     fn max_incident_id(&self) -> Option<u64> {
//!         None
//!     }
//! }
//!
//! let allocator = IdAllocator::new(2000);
//! let mut row = Row::default();
//! assert_eq!(allocator.allocate(&mut row).unwrap().as_u64(), 2000);
//! assert_eq!(allocator.allocate(&mut row).unwrap().as_u64(), 2001);
//! ```

use crate::domain::IncidentId;
use crate::error::AllocationError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default first incident ID.
pub const DEFAULT_ID_FLOOR: u64 = 2000;

/// The singleton counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounterState {
    /// Value the next allocation returns
    pub next_id: u64,
}

/// Exclusive view of the counter row inside a transaction.
///
/// Implementations are handed to [`IdAllocator::allocate`] while the caller
/// holds the lock that serializes writers (a row lock, a mutex guard, a
/// lease). Nothing here may release that lock.
pub trait CounterStorage {
    /// Locked counter row, or `None` if the row does not exist.
    fn counter_for_update(&mut self) -> Option<&mut IdCounterState>;

    /// Create the counter row with `next_id` unless it already exists.
    ///
    /// Returns `true` if this call created the row. The row must be fetched
    /// again through [`CounterStorage::counter_for_update`] afterwards.
    fn get_or_create_counter(&mut self, next_id: u64) -> bool;

    /// Highest incident ID currently stored.
    fn max_incident_id(&self) -> Option<u64>;
}

/// Issues incident IDs from a [`CounterStorage`].
#[derive(Debug, Clone, Copy)]
pub struct IdAllocator {
    floor: u64,
}

impl IdAllocator {
    /// Create an allocator whose first ID is `floor`.
    pub fn new(floor: u64) -> Self {
        Self { floor }
    }

    /// Configured first ID.
    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Allocate the next ID.
    ///
    /// Must be called inside the transaction that persists the incident;
    /// rolling that transaction back must also roll back the counter.
    ///
    /// # Errors
    ///
    /// - [`AllocationError::CounterUnavailable`] if the counter row cannot be
    ///   read back after create-or-fetch
    /// - [`AllocationError::Exhausted`] if the counter is at `u64::MAX`
    pub fn allocate<S>(&self, storage: &mut S) -> Result<IncidentId, AllocationError>
    where
        S: CounterStorage + ?Sized,
    {
        if storage.counter_for_update().is_none() {
            self.recreate_counter(storage);
        }

        let max_existing = storage.max_incident_id();
        let counter = storage
            .counter_for_update()
            .ok_or(AllocationError::CounterUnavailable)?;

        if let Some(max) = max_existing {
            if counter.next_id <= max {
                let healed = max.checked_add(1).ok_or(AllocationError::Exhausted(max))?;
                warn!(
                    stale = counter.next_id,
                    healed, "ID counter behind highest incident, moving it forward"
                );
                counter.next_id = healed;
            }
        }

        let id = counter.next_id;
        counter.next_id = id.checked_add(1).ok_or(AllocationError::Exhausted(id))?;

        debug!(id, "Allocated incident ID");
        Ok(IncidentId::new(id))
    }

    /// Value a freshly created counter starts at.
    pub fn initial_value(&self, max_existing: Option<u64>) -> u64 {
        max_existing
            .and_then(|max| max.checked_add(1))
            .map_or(self.floor, |next| next.max(self.floor))
    }

    fn recreate_counter<S>(&self, storage: &mut S)
    where
        S: CounterStorage + ?Sized,
    {
        let next_id = self.initial_value(storage.max_incident_id());
        if storage.get_or_create_counter(next_id) {
            info!(next_id, "ID counter missing, recreated from stored incidents");
        } else {
            debug!("ID counter created concurrently, using existing row");
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FLOOR)
    }
}
