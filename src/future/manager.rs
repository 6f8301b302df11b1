//! Owner-keyed bookkeeping of future tables
//!
//! # C++ Reference
//! - `app/src/future_manager.h` - FutureManager
//! - `app/src/future_manager.cc` - AllocFutureApi, ReleaseFutureApi, MoveFutureApi

use super::table::FutureTable;
use crate::cleanup::ObjectId;
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Map from owner identity to that owner's [`FutureTable`]
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct FutureManager {
    apis: Arc<Mutex<HashMap<ObjectId, FutureTable>>>,
}

impl FutureManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a table of `api_count` functions for `owner`
    ///
    /// An owner that already had a table gets a fresh one; the old table is
    /// released.
    pub fn alloc_api(&self, owner: ObjectId, api_count: usize) -> FutureTable {
        let table = FutureTable::new(api_count);
        let previous = lock(&self.apis).insert(owner, table.clone());
        if let Some(previous) = previous {
            tracing::warn!(owner = %owner, "future api allocated twice; releasing the previous table");
            previous.release();
        }
        tracing::debug!(owner = %owner, api_count, "future api allocated");
        table
    }

    /// Release `owner`'s table. Returns false if it had none.
    pub fn release_api(&self, owner: ObjectId) -> bool {
        let removed = lock(&self.apis).remove(&owner);
        match removed {
            Some(table) => {
                table.release();
                tracing::debug!(owner = %owner, "future api released");
                true
            }
            None => false,
        }
    }

    /// Re-key `from`'s table under `to`
    ///
    /// Any table `to` already had is released. Returns false if `from` had
    /// no table.
    pub fn move_api(&self, from: ObjectId, to: ObjectId) -> bool {
        let displaced = {
            let mut apis = lock(&self.apis);
            let Some(table) = apis.remove(&from) else {
                return false;
            };
            apis.insert(to, table)
        };
        if let Some(displaced) = displaced {
            displaced.release();
        }
        tracing::debug!(from = %from, to = %to, "future api moved");
        true
    }

    /// `owner`'s table, if allocated
    pub fn get_api(&self, owner: ObjectId) -> Option<FutureTable> {
        lock(&self.apis).get(&owner).cloned()
    }

    /// Number of owners with a table
    pub fn len(&self) -> usize {
        lock(&self.apis).len()
    }

    /// True if no owner has a table
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ERROR_NONE;
    use crate::future::FutureStatus;

    #[test]
    fn test_alloc_and_get() {
        let manager = FutureManager::new();
        let owner = ObjectId::next();
        assert!(manager.get_api(owner).is_none());

        let table = manager.alloc_api(owner, 4);
        assert_eq!(table.api_count(), 4);
        assert_eq!(manager.get_api(owner).map(|t| t.api_count()), Some(4));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_release_invalidates_pending_futures() {
        let manager = FutureManager::new();
        let owner = ObjectId::next();
        let table = manager.alloc_api(owner, 1);
        let future = table.future(table.safe_alloc::<i32>(0));

        assert!(manager.release_api(owner));
        assert!(!manager.release_api(owner));
        assert!(manager.is_empty());
        assert!(table.is_released());
        assert_eq!(future.status(), FutureStatus::Invalid);
    }

    #[test]
    fn test_realloc_releases_previous() {
        let manager = FutureManager::new();
        let owner = ObjectId::next();
        let first = manager.alloc_api(owner, 1);
        let second = manager.alloc_api(owner, 1);

        assert!(first.is_released());
        assert!(!second.is_released());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_move_api_keeps_slots() {
        let manager = FutureManager::new();
        let from = ObjectId::next();
        let to = ObjectId::next();
        let table = manager.alloc_api(from, 2);
        let handle = table.safe_alloc::<i32>(1);

        assert!(manager.move_api(from, to));
        assert!(manager.get_api(from).is_none());
        assert!(!manager.move_api(from, to));

        let moved = manager.get_api(to).expect("table should be re-keyed");
        assert!(moved.complete_with_result(handle, ERROR_NONE, "", 6));
        assert_eq!(moved.last_result::<i32>(1).result(), Some(6));
        assert!(!table.is_released());
    }

    #[test]
    fn test_move_api_releases_displaced() {
        let manager = FutureManager::new();
        let from = ObjectId::next();
        let to = ObjectId::next();
        manager.alloc_api(from, 1);
        let displaced = manager.alloc_api(to, 1);

        assert!(manager.move_api(from, to));
        assert!(displaced.is_released());
        assert_eq!(manager.len(), 1);
    }
}
