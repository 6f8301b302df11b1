//! Producer side of one asynchronous result
//!
//! # C++ Reference
//! - `firestore/src/common/promise.h` - Promise<T>
//!
//! A [`Promise`] is bound to one slot of its owner's [`FutureTable`] and is
//! registered with the owner's [`CleanupRegistry`]. If the owner is torn down
//! before the platform SDK calls back, the cleanup callback unbinds the
//! promise and later `set_value`/`set_error` calls quietly do nothing.

use crate::cleanup::{CleanupRegistry, ObjectId, WeakCleanupRegistry};
use crate::error::{Status, ERROR_NONE};
use crate::future::{Future, FutureTable, SafeFutureHandle, WeakFutureTable};
use crate::sync::lock;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Single-slot completion handle, safe to complete from any thread
pub struct Promise<T: Send + 'static> {
    inner: Arc<PromiseInner<T>>,
}

struct PromiseInner<T> {
    id: ObjectId,
    binding: Mutex<Option<Binding<T>>>,
    cleanup: WeakCleanupRegistry,
}

struct Binding<T> {
    table: WeakFutureTable,
    handle: SafeFutureHandle<T>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            handle: self.handle,
        }
    }
}

impl<T: Send + 'static> Promise<T> {
    pub(crate) fn new(cleanup: &CleanupRegistry, table: &FutureTable, handle: SafeFutureHandle<T>) -> Self {
        let binding = Binding {
            table: table.downgrade(),
            handle,
        };
        Self::register(cleanup, Some(binding))
    }

    /// A promise that completes nothing; used once the owner is gone
    pub(crate) fn unbound() -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                id: ObjectId::next(),
                binding: Mutex::new(None),
                cleanup: WeakCleanupRegistry::default(),
            }),
        }
    }

    fn register(cleanup: &CleanupRegistry, binding: Option<Binding<T>>) -> Self {
        let inner = Arc::new(PromiseInner {
            id: ObjectId::next(),
            binding: Mutex::new(binding),
            cleanup: cleanup.downgrade(),
        });

        let weak = Arc::downgrade(&inner);
        cleanup.register_object(inner.id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate();
            }
        });
        Self { inner }
    }

    /// Complete the bound future successfully with `value`
    ///
    /// Only the first completion of the slot counts. After the owner was torn
    /// down this is a no-op.
    pub fn set_value(&self, value: T) {
        self.complete(|table, handle| {
            table.complete_with_result(handle, ERROR_NONE, "", value);
        });
    }

    /// Complete the bound future with a failure
    ///
    /// # Panics
    ///
    /// If `status` is ok; successful completions go through
    /// [`set_value`](Self::set_value).
    pub fn set_error(&self, status: impl Into<Status>) {
        let status = status.into();
        assert!(
            !status.is_ok(),
            "Promise::set_error requires a failed status; use set_value for success"
        );
        self.complete(|table, handle| {
            table.complete(handle, status.code(), status.message());
        });
    }

    /// Consumer view of the bound slot
    ///
    /// Every call returns an equivalent future. Once the promise has been
    /// invalidated the future is [`Future::invalid`].
    pub fn future(&self) -> Future<T> {
        match self.bound_table() {
            Some((table, handle)) => table.future(handle),
            None => Future::invalid(),
        }
    }

    /// False once the owner's teardown unbound this promise
    pub fn is_valid(&self) -> bool {
        lock(&self.inner.binding).is_some()
    }

    fn bound_table(&self) -> Option<(FutureTable, SafeFutureHandle<T>)> {
        // The lock is released before the table is touched
        let binding = lock(&self.inner.binding).clone()?;
        binding.table.upgrade().map(|table| (table, binding.handle))
    }

    fn complete(&self, f: impl FnOnce(&FutureTable, SafeFutureHandle<T>)) {
        match self.bound_table() {
            Some((table, handle)) => f(&table, handle),
            None => tracing::trace!(promise = %self.inner.id, "completion after owner teardown; ignored"),
        }
    }
}

impl<T> PromiseInner<T> {
    fn invalidate(&self) {
        let binding = lock(&self.binding).take();
        if binding.is_some() {
            tracing::trace!(promise = %self.id, "promise invalidated by owner teardown");
        }
    }
}

impl<T> Drop for PromiseInner<T> {
    fn drop(&mut self) {
        self.cleanup.unregister_object(self.id);
    }
}

impl<T: Send + 'static> Clone for Promise<T> {
    /// Duplicates the binding under its own cleanup registration; both
    /// copies complete the same slot.
    fn clone(&self) -> Self {
        let binding = lock(&self.inner.binding).clone();
        match (binding, self.inner.cleanup.upgrade()) {
            (Some(binding), Some(cleanup)) => Self::register(&cleanup, Some(binding)),
            _ => Self::unbound(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.inner.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FirestoreError, FutureError};
    use crate::future::FutureStatus;

    fn promise<T: Send + 'static>(cleanup: &CleanupRegistry, table: &FutureTable) -> Promise<T> {
        Promise::new(cleanup, table, table.safe_alloc::<T>(0))
    }

    #[test]
    fn test_set_value_completes_future() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<i32>(&cleanup, &table);
        let future = promise.future();
        assert_eq!(future.status(), FutureStatus::Pending);

        promise.set_value(42);
        assert_eq!(future.result(), Some(42));
        assert_eq!(promise.future().result(), Some(42));
    }

    #[test]
    fn test_unit_promise() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<()>(&cleanup, &table);
        promise.set_value(());
        assert_eq!(promise.future().result(), Some(()));
    }

    #[test]
    fn test_set_error_completes_with_code() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<String>(&cleanup, &table);

        promise.set_error(FirestoreError::NotFound);
        let future = promise.future();
        assert_eq!(future.error(), 5);
        assert_eq!(future.error_message().as_deref(), Some("Document not found"));
        assert_eq!(future.result(), None);
    }

    #[test]
    #[should_panic(expected = "requires a failed status")]
    fn test_set_error_with_ok_panics() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        promise::<i32>(&cleanup, &table).set_error(Status::ok());
    }

    #[test]
    fn test_first_completion_wins() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<i32>(&cleanup, &table);
        let future = promise.future();

        promise.set_value(1);
        promise.set_value(2);
        promise.set_error(Status::new(13, "internal"));

        assert_eq!(future.result(), Some(1));
        assert_eq!(future.error(), ERROR_NONE);
    }

    #[test]
    fn test_teardown_makes_completion_noop() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<i32>(&cleanup, &table);
        let future = promise.future();

        cleanup.cleanup_all();
        assert!(!promise.is_valid());
        promise.set_value(3);
        promise.set_error(Status::new(2, "late"));

        assert_eq!(future.status(), FutureStatus::Pending);
        assert_eq!(promise.future().status(), FutureStatus::Invalid);
    }

    #[test]
    fn test_completion_after_registry_dropped() {
        let table = FutureTable::new(1);
        let promise = {
            let cleanup = CleanupRegistry::new();
            promise::<i32>(&cleanup, &table)
        };
        assert!(!promise.is_valid());
        promise.set_value(1);
    }

    #[test]
    fn test_completion_after_table_dropped() {
        let cleanup = CleanupRegistry::new();
        let promise = {
            let table = FutureTable::new(1);
            promise::<i32>(&cleanup, &table)
        };
        // Still registered, but the slot table is gone
        assert!(promise.is_valid());
        promise.set_value(1);
        assert_eq!(promise.future().status(), FutureStatus::Invalid);
    }

    #[test]
    fn test_clone_shares_slot() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let original = promise::<i32>(&cleanup, &table);
        let copy = original.clone();
        assert_eq!(cleanup.len(), 2);

        copy.set_value(10);
        original.set_value(20);
        assert_eq!(original.future().result(), Some(10));
        assert_eq!(copy.future().result(), Some(10));
    }

    #[test]
    fn test_drop_unregisters() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<i32>(&cleanup, &table);
        let copy = promise.clone();
        assert_eq!(cleanup.len(), 2);

        drop(promise);
        assert_eq!(cleanup.len(), 1);
        drop(copy);
        assert!(cleanup.is_empty());
    }

    #[test]
    fn test_clone_after_teardown_is_unbound() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<i32>(&cleanup, &table);
        cleanup.cleanup_all();

        let copy = promise.clone();
        assert!(!copy.is_valid());
        assert!(cleanup.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_complete_from_background_thread() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<u64>(&cleanup, &table);
        let future = promise.future();

        std::thread::spawn(move || promise.set_value(99));
        assert_eq!(future.await, Ok(99));
    }

    #[tokio::test]
    async fn test_teardown_with_awaiting_consumer() {
        let cleanup = CleanupRegistry::new();
        let table = FutureTable::new(1);
        let promise = promise::<u64>(&cleanup, &table);
        let future = promise.future();

        cleanup.cleanup_all();
        table.release();
        promise.set_value(1);
        assert_eq!(future.await, Err(FutureError::Invalid));
    }
}
