//! Per-owner source of promises, one slot group per async method
//!
//! # C++ Reference
//! - `firestore/src/common/promise_factory.h` - PromiseFactory<EnumT>

use super::promise::Promise;
use crate::cleanup::{CleanupRegistry, ObjectId, WeakCleanupRegistry};
use crate::future::{Future, FutureManager, FutureTable};
use std::fmt;
use std::marker::PhantomData;

/// Enumeration of an owner's async methods
///
/// `COUNT` plays the role of the C++ `kCount` sentinel and sizes the table.
///
/// # Example
/// ```
/// use firebase_sdk_core::promise::ApiId;
///
/// #[derive(Debug, Clone, Copy)]
/// enum StorageFn {
///     GetMetadata,
///     Delete,
/// }
///
/// impl ApiId for StorageFn {
///     const COUNT: usize = 2;
///
///     fn index(self) -> usize {
///         self as usize
///     }
/// }
/// ```
pub trait ApiId: Copy + fmt::Debug {
    /// Number of async methods
    const COUNT: usize;

    /// Position of this method in `0..COUNT`
    fn index(self) -> usize;
}

/// An object that owns promises: it exposes its cleanup registry and the
/// future manager its tables live in
pub trait PromiseOwner {
    /// Registry torn down with the owner
    fn cleanup(&self) -> &CleanupRegistry;

    /// Manager holding the owner's future tables
    fn future_manager(&self) -> &FutureManager;
}

/// Creates promises for the async methods enumerated by `A`
pub struct PromiseFactory<A: ApiId> {
    owner: ObjectId,
    cleanup: WeakCleanupRegistry,
    manager: FutureManager,
    table: FutureTable,
    _api: PhantomData<fn() -> A>,
}

impl<A: ApiId> PromiseFactory<A> {
    /// Allocate a table of `A::COUNT` slots under a fresh owner key
    ///
    /// The table is released when `cleanup` is drained, so tearing down the
    /// owner invalidates every pending future even while the factory lives.
    pub fn new(cleanup: &CleanupRegistry, manager: &FutureManager) -> Self {
        Self::allocate(cleanup.downgrade(), manager.clone())
    }

    fn allocate(cleanup: WeakCleanupRegistry, manager: FutureManager) -> Self {
        let owner = ObjectId::next();
        let table = manager.alloc_api(owner, A::COUNT);
        if let Some(registry) = cleanup.upgrade() {
            let releaser = manager.clone();
            registry.register_object(owner, move || {
                releaser.release_api(owner);
            });
        }
        Self {
            owner,
            cleanup,
            manager,
            table,
            _api: PhantomData,
        }
    }

    /// Factory wired to `owner`'s registry and future manager
    pub fn create<O: PromiseOwner + ?Sized>(owner: &O) -> Self {
        Self::new(owner.cleanup(), owner.future_manager())
    }

    /// Fresh promise bound to a new slot for `api`
    ///
    /// The slot becomes `api`'s last result. After the owner's registry is
    /// gone the promise is unbound and completes nothing.
    pub fn create_promise<T: Send + 'static>(&self, api: A) -> Promise<T> {
        let handle = self.table.safe_alloc::<T>(api.index());
        match self.cleanup.upgrade() {
            Some(cleanup) => Promise::new(&cleanup, &self.table, handle),
            None => {
                tracing::trace!(api = ?api, "promise requested after owner teardown");
                Promise::unbound()
            }
        }
    }

    /// Latest future created for `api`, or an invalid future
    pub fn last_result<T: Send + 'static>(&self, api: A) -> Future<T> {
        self.table.last_result(api.index())
    }

    /// The table backing this factory
    pub fn future_table(&self) -> &FutureTable {
        &self.table
    }

    /// Key under which the table is registered with the manager
    pub fn owner_key(&self) -> ObjectId {
        self.owner
    }
}

impl<A: ApiId> Clone for PromiseFactory<A> {
    /// Allocates a new slot block; the copy never aliases this factory's slots
    fn clone(&self) -> Self {
        Self::allocate(self.cleanup.clone(), self.manager.clone())
    }
}

impl<A: ApiId> Drop for PromiseFactory<A> {
    fn drop(&mut self) {
        self.cleanup.unregister_object(self.owner);
        // A key moved away through the manager now belongs to its new owner
        self.manager.release_api(self.owner);
    }
}

impl<A: ApiId> fmt::Debug for PromiseFactory<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseFactory")
            .field("owner", &self.owner)
            .field("table", &self.table)
            .finish()
    }
}
