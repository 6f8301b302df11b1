//! Forced teardown of dependent objects
//!
//! # C++ Reference
//! - `app/src/cleanup_notifier.h` - CleanupNotifier
//! - `app/src/cleanup_notifier.cc` - CleanupAll, FindByOwner
//!
//! Long-lived owners (`App`, `Firestore`, `Storage`) hand out lightweight
//! wrappers around internal objects. When an owner goes away first, every
//! wrapper still alive must drop its internal object so that later calls
//! become no-ops instead of touching freed state. A [`CleanupRegistry`] is
//! the owner's list of such wrappers and their teardown callbacks.
//!
//! Objects are identified by [`ObjectId`] rather than by address, because
//! Rust values move freely.

use crate::sync::lock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Process-unique identity of an owner or dependent object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type CleanupFn = Box<dyn FnOnce() + Send>;
type OwnerMap = Mutex<HashMap<ObjectId, WeakCleanupRegistry>>;

/// Per-owner registry of teardown callbacks
///
/// Cloning yields another handle to the same registry. When the last handle
/// is dropped the registry runs [`cleanup_all`](Self::cleanup_all) itself.
///
/// # Example
/// ```
/// use firebase_sdk_core::cleanup::{CleanupRegistry, ObjectId};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let registry = CleanupRegistry::new();
/// let cleaned = Arc::new(AtomicBool::new(false));
/// let flag = cleaned.clone();
/// registry.register_object(ObjectId::next(), move || flag.store(true, Ordering::SeqCst));
///
/// registry.cleanup_all();
/// assert!(cleaned.load(Ordering::SeqCst));
/// ```
#[derive(Clone)]
pub struct CleanupRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning reference to a [`CleanupRegistry`]
///
/// Dependents hold this so they never keep their owner's registry alive.
#[derive(Clone, Default)]
pub struct WeakCleanupRegistry {
    inner: Weak<RegistryInner>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    owner: Option<OwnerLink>,
}

#[derive(Default)]
struct RegistryState {
    callbacks: HashMap<ObjectId, CleanupFn>,
    cleaned_up: bool,
}

/// Back-reference used to drop the owner lookup entry with the registry
struct OwnerLink {
    owner: ObjectId,
    owners: Weak<OwnerMap>,
}

impl CleanupRegistry {
    /// Create a registry not tied to any owner lookup
    pub fn new() -> Self {
        Self::with_owner_link(None)
    }

    fn with_owner_link(owner: Option<OwnerLink>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                owner,
            }),
        }
    }

    /// Register `object` for forced teardown. Re-registering overwrites the
    /// previous callback.
    pub fn register_object<F>(&self, object: ObjectId, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let replaced = lock(&self.inner.state)
            .callbacks
            .insert(object, Box::new(cleanup));
        if replaced.is_some() {
            tracing::trace!(object = %object, "cleanup callback overwritten");
        }
    }

    /// Forget `object`. A no-op when it was never registered.
    pub fn unregister_object(&self, object: ObjectId) {
        let removed = lock(&self.inner.state).callbacks.remove(&object);
        // Drop the callback after the lock is released; it may own arbitrary state.
        drop(removed);
    }

    /// Run every remaining callback exactly once, then mark the registry clean
    ///
    /// Each entry is removed before its callback runs and the lock is not held
    /// during the call, so callbacks may unregister themselves or other
    /// objects. Returns the number of callbacks run.
    pub fn cleanup_all(&self) -> usize {
        self.inner.cleanup_all()
    }

    /// Number of objects still registered
    pub fn len(&self) -> usize {
        lock(&self.inner.state).callbacks.len()
    }

    /// True if no objects are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `object` is still registered
    pub fn contains(&self, object: ObjectId) -> bool {
        lock(&self.inner.state).callbacks.contains_key(&object)
    }

    /// True once `cleanup_all` has run at least once
    pub fn is_cleaned_up(&self) -> bool {
        lock(&self.inner.state).cleaned_up
    }

    /// Non-owning reference to this registry
    pub fn downgrade(&self) -> WeakCleanupRegistry {
        WeakCleanupRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True if both handles refer to the same registry
    pub fn ptr_eq(&self, other: &CleanupRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("CleanupRegistry")
            .field("registered", &state.callbacks.len())
            .field("cleaned_up", &state.cleaned_up)
            .finish()
    }
}

impl WeakCleanupRegistry {
    /// Upgrade to a strong handle if the registry is still alive
    pub fn upgrade(&self) -> Option<CleanupRegistry> {
        self.inner.upgrade().map(|inner| CleanupRegistry { inner })
    }

    /// Unregister `object` if the registry is still alive
    pub fn unregister_object(&self, object: ObjectId) {
        if let Some(registry) = self.upgrade() {
            registry.unregister_object(object);
        }
    }

    fn is_dead(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl RegistryInner {
    fn cleanup_all(&self) -> usize {
        let mut invoked = 0;
        loop {
            // Callbacks registered while a batch runs are picked up next round
            let batch: Vec<ObjectId> = lock(&self.state).callbacks.keys().copied().collect();
            if batch.is_empty() {
                break;
            }
            for object in batch {
                let callback = lock(&self.state).callbacks.remove(&object);
                // Unregistered by an earlier callback in this batch
                let Some(callback) = callback else {
                    continue;
                };
                tracing::trace!(object = %object, "running cleanup callback");
                callback();
                invoked += 1;
            }
        }
        lock(&self.state).cleaned_up = true;
        if invoked > 0 {
            tracing::debug!(invoked, "cleanup registry drained");
        }
        invoked
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.cleanup_all();

        let Some(link) = &self.owner else {
            return;
        };
        let Some(owners) = link.owners.upgrade() else {
            return;
        };
        let mut owners = lock(&owners);
        // A newer registry may already have taken this owner's slot
        if owners.get(&link.owner).is_some_and(WeakCleanupRegistry::is_dead) {
            owners.remove(&link.owner);
        }
    }
}

/// Lookup from an owner identity to that owner's [`CleanupRegistry`]
///
/// This is an explicit context object rather than a global: whoever creates
/// owners threads one `OwnerRegistry` through. Registries are held weakly;
/// an entry disappears when its registry is destroyed.
#[derive(Clone, Default)]
pub struct OwnerRegistry {
    owners: Arc<OwnerMap>,
}

impl OwnerRegistry {
    /// Create an empty lookup
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for `owner`, created on first use
    pub fn find_or_create(&self, owner: ObjectId) -> CleanupRegistry {
        let mut owners = lock(&self.owners);
        if let Some(registry) = owners.get(&owner).and_then(WeakCleanupRegistry::upgrade) {
            return registry;
        }

        let registry = CleanupRegistry::with_owner_link(Some(OwnerLink {
            owner,
            owners: Arc::downgrade(&self.owners),
        }));
        owners.insert(owner, registry.downgrade());
        tracing::debug!(owner = %owner, "cleanup registry created");
        registry
    }

    /// Registry for `owner`, if one is alive
    pub fn find(&self, owner: ObjectId) -> Option<CleanupRegistry> {
        lock(&self.owners)
            .get(&owner)
            .and_then(WeakCleanupRegistry::upgrade)
    }

    /// Remove the lookup entry for `owner`. The registry itself is untouched.
    pub fn unregister_owner(&self, owner: ObjectId) -> bool {
        lock(&self.owners).remove(&owner).is_some()
    }

    /// Number of owners with a lookup entry
    pub fn len(&self) -> usize {
        lock(&self.owners).len()
    }

    /// True if no owner has an entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
