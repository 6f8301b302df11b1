//! Value-type wrappers that die with their owner
//!
//! # C++ Reference
//! - `firestore/src/common/cleanup.h` - CleanupFn<T>
//! - `storage/src/include/firebase/storage/storage_reference.h` - internal_ lifetime
//!
//! Public types such as `DocumentReference` or `StorageReference` are thin
//! shells around an internal object. [`Dependent`] is that shell: it owns the
//! internal object through a [`UniquePtr`] and registers with the owner's
//! [`CleanupRegistry`], so tearing down the owner clears every dependent
//! still alive. Afterwards the dependent reports `is_valid() == false` and
//! accessors return `None`.

use crate::cleanup::{CleanupRegistry, ObjectId, WeakCleanupRegistry};
use crate::handle::UniquePtr;
use crate::sync::lock;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Wrapper around an internal object owned by someone else's lifetime
pub struct Dependent<T: Send + 'static> {
    id: ObjectId,
    internal: Arc<Mutex<UniquePtr<T>>>,
    registry: WeakCleanupRegistry,
}

impl<T: Send + 'static> Dependent<T> {
    /// Wrap `internal` and register it with `registry`
    pub fn new(registry: &CleanupRegistry, internal: T) -> Self {
        let dependent = Self {
            id: ObjectId::next(),
            internal: Arc::new(Mutex::new(UniquePtr::new(internal))),
            registry: registry.downgrade(),
        };

        let weak_internal = Arc::downgrade(&dependent.internal);
        registry.register_object(dependent.id, move || {
            if let Some(internal) = weak_internal.upgrade() {
                // Take the object out so its destructor runs outside our lock
                let taken = lock(&internal).take();
                drop(taken);
            }
        });
        dependent
    }

    /// A dependent with no internal object, registered nowhere
    pub fn invalid() -> Self {
        Self {
            id: ObjectId::next(),
            internal: Arc::new(Mutex::new(UniquePtr::empty())),
            registry: WeakCleanupRegistry::default(),
        }
    }

    /// Identity under which this dependent is registered
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// False once the owner has been torn down
    pub fn is_valid(&self) -> bool {
        lock(&self.internal).is_valid()
    }

    /// Run `f` against the internal object, if it is still alive
    pub fn with_internal<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        lock(&self.internal).as_ref().map(f)
    }

    /// Run `f` against the internal object mutably, if it is still alive
    pub fn with_internal_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        lock(&self.internal).as_mut().map(f)
    }
}

impl<T: Clone + Send + 'static> Clone for Dependent<T> {
    /// Copies the internal object into a newly registered dependent. Copying
    /// an invalidated dependent yields an invalid one.
    fn clone(&self) -> Self {
        let copy = self.with_internal(T::clone);
        match (copy, self.registry.upgrade()) {
            (Some(internal), Some(registry)) => Self::new(&registry, internal),
            _ => Self::invalid(),
        }
    }
}

impl<T: Send + 'static> Drop for Dependent<T> {
    fn drop(&mut self) {
        self.registry.unregister_object(self.id);
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for Dependent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependent")
            .field("id", &self.id)
            .field("internal", &*lock(&self.internal))
            .finish()
    }
}
