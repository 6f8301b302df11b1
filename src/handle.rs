//! Owning handles for heap objects and externally reference-counted objects
//!
//! # C++ Reference
//! - `app/memory/unique_ptr.h` - UniquePtr
//! - `app/src/util_ios.h` - ObjCPointer
//!
//! [`OwningHandle`] holds at most one raw reference to a `T`. What "dropping
//! the reference" means is decided at compile time by the [`Disposer`]:
//! - [`Heap`]: the handle owns a `Box` allocation and frees it.
//! - [`Platform`]: the handle owns one count on an object whose memory is
//!   managed by a foreign runtime. Dropping the handle gives the count back;
//!   the runtime frees the object once no counts remain.
//!
//! Both flavors expose the same operations, so code written against
//! `OwningHandle<T, D>` does not care which platform it runs on.
//!
//! Unlike the C++ `UniquePtr`, copying never silently moves: a
//! [`UniquePtr`] is move-only and [`OwningHandle::take`] is the explicit
//! transfer. A [`PlatformPtr`] clones by retaining another count.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// How an [`OwningHandle`] gives up its reference
pub trait Disposer<T: ?Sized> {
    /// Drop the reference held through `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a reference owned by the calling handle, and must not be
    /// used by that handle again.
    unsafe fn dispose(ptr: NonNull<T>);
}

/// Disposal policy for `Box`-allocated objects
#[derive(Debug)]
pub enum Heap {}

impl<T: ?Sized> Disposer<T> for Heap {
    unsafe fn dispose(ptr: NonNull<T>) {
        // SAFETY: heap handles only ever adopt pointers produced by `Box::into_raw`.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// An object whose lifetime is governed by an external reference count
///
/// # Safety
///
/// `retain` and `release` must be callable on any live `&Self`, must be
/// thread-safe, and the object must stay alive while any retained count is
/// outstanding.
pub unsafe trait RefCounted {
    /// Add one reference.
    ///
    /// # Safety
    ///
    /// `this` must point to a live object.
    unsafe fn retain(this: NonNull<Self>);

    /// Drop one reference, freeing the object when the count reaches zero.
    ///
    /// # Safety
    ///
    /// `this` must carry a reference previously added with `retain` (or
    /// adopted at creation) that the caller is giving up.
    unsafe fn release(this: NonNull<Self>);
}

/// Disposal policy for [`RefCounted`] platform objects
#[derive(Debug)]
pub enum Platform {}

impl<T: ?Sized + RefCounted> Disposer<T> for Platform {
    unsafe fn dispose(ptr: NonNull<T>) {
        // SAFETY: forwarded contract, the handle owned exactly one count.
        unsafe { T::release(ptr) }
    }
}

/// Exclusive owner of one raw reference
pub struct OwningHandle<T: ?Sized, D: Disposer<T> = Heap> {
    ptr: Option<NonNull<T>>,
    _owns: PhantomData<T>,
    _disposer: PhantomData<fn() -> D>,
}

/// Owner of a heap allocation
pub type UniquePtr<T> = OwningHandle<T, Heap>;

/// Owner of one count on an externally reference-counted object
///
/// Other handles may hold counts on the same object, so a `PlatformPtr` only
/// ever hands out shared references:
///
/// ```compile_fail
/// use firebase_sdk_core::handle::{PlatformPtr, RefCounted};
///
/// fn overwrite<T: RefCounted + Default>(mut handle: PlatformPtr<T>) {
///     *handle = T::default();
/// }
/// ```
///
/// and it crosses threads only when the object is both `Send` and `Sync`:
///
/// ```compile_fail
/// use firebase_sdk_core::handle::{PlatformPtr, RefCounted};
/// use std::cell::Cell;
/// use std::ptr::NonNull;
///
/// struct Counter(Cell<u32>);
///
/// unsafe impl RefCounted for Counter {
///     unsafe fn retain(_: NonNull<Self>) {}
///     unsafe fn release(_: NonNull<Self>) {}
/// }
///
/// fn assert_send<S: Send>() {}
/// assert_send::<PlatformPtr<Counter>>();
/// ```
pub type PlatformPtr<T> = OwningHandle<T, Platform>;

// SAFETY: a heap handle behaves like `Box<T>`: it is the only owner of its target.
unsafe impl<T: ?Sized + Send> Send for OwningHandle<T, Heap> {}
// SAFETY: shared access only hands out `&T`.
unsafe impl<T: ?Sized + Sync> Sync for OwningHandle<T, Heap> {}
// SAFETY: platform handles share their target like `Arc<T>` does.
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Send for OwningHandle<T, Platform> {}
// SAFETY: as above.
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Sync for OwningHandle<T, Platform> {}

impl<T: ?Sized, D: Disposer<T>> OwningHandle<T, D> {
    /// An empty, non-owning handle
    pub fn empty() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
            _disposer: PhantomData,
        }
    }

    /// Adopt `raw`. A null pointer produces an empty handle.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a reference that `D` knows how to dispose of,
    /// and no other owner may dispose of it.
    pub unsafe fn from_raw(raw: *mut T) -> Self {
        Self {
            ptr: NonNull::new(raw),
            _owns: PhantomData,
            _disposer: PhantomData,
        }
    }

    /// Observe the raw reference without transferring ownership
    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Borrow the target, if any
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: an owned pointer stays valid until disposed by this handle.
        self.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Give up ownership without disposing. The handle becomes empty.
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Dispose of the current reference (if any) and adopt `raw`
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw).
    pub unsafe fn reset(&mut self, raw: *mut T) {
        let old = std::mem::replace(&mut self.ptr, NonNull::new(raw));
        if let Some(old) = old {
            // SAFETY: `old` was owned by this handle and is no longer reachable from it.
            unsafe { D::dispose(old) };
        }
    }

    /// Dispose of the current reference and become empty
    pub fn clear(&mut self) {
        if let Some(old) = self.ptr.take() {
            // SAFETY: `old` was owned by this handle and is no longer reachable from it.
            unsafe { D::dispose(old) };
        }
    }

    /// Move ownership into a new handle, leaving this one empty
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            _owns: PhantomData,
            _disposer: PhantomData,
        }
    }

    /// True iff the handle owns a reference
    pub fn is_valid(&self) -> bool {
        self.ptr.is_some()
    }

    /// True iff the handle is empty
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }
}

impl<T> UniquePtr<T> {
    /// Allocate `value` on the heap and own it
    pub fn new(value: T) -> Self {
        Self::from(Box::new(value))
    }
}

impl<T: ?Sized> UniquePtr<T> {
    /// Mutably borrow the target, if any
    pub fn as_mut(&mut self) -> Option<&mut T> {
        // SAFETY: a heap handle is the only owner, so exclusive access to the
        // handle means exclusive access to the target.
        self.ptr.map(|mut ptr| unsafe { ptr.as_mut() })
    }

    /// Take the allocation back as a `Box`
    pub fn into_box(mut self) -> Option<Box<T>> {
        // SAFETY: heap handles only hold pointers produced by `Box::into_raw`.
        self.release().map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }

    /// Converting move, e.g. `handle.convert(|b| b as Box<dyn Trait>)`
    pub fn convert<U: ?Sized>(self, cast: impl FnOnce(Box<T>) -> Box<U>) -> UniquePtr<U> {
        match self.into_box() {
            Some(boxed) => UniquePtr::from(cast(boxed)),
            None => UniquePtr::empty(),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for UniquePtr<T> {
    fn from(boxed: Box<T>) -> Self {
        // SAFETY: the pointer comes straight from `Box::into_raw`.
        unsafe { Self::from_raw(Box::into_raw(boxed)) }
    }
}

impl<T: ?Sized + RefCounted> PlatformPtr<T> {
    /// Add a reference to `object` and own it
    pub fn retain(object: &T) -> Self {
        let ptr = NonNull::from(object);
        // SAFETY: `object` is live for the duration of this call.
        unsafe { T::retain(ptr) };
        Self {
            ptr: Some(ptr),
            _owns: PhantomData,
            _disposer: PhantomData,
        }
    }
}

impl<T: ?Sized + RefCounted> Clone for PlatformPtr<T> {
    fn clone(&self) -> Self {
        match self.as_ref() {
            Some(object) => Self::retain(object),
            None => Self::empty(),
        }
    }
}

impl<T: ?Sized, D: Disposer<T>> Drop for OwningHandle<T, D> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized, D: Disposer<T>> Default for OwningHandle<T, D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized, D: Disposer<T>> Deref for OwningHandle<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(target) => target,
            None => panic!("dereferenced an empty OwningHandle"),
        }
    }
}

impl<T: ?Sized> DerefMut for UniquePtr<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.as_mut() {
            Some(target) => target,
            None => panic!("dereferenced an empty OwningHandle"),
        }
    }
}

impl<T: ?Sized + fmt::Debug, D: Disposer<T>> fmt::Debug for OwningHandle<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_ref() {
            Some(target) => f.debug_tuple("OwningHandle").field(&target).finish(),
            None => f.write_str("OwningHandle(empty)"),
        }
    }
}
