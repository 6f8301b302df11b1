//! Reference-counted table of asynchronous result slots
//!
//! # C++ Reference
//! - `app/src/reference_counted_future_impl.h` - ReferenceCountedFutureImpl
//! - `app/src/reference_counted_future_impl.cc` - SafeAlloc, Complete, LastResult
//!
//! One [`FutureTable`] exists per owning object (a `Firestore`, a `Storage`,
//! ...). Each async method of the owner has an API id in `0..api_count`, and
//! the table remembers the most recent slot allocated for each id so that
//! "last result of method X" is a direct index.
//!
//! Slots are kept alive by counted [`FutureHandle`]s (held inside every
//! [`Future`]) and by the last-result entry. A [`SafeFutureHandle`] is not
//! counted: completing through it after the slot was freed is a no-op.
//!
//! All state sits behind one mutex per table. Result writers, wakers and
//! completion callbacks always run with the lock released.

use super::future::{Future, FutureHandle, FutureStatus};
use crate::error::ERROR_NONE;
use crate::sync::lock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::task::Waker;
use std::time::{Duration, Instant};

pub(crate) type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Uncounted, typed reference to one slot
///
/// # C++ Reference
/// - `app/src/reference_counted_future_impl.h` - SafeFutureHandle<T>
pub struct SafeFutureHandle<T> {
    id: u64,
    _result: PhantomData<fn() -> T>,
}

impl<T> SafeFutureHandle<T> {
    /// A handle that refers to no slot
    pub const INVALID: Self = Self {
        id: 0,
        _result: PhantomData,
    };

    fn new(id: u64) -> Self {
        Self {
            id,
            _result: PhantomData,
        }
    }

    /// Slot id within its table
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False for [`SafeFutureHandle::INVALID`]
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl<T> Clone for SafeFutureHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SafeFutureHandle<T> {}

impl<T> PartialEq for SafeFutureHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for SafeFutureHandle<T> {}

impl<T> fmt::Debug for SafeFutureHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SafeFutureHandle({})", self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Pending,
    /// A writer is filling in the result outside the lock
    Completing,
    Complete,
}

pub(crate) struct Slot {
    status: SlotStatus,
    error: i32,
    error_message: String,
    /// `Option<T>` for the `T` the slot was allocated with
    result: Box<dyn Any + Send>,
    refs: usize,
    wakers: Vec<Waker>,
    callbacks: Vec<CompletionCallback>,
}

impl Slot {
    fn new<T: Send + 'static>() -> Self {
        Self {
            status: SlotStatus::Pending,
            error: ERROR_NONE,
            error_message: String::new(),
            result: Box::new(None::<T>),
            refs: 0,
            wakers: Vec::new(),
            callbacks: Vec::new(),
        }
    }
}

struct TableState {
    slots: HashMap<u64, Slot>,
    last_results: Vec<Option<u64>>,
    next_id: u64,
    released: bool,
}

impl TableState {
    fn status_of(&self, id: u64) -> FutureStatus {
        match self.slots.get(&id) {
            None => FutureStatus::Invalid,
            Some(slot) if slot.status == SlotStatus::Complete => FutureStatus::Complete,
            Some(_) if self.released => FutureStatus::Invalid,
            Some(_) => FutureStatus::Pending,
        }
    }

    fn add_ref(&mut self, id: u64) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference; the freed slot is returned so the caller can drop
    /// it after releasing the lock.
    fn release_ref(&mut self, id: u64) -> Option<Slot> {
        let slot = self.slots.get_mut(&id)?;
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            self.slots.remove(&id)
        } else {
            None
        }
    }
}

pub(crate) struct TableInner {
    api_count: usize,
    state: Mutex<TableState>,
    completed: Condvar,
}

impl TableInner {
    pub(crate) fn add_ref(&self, id: u64) {
        lock(&self.state).add_ref(id);
    }

    pub(crate) fn release_ref(&self, id: u64) {
        let freed = lock(&self.state).release_ref(id);
        drop(freed);
    }

    pub(crate) fn status(&self, id: u64) -> FutureStatus {
        lock(&self.state).status_of(id)
    }

    pub(crate) fn error(&self, id: u64) -> i32 {
        let state = lock(&self.state);
        match state.slots.get(&id) {
            Some(slot) if slot.status == SlotStatus::Complete => slot.error,
            _ => ERROR_NONE,
        }
    }

    pub(crate) fn error_message(&self, id: u64) -> Option<String> {
        let state = lock(&self.state);
        match state.slots.get(&id) {
            Some(slot) if slot.status == SlotStatus::Complete => Some(slot.error_message.clone()),
            _ => None,
        }
    }

    /// Run `f` on the stored result. `f` runs under the table lock and must
    /// not call back into this table.
    pub(crate) fn with_result<T: 'static, R>(&self, id: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = lock(&self.state);
        let slot = state.slots.get(&id)?;
        if slot.status != SlotStatus::Complete {
            return None;
        }
        slot.result.downcast_ref::<Option<T>>()?.as_ref().map(f)
    }

    pub(crate) fn poll_status(&self, id: u64, waker: &Waker) -> FutureStatus {
        let mut state = lock(&self.state);
        let status = state.status_of(id);
        if status == FutureStatus::Pending {
            if let Some(slot) = state.slots.get_mut(&id) {
                if !slot.wakers.iter().any(|w| w.will_wake(waker)) {
                    slot.wakers.push(waker.clone());
                }
            }
        }
        status
    }

    /// Queue `callback` for completion, or hand it back if the slot is
    /// already settled so the caller can run it right away.
    pub(crate) fn add_callback(&self, id: u64, callback: CompletionCallback) -> Option<CompletionCallback> {
        let mut state = lock(&self.state);
        if state.status_of(id) != FutureStatus::Pending {
            return Some(callback);
        }
        match state.slots.get_mut(&id) {
            Some(slot) => {
                slot.callbacks.push(callback);
                None
            }
            None => Some(callback),
        }
    }

    pub(crate) fn wait(&self, id: u64, timeout: Option<Duration>) -> FutureStatus {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = lock(&self.state);
        loop {
            let status = state.status_of(id);
            if status != FutureStatus::Pending {
                return status;
            }
            state = match deadline {
                None => self
                    .completed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return status;
                    }
                    self.completed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// Puts a slot back to pending when its result writer panics
struct WriterGuard<'a, T: Send + 'static> {
    table: &'a TableInner,
    id: u64,
    armed: bool,
    _result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> WriterGuard<'_, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Send + 'static> Drop for WriterGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let discarded = {
            let mut state = lock(&self.table.state);
            state.slots.get_mut(&self.id).map(|slot| {
                slot.status = SlotStatus::Pending;
                let fresh: Box<dyn Any + Send> = Box::new(None::<T>);
                std::mem::replace(&mut slot.result, fresh)
            })
        };
        drop(discarded);
        tracing::error!(slot = self.id, "result writer panicked; slot is pending again");
    }
}

/// Per-owner table of future slots
///
/// Cloning yields another handle to the same table.
///
/// # Example
/// ```
/// use firebase_sdk_core::future::{FutureStatus, FutureTable};
///
/// let table = FutureTable::new(3);
/// let handle = table.safe_alloc::<i32>(1);
/// table.complete_with_result(handle, 0, "", 42);
///
/// let last = table.last_result::<i32>(1);
/// assert_eq!(last.status(), FutureStatus::Complete);
/// assert_eq!(last.result(), Some(42));
/// assert_eq!(table.last_result::<i32>(0).status(), FutureStatus::Invalid);
/// ```
#[derive(Clone)]
pub struct FutureTable {
    inner: Arc<TableInner>,
}

/// Non-owning reference to a [`FutureTable`]
#[derive(Clone, Default)]
pub(crate) struct WeakFutureTable {
    inner: Weak<TableInner>,
}

impl WeakFutureTable {
    pub(crate) fn upgrade(&self) -> Option<FutureTable> {
        self.inner.upgrade().map(|inner| FutureTable { inner })
    }
}

impl FutureTable {
    /// Create a table for an owner with `api_count` async methods
    pub fn new(api_count: usize) -> Self {
        Self {
            inner: Arc::new(TableInner {
                api_count,
                state: Mutex::new(TableState {
                    slots: HashMap::new(),
                    last_results: vec![None; api_count],
                    next_id: 1,
                    released: false,
                }),
                completed: Condvar::new(),
            }),
        }
    }

    /// Number of API ids this table was sized for
    pub fn api_count(&self) -> usize {
        self.inner.api_count
    }

    /// Allocate a pending slot for `api_id` and make it that API's last result
    ///
    /// # Panics
    ///
    /// If `api_id` is not below [`api_count`](Self::api_count).
    pub fn safe_alloc<T: Send + 'static>(&self, api_id: usize) -> SafeFutureHandle<T> {
        assert!(
            api_id < self.inner.api_count,
            "api id {} out of range for a table of {} functions",
            api_id,
            self.inner.api_count
        );

        let (id, evicted) = {
            let mut state = lock(&self.inner.state);
            let id = state.next_id;
            state.next_id += 1;

            let mut slot = Slot::new::<T>();
            // The last-result entry holds a reference
            slot.refs = 1;
            state.slots.insert(id, slot);

            let previous = state.last_results[api_id].replace(id);
            (id, previous.and_then(|previous| state.release_ref(previous)))
        };
        drop(evicted);

        tracing::trace!(api_id, slot = id, "future slot allocated");
        SafeFutureHandle::new(id)
    }

    /// Complete `handle` with an error code and message, without a result
    pub fn complete<T: Send + 'static>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        message: impl Into<String>,
    ) -> bool {
        self.complete_with(handle, error, message, |_: &mut Option<T>| {})
    }

    /// Complete `handle` and store `value` as its result
    pub fn complete_with_result<T: Send + 'static>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        message: impl Into<String>,
        value: T,
    ) -> bool {
        self.complete_with(handle, error, message, move |slot: &mut Option<T>| {
            *slot = Some(value)
        })
    }

    /// Complete `handle`, letting `writer` construct the result in place
    ///
    /// Only the first completion of a slot has any effect. Later attempts,
    /// completions of freed slots, and completions after the table was
    /// released return `false` and change nothing. `writer` runs without the
    /// table lock held.
    pub fn complete_with<T, F>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        message: impl Into<String>,
        writer: F,
    ) -> bool
    where
        T: Send + 'static,
        F: FnOnce(&mut Option<T>),
    {
        let message = message.into();
        let id = handle.id;

        let mut result = {
            let mut state = lock(&self.inner.state);
            if state.released {
                tracing::warn!(slot = id, "completion after the owner released its futures; ignored");
                return false;
            }
            let Some(slot) = state.slots.get_mut(&id) else {
                tracing::trace!(slot = id, "completion of a freed slot; ignored");
                return false;
            };
            if slot.status != SlotStatus::Pending {
                tracing::warn!(slot = id, "future completed more than once; ignored");
                return false;
            }
            slot.status = SlotStatus::Completing;
            let placeholder: Box<dyn Any + Send> = Box::new(());
            std::mem::replace(&mut slot.result, placeholder)
        };

        let unwind = WriterGuard::<T> {
            table: &self.inner,
            id,
            armed: true,
            _result: PhantomData,
        };
        match result.downcast_mut::<Option<T>>() {
            Some(value) => writer(value),
            None => tracing::error!(slot = id, "result type does not match the allocated slot"),
        }
        unwind.disarm();

        let (wakers, callbacks) = {
            let mut state = lock(&self.inner.state);
            let Some(slot) = state.slots.get_mut(&id) else {
                // Every reference went away while the result was written.
                // The guard drops before `result` does.
                return true;
            };
            slot.result = result;
            slot.error = error;
            slot.error_message = message;
            slot.status = SlotStatus::Complete;
            (
                std::mem::take(&mut slot.wakers),
                std::mem::take(&mut slot.callbacks),
            )
        };

        tracing::trace!(slot = id, error, "future completed");
        self.inner.completed.notify_all();
        wakers.into_iter().for_each(Waker::wake);
        callbacks.into_iter().for_each(|callback| callback());
        true
    }

    /// Counted view of the slot behind `handle`
    pub fn future<T: Send + 'static>(&self, handle: SafeFutureHandle<T>) -> Future<T> {
        let bound = lock(&self.inner.state).add_ref(handle.id);
        if bound {
            Future::from_handle(FutureHandle::adopt(handle.id, self.inner.clone()))
        } else {
            Future::invalid()
        }
    }

    /// The most recent future allocated for `api_id`, or an invalid future
    ///
    /// # Panics
    ///
    /// If `api_id` is not below [`api_count`](Self::api_count).
    pub fn last_result<T: Send + 'static>(&self, api_id: usize) -> Future<T> {
        assert!(
            api_id < self.inner.api_count,
            "api id {} out of range for a table of {} functions",
            api_id,
            self.inner.api_count
        );
        let id = {
            let mut state = lock(&self.inner.state);
            let last = state.last_results[api_id];
            match last {
                Some(id) if state.add_ref(id) => Some(id),
                _ => None,
            }
        };
        match id {
            Some(id) => Future::from_handle(FutureHandle::adopt(id, self.inner.clone())),
            None => Future::invalid(),
        }
    }

    /// Detach the table from its owner
    ///
    /// Pending futures become [`FutureStatus::Invalid`] and are woken; their
    /// completion callbacks run. Completed results stay readable through
    /// futures that still hold them. Later completions are ignored.
    pub fn release(&self) {
        let (wakers, callbacks, evicted) = {
            let mut state = lock(&self.inner.state);
            if state.released {
                return;
            }
            state.released = true;

            let mut wakers = Vec::new();
            let mut callbacks = Vec::new();
            for slot in state.slots.values_mut() {
                if slot.status != SlotStatus::Complete {
                    wakers.append(&mut slot.wakers);
                    callbacks.append(&mut slot.callbacks);
                }
            }

            let last_results = std::mem::take(&mut state.last_results);
            let evicted: Vec<Slot> = last_results
                .into_iter()
                .flatten()
                .filter_map(|id| state.release_ref(id))
                .collect();
            (wakers, callbacks, evicted)
        };

        tracing::debug!(
            invalidated = callbacks.len() + wakers.len(),
            freed = evicted.len(),
            "future table released"
        );
        drop(evicted);
        self.inner.completed.notify_all();
        wakers.into_iter().for_each(Waker::wake);
        callbacks.into_iter().for_each(|callback| callback());
    }

    /// True once [`release`](Self::release) has run
    pub fn is_released(&self) -> bool {
        lock(&self.inner.state).released
    }

    /// Number of slots currently alive
    pub fn slot_count(&self) -> usize {
        lock(&self.inner.state).slots.len()
    }

    /// Number of live slots not yet complete
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.state)
            .slots
            .values()
            .filter(|slot| slot.status != SlotStatus::Complete)
            .count()
    }

    pub(crate) fn downgrade(&self) -> WeakFutureTable {
        WeakFutureTable {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for FutureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("FutureTable")
            .field("api_count", &self.inner.api_count)
            .field("slots", &state.slots.len())
            .field("released", &state.released)
            .finish()
    }
}
