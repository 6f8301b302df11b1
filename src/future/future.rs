//! Consumer-facing view of one asynchronous result
//!
//! # C++ Reference
//! - `app/src/include/firebase/future.h` - FutureBase, Future<T>
//! - `app/src/include/firebase/internal/future_impl.h` - FutureHandle
//!
//! A [`Future`] can be polled (`status`), blocked on (`wait`), given a
//! completion callback (`on_completion`), or awaited. Every clone holds a
//! counted reference that keeps its slot alive in the owning table.

use super::table::TableInner;
use crate::error::{FutureError, ERROR_NONE};
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// State of a [`Future`]
///
/// # C++ Reference
/// - `app/src/include/firebase/future.h` - FutureStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// The operation finished, successfully or not
    Complete,
    /// The operation is still running
    Pending,
    /// The future was never bound to a slot, or its owner went away first
    Invalid,
}

/// Counted reference to a slot
pub(crate) struct FutureHandle {
    id: u64,
    table: Arc<TableInner>,
}

impl FutureHandle {
    /// Wrap a reference the table already counted for us
    pub(crate) fn adopt(id: u64, table: Arc<TableInner>) -> Self {
        Self { id, table }
    }
}

impl Clone for FutureHandle {
    fn clone(&self) -> Self {
        self.table.add_ref(self.id);
        Self {
            id: self.id,
            table: self.table.clone(),
        }
    }
}

impl Drop for FutureHandle {
    fn drop(&mut self) {
        self.table.release_ref(self.id);
    }
}

/// Result of an asynchronous operation
///
/// Awaiting a future yields `Ok(value)` on success, [`FutureError::Failed`]
/// when it completed with a nonzero error, and [`FutureError::Invalid`] when
/// it was never bound or its owner was destroyed first.
pub struct Future<T> {
    handle: Option<FutureHandle>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Future<T> {
    /// A future bound to nothing
    pub fn invalid() -> Self {
        Self {
            handle: None,
            _result: PhantomData,
        }
    }

    pub(crate) fn from_handle(handle: FutureHandle) -> Self {
        Self {
            handle: Some(handle),
            _result: PhantomData,
        }
    }

    /// Current state
    pub fn status(&self) -> FutureStatus {
        match &self.handle {
            Some(handle) => handle.table.status(handle.id),
            None => FutureStatus::Invalid,
        }
    }

    /// True if the future is bound to a slot
    pub fn is_valid(&self) -> bool {
        self.status() != FutureStatus::Invalid
    }

    /// Error code once complete; `ERROR_NONE` before that
    pub fn error(&self) -> i32 {
        match &self.handle {
            Some(handle) => handle.table.error(handle.id),
            None => ERROR_NONE,
        }
    }

    /// Error message once complete
    pub fn error_message(&self) -> Option<String> {
        self.handle
            .as_ref()
            .and_then(|handle| handle.table.error_message(handle.id))
    }

    /// Block until the future leaves [`FutureStatus::Pending`] or `timeout`
    /// elapses. Returns the status observed last.
    pub fn wait(&self, timeout: Option<Duration>) -> FutureStatus {
        match &self.handle {
            Some(handle) => handle.table.wait(handle.id, timeout),
            None => FutureStatus::Invalid,
        }
    }
}

impl<T: 'static> Future<T> {
    /// Borrow the result of a completed future
    ///
    /// `f` runs while the owning table is locked; it must not touch other
    /// futures from the same owner.
    pub fn with_result<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let handle = self.handle.as_ref()?;
        handle.table.with_result(handle.id, f)
    }

    /// Register `callback` to run once the future settles
    ///
    /// The callback runs on the thread that completes (or invalidates) the
    /// future, or immediately on this thread if it already has. A queued
    /// callback keeps its slot alive but not the table: if the table goes
    /// away without being released, the callback is dropped unrun.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        let Some(handle) = &self.handle else {
            callback(&Future::invalid());
            return;
        };

        // The slot reference is adopted back when the callback runs
        handle.table.add_ref(handle.id);
        let id = handle.id;
        let table = Arc::downgrade(&handle.table);
        let run: Box<dyn FnOnce() + Send> = Box::new(move || {
            let future = match table.upgrade() {
                Some(table) => Future::from_handle(FutureHandle::adopt(id, table)),
                None => Future::invalid(),
            };
            callback(&future);
        });

        if let Some(run) = handle.table.add_callback(id, run) {
            run();
        }
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Copy of the result of a completed future
    pub fn result(&self) -> Option<T> {
        self.with_result(T::clone)
    }

    fn settled(&self) -> Result<T, FutureError> {
        let code = self.error();
        if code != ERROR_NONE {
            return Err(FutureError::Failed {
                code,
                message: self.error_message().unwrap_or_default(),
            });
        }
        self.result().ok_or(FutureError::NoResult)
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("slot", &self.handle.as_ref().map(|handle| handle.id))
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + 'static> std::future::Future for Future<T> {
    type Output = Result<T, FutureError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(handle) = &self.handle else {
            return Poll::Ready(Err(FutureError::Invalid));
        };
        match handle.table.poll_status(handle.id, cx.waker()) {
            FutureStatus::Pending => Poll::Pending,
            FutureStatus::Invalid => Poll::Ready(Err(FutureError::Invalid)),
            FutureStatus::Complete => Poll::Ready(self.settled()),
        }
    }
}
