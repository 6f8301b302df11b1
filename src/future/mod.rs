//! Future/Promise completion substrate
//!
//! # C++ Reference
//! - `app/src/include/firebase/future.h`
//! - `app/src/reference_counted_future_impl.h`
//! - `app/src/future_manager.h`
//!
//! Module layout:
//! - `table.rs`: [`FutureTable`], the per-owner slot table
//! - `future.rs`: [`Future`], the consumer view of a slot
//! - `manager.rs`: [`FutureManager`], owner → table bookkeeping

#[allow(clippy::module_inception)]
pub mod future;
pub mod manager;
pub mod table;

pub use future::{Future, FutureStatus};
pub use manager::FutureManager;
pub use table::{FutureTable, SafeFutureHandle};

pub(crate) use table::WeakFutureTable;
