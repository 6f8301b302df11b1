//! Firebase SDK core
//!
//! Ownership and completion substrate shared by Firebase service ports: the
//! Future/Promise machinery that hands asynchronous results to callers, the
//! cleanup registries that invalidate dependent objects when their owner is
//! destroyed, and the owning handles that wrap platform objects.
//!
//! # Example
//! ```
//! use firebase_sdk_core::{ApiId, App, AppContext, AppOptions, FutureStatus, PromiseFactory};
//!
//! #[derive(Debug, Clone, Copy)]
//! enum StorageFn {
//!     GetMetadata,
//! }
//!
//! impl ApiId for StorageFn {
//!     const COUNT: usize = 1;
//!
//!     fn index(self) -> usize {
//!         self as usize
//!     }
//! }
//!
//! let context = AppContext::new();
//! let app = App::create(&context, AppOptions {
//!     api_key: "YOUR_API_KEY".to_string(),
//!     project_id: "your-project-id".to_string(),
//!     app_name: None,
//! })?;
//!
//! let factory = PromiseFactory::<StorageFn>::create(&app);
//! let promise = factory.create_promise::<u64>(StorageFn::GetMetadata);
//! let future = promise.future();
//!
//! // Normally handed to a platform callback on another thread
//! promise.set_value(1024);
//! assert_eq!(future.status(), FutureStatus::Complete);
//! assert_eq!(future.result(), Some(1024));
//! # Ok::<(), firebase_sdk_core::FirebaseError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod cleanup;
pub mod dependent;
pub mod error;
pub mod future;
pub mod handle;
pub mod promise;

mod sync;

// Re-exports for convenience
pub use app::{App, AppContext, AppOptions};
pub use cleanup::{CleanupRegistry, ObjectId, OwnerRegistry, WeakCleanupRegistry};
pub use dependent::Dependent;
pub use error::{FirebaseError, FirestoreError, FutureError, Status, ERROR_NONE};
pub use future::{Future, FutureManager, FutureStatus, FutureTable, SafeFutureHandle};
pub use handle::{Heap, OwningHandle, Platform, PlatformPtr, RefCounted, UniquePtr};
pub use promise::{ApiId, Promise, PromiseFactory, PromiseOwner};
