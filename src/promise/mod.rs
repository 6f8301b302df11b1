//! Producer side of the Future/Promise substrate
//!
//! Wrapped modules follow one pattern: keep a [`PromiseFactory`] for the
//! lifetime of the internal object, call
//! [`create_promise`](PromiseFactory::create_promise) at the start of each
//! async method, hand the native callback a clone of the [`Promise`], and
//! return [`Promise::future`] to the caller.

#[allow(clippy::module_inception)]
pub mod promise;
pub mod factory;

pub use factory::{ApiId, PromiseFactory, PromiseOwner};
pub use promise::Promise;
