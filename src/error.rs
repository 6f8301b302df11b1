//! Firebase error types
//!
//! Two channels, kept apart on purpose:
//! - [`FirebaseError`] for synchronous failures returned as `Result` from
//!   constructors and lookups.
//! - [`Status`] / [`FutureError`] for asynchronous failures delivered through
//!   a completed [`Future`](crate::future::Future).
//!
//! API misuse (completing a promise with an ok status, dereferencing an empty
//! handle, indexing past an API table) panics instead of returning an error.
//!
//! # C++ Reference
//! - `app/src/include/firebase/app.h` (Error enum)
//! - `firestore/src/include/firebase/firestore/firestore_errors.h` (Error enum)
//! - `app/src/include/firebase/future.h` (`error()`, `error_message()`)

use thiserror::Error;

/// Error code reported by a future that completed successfully
///
/// # C++ Reference
/// - `app/src/include/firebase/app.h` - kErrorNone / kErrorOk
pub const ERROR_NONE: i32 = 0;

/// Top-level Firebase error type
///
/// Returned synchronously by owner construction and lookup. Asynchronous
/// failures never surface here; they complete a future instead.
///
/// # Example
/// ```
/// use firebase_sdk_core::{FirebaseError, FirestoreError};
///
/// let err: FirebaseError = FirestoreError::NotFound.into();
/// assert!(err.to_string().contains("Document not found"));
/// ```
#[derive(Debug, Error)]
pub enum FirebaseError {
    /// Firestore-related errors
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    /// API key not configured
    #[error("API key not configured")]
    ApiKeyNotConfigured,

    /// App options failed validation
    #[error("Invalid app options: {0}")]
    InvalidOptions(String),

    /// No app registered under the requested name
    #[error("Firebase App '{0}' not found. Call App::create() first.")]
    AppNotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FirebaseError {
    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Firestore errors
///
/// # C++ Reference
/// - `firestore/src/include/firebase/firestore/firestore_errors.h:32-68`
///
/// Maps Firestore error codes to Rust enum variants. These are the
/// module-specific codes carried by [`Status`] when a Firestore promise fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FirestoreError {
    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Document not found
    #[error("Document not found")]
    NotFound,

    /// Permission denied
    #[error("Permission denied")]
    PermissionDenied,

    /// Resource already exists
    #[error("Resource already exists")]
    AlreadyExists,

    /// Resource exhausted (e.g., quota exceeded)
    #[error("Resource exhausted")]
    ResourceExhausted,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Deadline exceeded
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Operation rejected because the system is not in a required state
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation was aborted
    #[error("Operation aborted")]
    Aborted,

    /// Out of range error
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Unimplemented feature
    #[error("Feature not implemented")]
    Unimplemented,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable
    #[error("Service unavailable")]
    Unavailable,

    /// Data loss or corruption
    #[error("Data loss")]
    DataLoss,

    /// Unauthenticated
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Unknown error with code
    #[error("Unknown Firestore error: code {0}")]
    Unknown(i32),
}

impl FirestoreError {
    /// Create from gRPC error code
    pub fn from_grpc_code(code: i32) -> Self {
        match code {
            1 => Self::Cancelled,
            3 => Self::InvalidArgument(String::new()),
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition(String::new()),
            10 => Self::Aborted,
            11 => Self::OutOfRange(String::new()),
            12 => Self::Unimplemented,
            13 => Self::Internal(String::new()),
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown(code),
        }
    }

    /// The gRPC code for this error, as reported through `Future::error()`
    pub fn code(&self) -> i32 {
        match self {
            Self::Cancelled => 1,
            Self::InvalidArgument(_) => 3,
            Self::DeadlineExceeded => 4,
            Self::NotFound => 5,
            Self::AlreadyExists => 6,
            Self::PermissionDenied => 7,
            Self::ResourceExhausted => 8,
            Self::FailedPrecondition(_) => 9,
            Self::Aborted => 10,
            Self::OutOfRange(_) => 11,
            Self::Unimplemented => 12,
            Self::Internal(_) => 13,
            Self::Unavailable => 14,
            Self::DataLoss => 15,
            Self::Unauthenticated => 16,
            // Never report ERROR_NONE for a failure
            Self::Unknown(ERROR_NONE) => 2,
            Self::Unknown(code) => *code,
        }
    }
}

/// Error code plus message used to complete a promise
///
/// # C++ Reference
/// - `firestore/src/common/promise.h` - SetError(const util::Status&)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: i32,
    message: String,
}

impl Status {
    /// The ok status. Passing it to `Promise::set_error` panics.
    pub fn ok() -> Self {
        Self {
            code: ERROR_NONE,
            message: String::new(),
        }
    }

    /// Create a status with the given code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the code is [`ERROR_NONE`]
    pub fn is_ok(&self) -> bool {
        self.code == ERROR_NONE
    }

    /// Integer error code
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Free-form message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<FirestoreError> for Status {
    fn from(err: FirestoreError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Error produced when awaiting a [`Future`](crate::future::Future)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// The operation completed with a nonzero error code
    #[error("{message} (code {code})")]
    Failed {
        /// Error code reported at completion
        code: i32,
        /// Error message reported at completion
        message: String,
    },

    /// The future was never bound, or its owner was destroyed before it completed
    #[error("Future is invalid")]
    Invalid,

    /// The operation reported success without writing a result
    #[error("Future completed without a result")]
    NoResult,
}

impl FutureError {
    /// Error code, or `ERROR_NONE` for the non-`Failed` variants
    pub fn code(&self) -> i32 {
        match self {
            Self::Failed { code, .. } => *code,
            Self::Invalid | Self::NoResult => ERROR_NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firestore_error_into_firebase_error() {
        let fs_err = FirestoreError::NotFound;
        let firebase_err: FirebaseError = fs_err.into();

        assert!(matches!(firebase_err, FirebaseError::Firestore(FirestoreError::NotFound)));
    }

    #[test]
    fn test_firestore_error_from_grpc() {
        assert_eq!(FirestoreError::from_grpc_code(5), FirestoreError::NotFound);
        assert_eq!(FirestoreError::from_grpc_code(7), FirestoreError::PermissionDenied);
        assert_eq!(FirestoreError::from_grpc_code(14), FirestoreError::Unavailable);
        assert_eq!(FirestoreError::from_grpc_code(99), FirestoreError::Unknown(99));
    }

    #[test]
    fn test_firestore_error_code_matches_grpc() {
        for code in 1..=16 {
            if code == 2 {
                continue;
            }
            assert_eq!(FirestoreError::from_grpc_code(code).code(), code);
        }
    }

    #[test]
    fn test_status_from_firestore_error() {
        let status: Status = FirestoreError::PermissionDenied.into();
        assert!(!status.is_ok());
        assert_eq!(status.code(), 7);
        assert_eq!(status.message(), "Permission denied");
    }

    #[test]
    fn test_status_ok() {
        assert!(Status::ok().is_ok());
        assert!(!Status::new(3, "bad").is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = FirebaseError::AppNotFound("secondary".to_string());
        let display = format!("{}", err);
        assert!(display.contains("secondary"));

        let err = FutureError::Failed {
            code: 5,
            message: "gone".to_string(),
        };
        assert_eq!(err.to_string(), "gone (code 5)");
        assert_eq!(err.code(), 5);
        assert_eq!(FutureError::Invalid.code(), ERROR_NONE);
    }
}
