//! Stable error codes for the cache / pool / retrieval core.
//!
//! Every [`crate::Error`] maps onto one of these codes so callers can branch on
//! data (retry, degrade, give up) without matching on error variants.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category    | Description                                 |
//! |--------|-------------|---------------------------------------------|
//! | E1xxx  | input       | Malformed requests and invalid configuration |
//! | E2xxx  | capacity    | Pool exhaustion and shutdown                |
//! | E3xxx  | store       | Backing-store and worker failures           |
//! | E4xxx  | operational | Deadlines                                   |
//! | E9xxx  | unknown     | Catch-all / unclassified                    |
//!
//! ## Example
//!
//! ```rust
//! use analysis_cache::error_code::ErrorCode;
//!
//! let code = ErrorCode::from_name("pool_exhausted");
//! assert_eq!(code.code(), "E2001");
//! assert!(code.retryable());
//! assert_eq!(code.category(), "capacity");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every error the core can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// E1001: Malformed request or caller-supplied key material
    InvalidInput,
    /// E1002: Configuration rejected during load or validation
    Configuration,
    /// E1003: Payload could not be encoded or decoded
    Serialization,
    /// E2001: No pooled handle became free before the acquire timeout
    PoolExhausted,
    /// E2002: The pool has been shut down
    PoolClosed,
    /// E3001: The backing store rejected or failed a query
    BackingStore,
    /// E3002: A worker or blocking query panicked or was cancelled
    TaskFailed,
    /// E4001: A batch deadline passed before the item was dispatched
    DeadlineExceeded,
    /// E9999: Error could not be classified
    Unknown,
}

impl ErrorCode {
    /// Returns the canonical code string (e.g., `"E2001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "E1001",
            Self::Configuration => "E1002",
            Self::Serialization => "E1003",
            Self::PoolExhausted => "E2001",
            Self::PoolClosed => "E2002",
            Self::BackingStore => "E3001",
            Self::TaskFailed => "E3002",
            Self::DeadlineExceeded => "E4001",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the standard name (e.g., `"pool_exhausted"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Configuration => "configuration",
            Self::Serialization => "serialization",
            Self::PoolExhausted => "pool_exhausted",
            Self::PoolClosed => "pool_closed",
            Self::BackingStore => "backing_store",
            Self::TaskFailed => "task_failed",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether the same call may succeed if repeated later.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::DeadlineExceeded)
    }

    /// Returns the category: `"input"`, `"capacity"`, `"store"`, `"operational"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput | Self::Configuration | Self::Serialization => "input",
            Self::PoolExhausted | Self::PoolClosed => "capacity",
            Self::BackingStore | Self::TaskFailed => "store",
            Self::DeadlineExceeded => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a name string back to its code. Unknown names map to `ErrorCode::Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "invalid_input" | "validation" => Self::InvalidInput,
            "configuration" | "config" => Self::Configuration,
            "serialization" => Self::Serialization,
            "pool_exhausted" => Self::PoolExhausted,
            "pool_closed" => Self::PoolClosed,
            "backing_store" | "store" => Self::BackingStore,
            "task_failed" => Self::TaskFailed,
            "deadline_exceeded" => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
