use crate::error_code::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "pool.pool_size", "request.limit")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "content_cache", "resource_pool")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the caching / pooling / retrieval core.
///
/// Cache misses and stale entries are not errors; they surface as `Option` or
/// [`crate::cache::Lookup`] values. Only backing-store failures and pool
/// exhaustion are expected to cross the crate boundary in normal operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Pool exhausted: no handle free among {pool_size} after {waited:?}")]
    PoolExhausted { pool_size: usize, waited: Duration },

    #[error("Pool closed")]
    PoolClosed,

    #[error("Backing store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("Deadline exceeded before dispatch")]
    DeadlineExceeded,

    #[error("Task failed: {message}")]
    TaskFailed { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration format error: {0}")]
    ConfigFormat(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store {
            message: e.to_string(),
            context: ErrorContext::new().with_source("sqlite"),
        }
    }
}

impl Error {
    /// Create a backing-store error with a plain message.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a backing-store error with structured context
    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Store { context, .. }
            | Error::Configuration { context, .. }
            | Error::Validation { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Stable classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PoolExhausted { .. } => ErrorCode::PoolExhausted,
            Error::PoolClosed => ErrorCode::PoolClosed,
            Error::Store { .. } => ErrorCode::BackingStore,
            Error::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            Error::TaskFailed { .. } => ErrorCode::TaskFailed,
            Error::Configuration { .. } | Error::ConfigFormat(_) => ErrorCode::Configuration,
            Error::Validation { .. } => ErrorCode::InvalidInput,
            Error::Serialization(_) => ErrorCode::Serialization,
            Error::Io(_) => ErrorCode::Unknown,
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        self.code().retryable()
    }

    /// Errors that must be surfaced to the caller rather than folded into a
    /// per-request result, so upstream code can apply backpressure.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::PoolExhausted { .. } | Error::PoolClosed)
    }
}
