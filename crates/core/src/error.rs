use thiserror::Error;

/// Failures raised by a key-value settings backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("settings backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode value for '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings store unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised by a notification service.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("notification permission denied")]
    PermissionDenied,

    #[error("notification service unavailable: {0}")]
    Unavailable(String),
}

/// Rejected user input (deadline specs, lead times, priorities, sort modes).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input cannot be empty")]
    Empty,

    #[error("unrecognized date specification '{0}'. Try YYYY-MM-DD, today, tomorrow, +3d, +90m, mon")]
    Date(String),

    #[error("unrecognized lead time '{0}': expected 5, 10m, 1h or custom")]
    LeadTime(String),

    #[error("unknown priority '{0}': expected low|medium|high")]
    Priority(String),

    #[error("unknown sort mode '{0}': expected smart|deadline|priority")]
    SortMode(String),
}
