//! The synchronization error taxonomy.
//!
//! Errors fall into three behavioral classes: recoverable (one client update
//! is skipped, the cycle continues), fatal-for-the-cycle (the whole response
//! cannot be produced and the session container is disposed), and startup
//! configuration errors.

use thiserror::Error;

/// All errors surfaced by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No synchronize peer is registered for a component type. Fatal for the
    /// cycle: the response cannot be produced at all.
    #[error("no synchronize peer registered for component kind: {0}")]
    UnsupportedComponent(String),

    /// The client referenced a component no longer present in the tree.
    /// Recovered by ignoring that single update.
    #[error("component is no longer part of the tree: {0}")]
    StaleComponent(String),

    /// The client sent a value that cannot be coerced to the property's
    /// semantic type. Recovered by ignoring that single update.
    #[error("invalid value {value:?} for property {property:?}")]
    InvalidPropertyValue { property: String, value: String },

    /// An upload exceeded the configured size limit.
    #[error("upload exceeds the configured size limit of {limit} bytes")]
    UploadSizeExceeded { limit: usize },

    /// A multipart request body could not be parsed.
    #[error("failed to parse multipart request: {0}")]
    MultipartParse(String),

    /// The request body or parameters are not what the service expects.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The request requires a live session and none exists.
    #[error("session expired")]
    SessionMissing,

    /// Invalid process-wide configuration, e.g. a second attempt to install
    /// an incompatible multipart strategy.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lifecycle method was invoked in the wrong state, e.g. `init()` on an
    /// already-initialized container instance.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True if the error affects only a single client update and the
    /// synchronization cycle may continue without it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StaleComponent(_) | Self::InvalidPropertyValue { .. }
        )
    }

    /// HTTP status code this error maps to at the transport boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UploadSizeExceeded { .. }
            | Self::MultipartParse(_)
            | Self::MalformedRequest(_)
            | Self::SessionMissing
            | Self::StaleComponent(_)
            | Self::InvalidPropertyValue { .. } => 400,
            Self::UnsupportedComponent(_)
            | Self::Configuration(_)
            | Self::IllegalState(_)
            | Self::Io(_) => 500,
        }
    }
}
