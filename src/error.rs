use thiserror::Error;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// An error reported by the store transport.
///
/// Errors are `Clone` because they travel through reactive state snapshots
/// (`QueryState`), which are replaced wholesale on every emission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// ModelError — top-level rollup
// ---------------------------------------------------------------------------

/// The access layer's tagged error type.
///
/// `ItemDoesNotExist` is recoverable (`Model::get_or_create` converts it to
/// a local-create path). `InvalidState` marks programmer or environment
/// errors: an unavailable transport, a read of a never-loaded item, a delete
/// of an unsaved item. Transport errors are surfaced verbatim and never
/// retried by this layer.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Item does not exist: {collection}/{id}")]
    ItemDoesNotExist { collection: String, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Shorthand for an `InvalidState` with a formatted reason.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias — the default error type is `ModelError`.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
