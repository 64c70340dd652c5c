// Fetch error taxonomy reported through the engine's error callback.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The response did not have the configured shape.
    #[error("invalid response: {reason}")]
    Validation { reason: String },

    /// The transport failed to deliver a response.
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    /// The fetch belonged to a superseded generation. Never reported to callers.
    #[error("fetch aborted: superseded by a newer request")]
    Aborted,
}

impl FetchError {
    pub fn validation(reason: impl Into<String>) -> Self {
        FetchError::Validation {
            reason: reason.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchError::Aborted)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FetchError::Validation { .. })
    }
}
