//! The hub error taxonomy and its HTTP surface mapping.

use thiserror::Error;

use iscc_hub_core::{CoreError, IsccReceipt, ValidationError};
use iscc_hub_store::StoreError;

use crate::config::ConfigError;

/// Errors surfaced by the ingress facade.
#[derive(Debug, Error)]
pub enum HubError {
    /// Validation rejection; never touches the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The nonce was already admitted with different note bytes. Carries
    /// the original receipt so clients can recover it.
    #[error("nonce already admitted under {iscc_id}")]
    DuplicateNonce {
        iscc_id: String,
        receipt: Box<IsccReceipt>,
    },

    /// Writer queue full; retry with backoff.
    #[error("writer queue full")]
    Busy,

    /// The 52-bit microsecond timestamp space is exhausted. Fatal.
    #[error("timestamp space exhausted")]
    ClockExhausted,

    /// Store commit failed; safe to retry with the same nonce.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Client went away before the commit; no state was created.
    #[error("cancelled before commit")]
    Cancelled,

    /// Invalid configuration at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected internal failure; the admitted event (if any) remains.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// The HTTP status an ingress adapter should use. `None` for errors
    /// that never reach a client (the request is already gone).
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Validation(ValidationError::Malformed { .. }) => Some(400),
            Self::Validation(ValidationError::BadSignature) => Some(401),
            Self::Validation(ValidationError::Stale { .. }) => Some(410),
            Self::Validation(ValidationError::Future { .. }) => Some(410),
            Self::Validation(ValidationError::WrongHub { .. }) => Some(422),
            Self::DuplicateNonce { .. } => Some(409),
            Self::Busy => Some(429),
            Self::ClockExhausted => Some(503),
            Self::Transient(_) | Self::Internal(_) | Self::Config(_) => Some(500),
            Self::Cancelled => None,
        }
    }

    /// Whether a client may retry the identical request.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Transient(_) | Self::Cancelled)
    }
}

impl From<StoreError> for HubError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(_)
            | StoreError::Io(_)
            | StoreError::Join(_)
            | StoreError::Poisoned => Self::Transient(e.to_string()),
            StoreError::Constraint(_)
            | StoreError::InvalidData(_)
            | StoreError::Migration(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<CoreError> for HubError {
    fn from(e: CoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        let malformed = HubError::Validation(ValidationError::Malformed {
            field: "x".into(),
            message: "y".into(),
        });
        assert_eq!(malformed.http_status(), Some(400));
        assert_eq!(
            HubError::Validation(ValidationError::BadSignature).http_status(),
            Some(401)
        );
        assert_eq!(
            HubError::Validation(ValidationError::WrongHub {
                expected: 1,
                got: 2
            })
            .http_status(),
            Some(422)
        );
        assert_eq!(HubError::Busy.http_status(), Some(429));
        assert_eq!(HubError::ClockExhausted.http_status(), Some(503));
        assert_eq!(HubError::Cancelled.http_status(), None);
        assert!(HubError::Busy.retryable());
        assert!(!HubError::ClockExhausted.retryable());
    }
}
