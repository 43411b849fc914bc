//! Error types for the ISCC Hub core.

use thiserror::Error;

/// Errors from the codec, crypto, and canonicalization layers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed ISCC: {0}")]
    MalformedIscc(String),

    #[error("timestamp {0} exceeds 52-bit range")]
    TimestampOverflow(u64),

    #[error("server-id {0} exceeds 12-bit range")]
    ServerIdOverflow(u16),

    #[error("canonicalization error: {0}")]
    Canonical(String),
}

/// Typed rejection of an [`crate::IsccNote`].
///
/// Produced by [`crate::validate_note`]; the first failing check wins.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Shape or format violation. Not worth retrying.
    #[error("malformed field '{field}': {message}")]
    Malformed { field: String, message: String },

    /// The nonce prefix addresses a different hub.
    #[error("nonce addresses hub {got}, this hub is {expected}")]
    WrongHub { expected: u16, got: u16 },

    /// Note timestamp is too far in the past.
    #[error("timestamp is {offset_secs}s behind hub time (tolerance {tolerance_secs}s)")]
    Stale { offset_secs: i64, tolerance_secs: i64 },

    /// Note timestamp is too far in the future.
    #[error("timestamp is {offset_secs}s ahead of hub time (tolerance {tolerance_secs}s)")]
    Future { offset_secs: i64, tolerance_secs: i64 },

    /// Ed25519 verification failed over the canonical signing input.
    #[error("signature verification failed")]
    BadSignature,
}

impl ValidationError {
    pub(crate) fn malformed(field: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
