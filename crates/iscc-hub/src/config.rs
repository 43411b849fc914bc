//! Hub configuration.
//!
//! A plain validated struct; loading from files or the environment is the
//! operator's concern, not this crate's.

use std::path::PathBuf;

use thiserror::Error;

use iscc_hub_core::codec::MAX_SERVER_ID;
use iscc_hub_core::Keypair;

/// Default clock-skew tolerance for note timestamps, in seconds.
pub const DEFAULT_SKEW_SECS: u64 = 600;

/// Default bound on the writer queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server_id {0} out of range 0-{max}", max = MAX_SERVER_ID)]
    ServerIdOutOfRange(u16),

    #[error("seckey must be a 64-char hex Ed25519 seed")]
    InvalidSeckey,

    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("queue_depth must be at least 1")]
    QueueDepthZero,
}

/// Hub instance configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// This hub's server-id (0-4095). Encoded into every minted ISCC-ID.
    pub server_id: u16,
    /// Ed25519 signing seed, 64 hex chars.
    pub seckey: String,
    /// Domain for the `did:web` issuer identity in receipts.
    pub domain: String,
    /// Clock-skew tolerance for note timestamps.
    pub skew_secs: u64,
    /// Event store location.
    pub db_path: PathBuf,
    /// Writer queue bound; submissions beyond it are rejected as busy.
    pub queue_depth: usize,
}

impl HubConfig {
    /// Build a config with default skew and queue depth.
    pub fn new(
        server_id: u16,
        seckey: impl Into<String>,
        domain: impl Into<String>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            server_id,
            seckey: seckey.into(),
            domain: domain.into(),
            skew_secs: DEFAULT_SKEW_SECS,
            db_path: db_path.into(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Validate all fields and decode the signing key.
    pub fn keypair(&self) -> Result<Keypair, ConfigError> {
        if self.server_id > MAX_SERVER_ID {
            return Err(ConfigError::ServerIdOutOfRange(self.server_id));
        }
        if self.domain.trim().is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::QueueDepthZero);
        }
        Keypair::from_hex_seed(&self.seckey).map_err(|_| ConfigError::InvalidSeckey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HubConfig {
        HubConfig::new(1, "ab".repeat(32), "hub.example.com", "events.db")
    }

    #[test]
    fn valid_config_yields_keypair() {
        valid().keypair().unwrap();
    }

    #[test]
    fn server_id_out_of_range_is_fatal() {
        let mut config = valid();
        config.server_id = 4096;
        assert!(matches!(
            config.keypair(),
            Err(ConfigError::ServerIdOutOfRange(4096))
        ));
    }

    #[test]
    fn bad_seckey_is_fatal() {
        let mut config = valid();
        config.seckey = "not-hex".into();
        assert!(matches!(config.keypair(), Err(ConfigError::InvalidSeckey)));
    }

    #[test]
    fn empty_domain_is_fatal() {
        let mut config = valid();
        config.domain = " ".into();
        assert!(matches!(config.keypair(), Err(ConfigError::EmptyDomain)));
    }
}
