//! Engine configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! FOLIO_DOMAIN=https://folio.example/
//! FOLIO_CONFIRMATION_TTL_HOURS=24
//! FOLIO_PASSWORD_RESET_TTL_HOURS=48
//! FOLIO_CLAIM_TTL_HOURS=24
//! FOLIO_MAX_RENAME_ATTEMPTS=100
//! FOLIO_MAILING_LISTS_MANDATORY=false
//!
//! # Gateway payload protection (both required to enable; omit both for
//! # plain-JSON bodies)
//! FOLIO_GATEWAY_SEAL_KEY=<hex 32 bytes>
//! FOLIO_GATEWAY_VERIFY_KEY=<hex 32 bytes>
//! ```

use std::collections::BTreeMap;
use std::env;

use chrono::Duration;
use thiserror::Error;
use url::Url;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid domain URL: {0}")]
    InvalidDomain(String),
    #[error("Invalid number in {0}")]
    InvalidNumber(String),
    #[error("Invalid key material in {0}: expected 32 hex-encoded bytes")]
    InvalidKey(String),
    #[error("Gateway encryption needs both FOLIO_GATEWAY_SEAL_KEY and FOLIO_GATEWAY_VERIFY_KEY")]
    PartialGatewayKeys,
}

/// Key material for the authentication gateway's sealed payloads.
#[derive(Clone)]
pub struct GatewayKeys {
    /// Shared XChaCha20-Poly1305 key.
    pub seal_key: [u8; 32],
    /// Ed25519 public key of the authentication front end.
    pub verify_key: [u8; 32],
}

impl std::fmt::Debug for GatewayKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GatewayKeys(..)")
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL for confirmation/claim/reset links; must end with `/`.
    pub domain: Url,
    pub confirmation_ttl_hours: i64,
    pub password_reset_ttl_hours: i64,
    pub claim_ttl_hours: i64,
    /// Upper bound on quick-file rename attempts during a merge.
    pub max_rename_attempts: u32,
    /// When set, a failed mailing-list unsubscribe aborts `disable` instead
    /// of being swallowed.
    pub mailing_lists_mandatory: bool,
    /// Recognized registration campaigns: campaign key → system tag.
    pub campaigns: BTreeMap<String, String>,
    /// When `None`, gateway bodies are plain JSON.
    pub gateway_keys: Option<GatewayKeys>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            domain: Url::parse("https://folio.example/").expect("static URL"),
            confirmation_ttl_hours: 24,
            password_reset_ttl_hours: 48,
            claim_ttl_hours: 24,
            max_rename_attempts: 100,
            mailing_lists_mandatory: false,
            campaigns: BTreeMap::new(),
            gateway_keys: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        let domain = env::var("FOLIO_DOMAIN")
            .map_err(|_| ConfigError::MissingEnvVar("FOLIO_DOMAIN".to_string()))?;
        config.domain = Url::parse(&domain).map_err(|_| ConfigError::InvalidDomain(domain))?;

        config.confirmation_ttl_hours = env_hours("FOLIO_CONFIRMATION_TTL_HOURS", 24)?;
        config.password_reset_ttl_hours = env_hours("FOLIO_PASSWORD_RESET_TTL_HOURS", 48)?;
        config.claim_ttl_hours = env_hours("FOLIO_CLAIM_TTL_HOURS", 24)?;

        if let Ok(raw) = env::var("FOLIO_MAX_RENAME_ATTEMPTS") {
            config.max_rename_attempts = raw
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber("FOLIO_MAX_RENAME_ATTEMPTS".to_string()))?;
        }

        config.mailing_lists_mandatory = env::var("FOLIO_MAILING_LISTS_MANDATORY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let seal = env::var("FOLIO_GATEWAY_SEAL_KEY").ok();
        let verify = env::var("FOLIO_GATEWAY_VERIFY_KEY").ok();
        config.gateway_keys = match (seal, verify) {
            (Some(seal), Some(verify)) => Some(GatewayKeys {
                seal_key: parse_key("FOLIO_GATEWAY_SEAL_KEY", &seal)?,
                verify_key: parse_key("FOLIO_GATEWAY_VERIFY_KEY", &verify)?,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialGatewayKeys),
        };

        Ok(config)
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::hours(self.confirmation_ttl_hours)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::hours(self.password_reset_ttl_hours)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::hours(self.claim_ttl_hours)
    }
}

fn env_hours(var: &str, default: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidNumber(var.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_key(var: &str, raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw).map_err(|_| ConfigError::InvalidKey(var.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidKey(var.to_string()))
}
