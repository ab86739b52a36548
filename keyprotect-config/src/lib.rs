//! Configuration management for Key Protect clients
//!
//! Connection settings are read from the environment (and an optional `.env`
//! file) with the `KP_` prefix. A QSC algorithm selector switches the default
//! endpoint to the quantum-safe one.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Public Key Protect endpoint
pub const DEFAULT_BASE_URL: &str = "https://us-south.kms.cloud.ibm.com";

/// Endpoint that negotiates quantum-safe key exchange
pub const DEFAULT_BASE_QSC_URL: &str = "https://qsc-stage.kms.test.cloud.ibm.com";

/// IAM endpoint used to exchange an API key for a bearer token
pub const DEFAULT_TOKEN_URL: &str = "https://iam.cloud.ibm.com/oidc/token";

/// Request timeout applied when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Unknown QSC algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Quantum-safe key exchange algorithms offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QscAlgorithm {
    Kyber512,
    Kyber768,
    Kyber1024,
    /// Hybrid: ECDH P-256 combined with Kyber512
    P256Kyber512,
    /// Hybrid: ECDH P-384 combined with Kyber768
    P384Kyber768,
    /// Hybrid: ECDH P-521 combined with Kyber1024
    P521Kyber1024,
}

impl QscAlgorithm {
    pub const ALL: [QscAlgorithm; 6] = [
        QscAlgorithm::Kyber512,
        QscAlgorithm::Kyber768,
        QscAlgorithm::Kyber1024,
        QscAlgorithm::P256Kyber512,
        QscAlgorithm::P384Kyber768,
        QscAlgorithm::P521Kyber1024,
    ];

    /// Name sent to the service
    pub fn as_str(&self) -> &'static str {
        match self {
            QscAlgorithm::Kyber512 => "kyber512",
            QscAlgorithm::Kyber768 => "kyber768",
            QscAlgorithm::Kyber1024 => "kyber1024",
            QscAlgorithm::P256Kyber512 => "p256_kyber512",
            QscAlgorithm::P384Kyber768 => "p384_kyber768",
            QscAlgorithm::P521Kyber1024 => "p521_kyber1024",
        }
    }
}

impl fmt::Display for QscAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QscAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|algorithm| algorithm.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_string()))
    }
}

/// QSC options for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QscConfig {
    pub algorithm: QscAlgorithm,
}

impl QscConfig {
    pub fn new(algorithm: QscAlgorithm) -> Self {
        Self { algorithm }
    }
}

/// Connection parameters for a Key Protect instance
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub token_url: String,
    pub instance_id: String,
    pub key_ring_id: Option<String>,
    pub timeout_secs: u64,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("instance_id", &self.instance_id)
            .field("key_ring_id", &self.key_ring_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with the default token URL and timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            instance_id: instance_id.into(),
            key_ring_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_key_ring(mut self, key_ring_id: impl Into<String>) -> Self {
        self.key_ring_id = Some(key_ring_id.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that the configuration can address a service instance
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("base_url", &self.base_url)?;
        validate_url("token_url", &self.token_url)?;

        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "instance_id",
                reason: "must not be empty".to_string(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("'{}' is not an http(s) URL", url),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    base_url: Option<String>,
    api_key: Option<String>,
    instance_id: Option<String>,
    token_url: String,
    key_ring_id: Option<String>,
    timeout_secs: u64,
    qsc_algorithm: Option<String>,
    log_level: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub qsc: Option<QscConfig>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_environment(config::Environment::with_prefix("KP"))
    }

    /// Load configuration for a quantum-safe client.
    ///
    /// `default_algorithm` applies when `KP_QSC_ALGORITHM` is not set, and the
    /// QSC endpoint is used only when `KP_BASE_URL` is not set.
    pub fn from_env_qsc(default_algorithm: QscAlgorithm) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Self::from_environment_qsc(config::Environment::with_prefix("KP"), default_algorithm)
    }

    /// Load configuration from an explicit environment source
    pub fn from_environment(environment: config::Environment) -> Result<Self, ConfigError> {
        Self::load(environment, None)
    }

    /// Like `from_environment`, falling back to `default_algorithm` for QSC
    pub fn from_environment_qsc(
        environment: config::Environment,
        default_algorithm: QscAlgorithm,
    ) -> Result<Self, ConfigError> {
        Self::load(environment, Some(default_algorithm))
    }

    fn load(
        environment: config::Environment,
        default_algorithm: Option<QscAlgorithm>,
    ) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .set_default("token_url", DEFAULT_TOKEN_URL)?
            .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS as i64)?
            .set_default("log_level", "info")?
            .add_source(environment)
            .build()?;

        let raw: RawSettings = settings.try_deserialize()?;

        let qsc = match raw.qsc_algorithm.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(QscConfig::new(name.parse()?)),
            _ => default_algorithm.map(QscConfig::new),
        };

        let default_base_url = if qsc.is_some() {
            DEFAULT_BASE_QSC_URL
        } else {
            DEFAULT_BASE_URL
        };

        let client = ClientConfig {
            base_url: raw
                .base_url
                .unwrap_or_else(|| default_base_url.to_string()),
            api_key: raw.api_key.ok_or(ConfigError::Missing("KP_API_KEY"))?,
            token_url: raw.token_url,
            instance_id: raw
                .instance_id
                .ok_or(ConfigError::Missing("KP_INSTANCE_ID"))?,
            key_ring_id: raw.key_ring_id.filter(|id| !id.trim().is_empty()),
            timeout_secs: raw.timeout_secs,
        };
        client.validate()?;

        Ok(Self {
            client,
            qsc,
            log_level: Some(raw.log_level),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
