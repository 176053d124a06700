//! Landing page configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LANDING_BASE_URL` - Public URL for the landing page (OAuth redirects are built from it)
//! - `RECORD_STORE_URL` - Base URL of the PocketBase-compatible record store
//! - `FIREBASE_API_KEY` - Firebase Web API key for the Identity Toolkit REST API
//! - `GOOGLE_CLIENT_ID` - Google OAuth client ID
//! - `GOOGLE_CLIENT_SECRET` - Google OAuth client secret
//!
//! ## Optional
//! - `LANDING_HOST` - Bind address (default: 127.0.0.1)
//! - `LANDING_PORT` - Listen port (default: 3000)
//! - `RECORD_STORE_TOKEN` - Bearer token sent to the record store
//! - `CONTINUE_DESTINATION_URL` - Where signed-in visitors are sent (default: the demo app)
//! - `REMOTE_TIMEOUT_SECS` - Timeout for every remote call (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Sentry trace sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default deep-link destination for the "Continue" button.
pub const DEFAULT_CONTINUE_DESTINATION: &str = "https://try-demo-peach.vercel.app/";

/// Default timeout applied to every record-store and identity-provider call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Landing page application configuration.
#[derive(Debug, Clone)]
pub struct LandingConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the landing page
    pub base_url: String,
    /// Record store configuration
    pub record_store: RecordStoreConfig,
    /// Identity provider configuration
    pub identity: IdentityConfig,
    /// Destination the "Continue" button deep-links to
    pub continue_destination: Url,
    /// Timeout for every remote call
    pub remote_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// PocketBase-compatible record store configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RecordStoreConfig {
    /// Base URL, e.g. `https://pb.example.com`
    pub base_url: Url,
    /// Optional bearer token for collections with restricted create rules
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for RecordStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Google OAuth + Firebase Authentication configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Firebase Web API key
    pub firebase_api_key: SecretString,
    /// Google OAuth client ID
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: SecretString,
    /// Identity Toolkit base URL (overridable for tests)
    pub identity_toolkit_url: Url,
    /// Secure Token base URL (overridable for tests)
    pub secure_token_url: Url,
    /// Google authorization endpoint
    pub google_auth_url: Url,
    /// Google token endpoint
    pub google_token_url: Url,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("firebase_api_key", &"[REDACTED]")
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &"[REDACTED]")
            .field("identity_toolkit_url", &self.identity_toolkit_url.as_str())
            .field("secure_token_url", &self.secure_token_url.as_str())
            .field("google_auth_url", &self.google_auth_url.as_str())
            .field("google_token_url", &self.google_token_url.as_str())
            .finish()
    }
}

impl LandingConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("LANDING_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("LANDING_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("LANDING_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("LANDING_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("LANDING_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        let record_store = RecordStoreConfig::from_env()?;
        let identity = IdentityConfig::from_env()?;
        let continue_destination = parse_url(
            "CONTINUE_DESTINATION_URL",
            &get_env_or_default("CONTINUE_DESTINATION_URL", DEFAULT_CONTINUE_DESTINATION),
        )?;
        let remote_timeout = get_env_or_default("REMOTE_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("REMOTE_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            host,
            port,
            base_url,
            record_store,
            identity,
            continue_destination,
            remote_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_rate("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: get_rate("SENTRY_TRACES_SAMPLE_RATE", 0.0)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the OAuth redirect URI for the Google sign-in callback.
    #[must_use]
    pub fn google_redirect_uri(&self) -> String {
        format!("{}/auth/google/callback", self.base_url)
    }
}

impl RecordStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_url("RECORD_STORE_URL", &get_required_env("RECORD_STORE_URL")?)?;
        let token = match get_optional_env("RECORD_STORE_TOKEN") {
            Some(value) => {
                validate_secret_strength(&value, "RECORD_STORE_TOKEN")?;
                Some(SecretString::from(value))
            }
            None => None,
        };
        Ok(Self { base_url, token })
    }
}

impl IdentityConfig {
    /// Identity Toolkit REST base URL.
    pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/";
    /// Secure Token REST base URL.
    pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/";
    /// Google OAuth 2.0 authorization endpoint.
    pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
    /// Google OAuth 2.0 token endpoint.
    pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Public Web API key: presence only.
            firebase_api_key: SecretString::from(get_required_env("FIREBASE_API_KEY")?),
            google_client_id: get_required_env("GOOGLE_CLIENT_ID")?,
            google_client_secret: get_validated_secret("GOOGLE_CLIENT_SECRET")?,
            identity_toolkit_url: parse_url("IDENTITY_TOOLKIT_URL", Self::IDENTITY_TOOLKIT_URL)?,
            secure_token_url: parse_url("SECURE_TOKEN_URL", Self::SECURE_TOKEN_URL)?,
            google_auth_url: parse_url("GOOGLE_AUTH_URL", Self::GOOGLE_AUTH_URL)?,
            google_token_url: parse_url("GOOGLE_TOKEN_URL", Self::GOOGLE_TOKEN_URL)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a URL, naming the variable it came from on failure.
fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a sample rate in `0.0..=1.0`.
fn get_rate(key: &str, default: f32) -> Result<f32, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(default);
    };
    let rate = value
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be between 0.0 and 1.0".to_string(),
        ));
    }
    Ok(rate)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity_config() -> IdentityConfig {
        IdentityConfig {
            firebase_api_key: SecretString::from("AIzaSyTestKeyValue"),
            google_client_id: "client-id.apps.googleusercontent.com".to_string(),
            google_client_secret: SecretString::from("GOCSPX-super-private-value"),
            identity_toolkit_url: Url::parse(IdentityConfig::IDENTITY_TOOLKIT_URL).unwrap(),
            secure_token_url: Url::parse(IdentityConfig::SECURE_TOKEN_URL).unwrap(),
            google_auth_url: Url::parse(IdentityConfig::GOOGLE_AUTH_URL).unwrap(),
            google_token_url: Url::parse(IdentityConfig::GOOGLE_TOKEN_URL).unwrap(),
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_google_redirect_uri() {
        let config = LandingConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            record_store: RecordStoreConfig {
                base_url: Url::parse("http://localhost:8090").unwrap(),
                token: None,
            },
            identity: identity_config(),
            continue_destination: Url::parse(DEFAULT_CONTINUE_DESTINATION).unwrap(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        assert_eq!(
            config.google_redirect_uri(),
            "http://localhost:3000/auth/google/callback"
        );
        assert_eq!(config.socket_addr().port(), 3000);
    }

    #[test]
    fn test_identity_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", identity_config());

        assert!(debug_output.contains("client-id.apps.googleusercontent.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AIzaSyTestKeyValue"));
        assert!(!debug_output.contains("GOCSPX-super-private-value"));
    }

    #[test]
    fn test_record_store_config_debug_redacts_token() {
        let config = RecordStoreConfig {
            base_url: Url::parse("http://localhost:8090").unwrap(),
            token: Some(SecretString::from("pb-token-value")),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("localhost:8090"));
        assert!(!debug_output.contains("pb-token-value"));
    }
}
