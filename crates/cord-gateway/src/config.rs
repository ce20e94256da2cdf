//! Client configuration.
//!
//! Loaded from a TOML file, then optionally overridden from the command
//! line. Everything except the token has a default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GatewayError;

/// Default REST API base.
pub const DEFAULT_API_BASE: &str = "https://discordapp.com/api";

/// Default REST and gateway API version.
pub const DEFAULT_API_VERSION: &str = "6";

/// Default connect and request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Largest accepted timeout in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 0x7fff_ffff;

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_agent_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

/// Configuration for [`Client`](crate::client::Client).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bot token.
    pub token: String,
    /// REST API version.
    #[serde(default = "default_api_version")]
    pub http_api_version: String,
    /// Gateway API version.
    #[serde(default = "default_api_version")]
    pub gateway_api_version: String,
    /// Connect and request timeout in milliseconds. Zero disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name sent as browser and device in IDENTIFY.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http_api_version: default_api_version(),
            gateway_api_version: default_api_version(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_base: default_api_base(),
            agent_name: default_agent_name(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.token.is_empty() {
            return Err(GatewayError::Config("token cannot be empty".to_string()));
        }

        if !self
            .token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '.'))
        {
            return Err(GatewayError::Config("invalid token".to_string()));
        }

        if !is_version(&self.http_api_version) {
            return Err(GatewayError::Config(format!(
                "invalid http_api_version '{}'",
                self.http_api_version
            )));
        }

        if !is_version(&self.gateway_api_version) {
            return Err(GatewayError::Config(format!(
                "invalid gateway_api_version '{}'",
                self.gateway_api_version
            )));
        }

        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(GatewayError::Config(format!(
                "timeout_ms cannot exceed {MAX_TIMEOUT_MS}"
            )));
        }

        match Url::parse(&self.api_base) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(GatewayError::Config(format!(
                    "api_base '{}' is not an http(s) URL",
                    self.api_base
                )));
            }
        }

        if self.agent_name.is_empty() {
            return Err(GatewayError::Config(
                "agent_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Timeout as a duration. Zero means none.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn is_version(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = ClientConfig::from_toml(r#"token = "abc.DEF+/=""#).expect("should parse");

        assert_eq!(config.token, "abc.DEF+/=");
        assert_eq!(config.http_api_version, "6");
        assert_eq!(config.gateway_api_version, "6");
        assert_eq!(config.timeout_ms, 15_000);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.agent_name, "cord-gateway");
        assert_eq!(config, ClientConfig::new("abc.DEF+/="));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            token = "secret"
            http_api_version = "7"
            gateway_api_version = "6.1"
            timeout_ms = 0
            api_base = "http://localhost:8080/api"
            agent_name = "my-bot"
        "#;

        let config = ClientConfig::from_toml(toml).expect("should parse");

        assert_eq!(config.http_api_version, "7");
        assert_eq!(config.gateway_api_version, "6.1");
        assert_eq!(config.timeout(), Duration::ZERO);
        assert_eq!(config.api_base, "http://localhost:8080/api");
        assert_eq!(config.agent_name, "my-bot");
    }

    #[test]
    fn test_missing_token_rejected() {
        let result = ClientConfig::from_toml(r#"agent_name = "bot""#);
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let file = create_temp_config("token = \"abc\"\ntimeout_ms = 500\n");
        let config = ClientConfig::from_file(file.path()).expect("should load");
        assert_eq!(config.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_missing_file() {
        let err = ClientConfig::from_file("/nonexistent/cord.toml").expect_err("should fail");
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test_case("" ; "empty")]
    #[test_case("has space" ; "space")]
    #[test_case("bad-dash" ; "dash")]
    #[test_case("\u{e9}t\u{e9}" ; "non ascii")]
    fn test_invalid_token(token: &str) {
        assert!(ClientConfig::new(token).validate().is_err());
    }

    #[test_case("v6" ; "letter prefix")]
    #[test_case("" ; "empty")]
    #[test_case("6-beta" ; "dash")]
    fn test_invalid_api_version(version: &str) {
        let mut config = ClientConfig::new("tok");
        config.http_api_version = version.to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new("tok");
        config.gateway_api_version = version.to_string();
        assert!(config.validate().is_err());
    }

    #[test_case(0, true ; "zero disables")]
    #[test_case(MAX_TIMEOUT_MS, true ; "max")]
    #[test_case(MAX_TIMEOUT_MS + 1, false ; "over max")]
    fn test_timeout_bounds(timeout_ms: u64, valid: bool) {
        let mut config = ClientConfig::new("tok");
        config.timeout_ms = timeout_ms;
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test_case("ftp://example.com" ; "wrong scheme")]
    #[test_case("not a url" ; "garbage")]
    fn test_invalid_api_base(base: &str) {
        let mut config = ClientConfig::new("tok");
        config.api_base = base.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_agent_name_rejected() {
        let mut config = ClientConfig::new("tok");
        config.agent_name = String::new();
        assert!(config.validate().is_err());
    }
}
