//! API client.
//!
//! Holds the validated configuration and a preconfigured HTTP client. Its
//! main job is bootstrapping: asking the API where the gateway lives and
//! opening a [`GatewaySession`] there.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::GatewayError;
use crate::gateway::{GatewaySession, SessionOptions};

/// Body of `GET /gateway`.
#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}

/// API client.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    base: String,
}

impl Client {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the configuration is invalid, or
    /// [`GatewayError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let authorization = HeaderValue::from_str(&format!("Bot {}", config.token))
            .map_err(|e| GatewayError::Config(format!("invalid token: {e}")))?;
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent()));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if config.timeout_ms > 0 {
            builder = builder.timeout(config.timeout());
        }
        let http = builder.build()?;

        let base = format!(
            "{}/v{}/",
            config.api_base.trim_end_matches('/'),
            config.http_api_version
        );

        Ok(Self { config, http, base })
    }

    /// Start a request against `path`, relative to the versioned base.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base, path.trim_start_matches('/'));
        self.http.request(method, url)
    }

    /// Resolve the gateway URL, with version and encoding appended.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the request fails or the API
    /// answers with an error status, and [`GatewayError::Bootstrap`] if the
    /// body carries no usable URL.
    pub async fn gateway_url(&self) -> Result<String, GatewayError> {
        let response = self
            .request(Method::GET, "gateway")
            .send()
            .await?
            .error_for_status()?;

        let info: GatewayInfo = response
            .json()
            .await
            .map_err(|e| GatewayError::Bootstrap(format!("unexpected gateway response: {e}")))?;
        if info.url.is_empty() {
            return Err(GatewayError::Bootstrap("gateway url is empty".to_string()));
        }

        let url = format!(
            "{}?v={}&encoding=json",
            info.url, self.config.gateway_api_version
        );
        debug!(%url, "resolved gateway url");
        Ok(url)
    }

    /// Session options for `url` carrying this client's agent name, token
    /// and timeout.
    #[must_use]
    pub fn session_options(&self, url: impl Into<String>) -> SessionOptions {
        SessionOptions::new(url, &self.config.agent_name, &self.config.token)
            .with_timeout(self.config.timeout())
    }

    /// Resolve the gateway URL and open a session there.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap failure, or [`GatewayError::InvalidArgument`]
    /// if the API handed back an unusable URL.
    pub async fn gateway(&self) -> Result<GatewaySession, GatewayError> {
        let url = self.gateway_url().await?;
        info!(%url, "opening gateway session");
        GatewaySession::open(self.session_options(url))
    }
}

fn user_agent() -> &'static str {
    concat!(
        "DiscordBot (",
        env!("CARGO_PKG_REPOSITORY"),
        ", ",
        env!("CARGO_PKG_VERSION"),
        ")"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> Client {
        let mut config = ClientConfig::new("abc.def");
        config.api_base = "https://api.example.com/api/".to_string();
        Client::new(config).expect("valid config")
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Client::new(ClientConfig::new("bad token"));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_request_strips_leading_slashes() {
        let request = client()
            .request(Method::GET, "//channels/1")
            .build()
            .expect("request");
        assert_eq!(request.url().as_str(), "https://api.example.com/api/v6/channels/1");
        assert_eq!(request.method(), Method::GET);
    }

    #[test]
    fn test_user_agent() {
        let agent = user_agent();
        assert!(agent.starts_with("DiscordBot ("));
        assert!(agent.ends_with(concat!(", ", env!("CARGO_PKG_VERSION"), ")")));
    }

    #[test]
    fn test_session_options_carry_config() {
        let mut config = ClientConfig::new("tok");
        config.agent_name = "my-bot".to_string();
        config.timeout_ms = 0;
        let client = Client::new(config).expect("valid config");

        let url = "wss://gateway.example.com/?v=6&encoding=json";
        let options = client.session_options(url);
        assert_eq!(
            options,
            SessionOptions::new(url, "my-bot", "tok").with_timeout(Duration::ZERO)
        );
        assert!(options.validate().is_ok());
    }
}
