//! Proxy validation pings

use crate::config::ProxyConfig;
use crate::proxy::{ProxyError, ProxySnapshot};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::time::Duration;
use url::Url;

/// Checks that a proxy can reach the outside world
#[async_trait]
pub trait ProxyValidator: Send + Sync {
    async fn validate(&self, proxy: &ProxySnapshot) -> Result<(), ProxyError>;
}

/// Sends a GET through the proxy to a known-good echo endpoint
#[derive(Debug, Clone)]
pub struct HttpProxyValidator {
    echo_url: Url,
    timeout: Duration,
}

impl HttpProxyValidator {
    pub fn new(echo_url: Url, timeout: Duration) -> Self {
        Self { echo_url, timeout }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let echo_url = Url::parse(&config.echo_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid echo-url: {}", e)))?;
        Ok(Self::new(
            echo_url,
            Duration::from_secs(config.validate_timeout_secs),
        ))
    }
}

#[async_trait]
impl ProxyValidator for HttpProxyValidator {
    async fn validate(&self, proxy: &ProxySnapshot) -> Result<(), ProxyError> {
        let client = Client::builder()
            .proxy(Proxy::all(proxy.proxy_url())?)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()?;

        let response = client
            .get(self.echo_url.clone())
            .send()
            .await
            .map_err(|e| ProxyError::Validation {
                endpoint: proxy.endpoint(),
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProxyError::Validation {
                endpoint: proxy.endpoint(),
                reason: format!("echo endpoint returned {}", response.status()),
            })
        }
    }
}
