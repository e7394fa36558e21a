//! HTTP client for the emote catalog.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{is_valid_set_id, EmoteError};
use crate::error::{ParlorError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 20;

/// Largest response body accepted.
const MAX_RESPONSE_SIZE: u64 = 4 * 1024 * 1024;

/// User agent string for catalog requests.
const USER_AGENT: &str = "parlor/0.1 (emote loader)";

/// Fetches emote sets by id from `{base}/{id}`.
#[derive(Debug, Clone)]
pub struct EmoteCatalog {
    client: Client,
    base: Url,
}

impl EmoteCatalog {
    /// Create a client for the given base URL.
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| ParlorError::Config(format!("invalid emote_api_base: {}", e)))?;
        match base.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ParlorError::Config(format!(
                    "unsupported emote_api_base scheme: {}",
                    scheme
                )))
            }
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ParlorError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    /// URL for a set id.
    pub fn set_url(&self, set_id: &str) -> std::result::Result<Url, EmoteError> {
        if !is_valid_set_id(set_id) {
            return Err(EmoteError::InvalidId(set_id.to_string()));
        }
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), set_id);
        Url::parse(&joined).map_err(|_| EmoteError::InvalidId(set_id.to_string()))
    }

    /// Fetch a set and return the raw JSON body.
    pub async fn fetch(&self, set_id: &str) -> std::result::Result<Value, EmoteError> {
        let url = self.set_url(set_id)?;
        debug!("fetching emote set {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EmoteError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmoteError::Upstream(format!("catalog returned HTTP {}", status)));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(EmoteError::Upstream(format!("response too large: {} bytes", len)));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EmoteError::Upstream(format!("failed to read response: {}", e)))?;
        if bytes.len() as u64 > MAX_RESPONSE_SIZE {
            return Err(EmoteError::Upstream(format!(
                "response too large: {} bytes",
                bytes.len()
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| EmoteError::Upstream(format!("malformed response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_base() {
        assert!(EmoteCatalog::new("not a url").is_err());
        assert!(EmoteCatalog::new("ftp://example.com/sets").is_err());
        assert!(EmoteCatalog::new("https://example.com/sets").is_ok());
    }

    #[test]
    fn test_set_url() {
        let catalog = EmoteCatalog::new("https://example.com/v3/emote-sets/").unwrap();
        assert_eq!(
            catalog.set_url("abc_123").unwrap().as_str(),
            "https://example.com/v3/emote-sets/abc_123"
        );
        assert_eq!(
            catalog.set_url("../admin"),
            Err(EmoteError::InvalidId("../admin".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fetch_malformed_id_skips_network() {
        let catalog = EmoteCatalog::new("http://127.0.0.1:9").unwrap();
        assert_eq!(
            catalog.fetch("no spaces").await,
            Err(EmoteError::InvalidId("no spaces".to_string()))
        );
    }
}
