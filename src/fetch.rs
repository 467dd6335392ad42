//! Retrieval of synthesized speech referenced by audio events.

use std::time::Duration;

use tracing::debug;

use crate::error::{ConversationError, Result};

/// Dereferences audio content locators
#[async_trait::async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the raw encoded audio at `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET; the response body is treated as opaque encoded audio
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversationError::AudioFetchFailed {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let failed = |reason: String| ConversationError::AudioFetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| failed(e.to_string()))?;

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(failed("empty response body".to_string()));
        }

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
