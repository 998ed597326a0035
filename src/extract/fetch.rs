use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::error::{RagError, Result};

#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch the whole body. Non-success statuses and timeouts are errors.
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("noterag/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| RagError::Extraction(format!("invalid source URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RagError::Extraction(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        tracing::info!("Downloading PDF from: {}", parsed);
        let resp = self.client.get(parsed).timeout(timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RagError::Transient(format!("download returned HTTP {status}")));
        }

        let bytes = resp.bytes().await?;
        tracing::info!("Downloaded PDF: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
