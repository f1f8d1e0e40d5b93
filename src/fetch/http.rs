use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::Fetcher;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Fetches documents directly over HTTP, keeping cookies between requests
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Fetched once during `prepare`, e.g. to pick up session cookies
    warm_up_url: Option<String>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Use a caller-built client, e.g. with custom headers or a proxy.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            warm_up_url: None,
        }
    }

    pub fn warm_up(mut self, url: impl Into<String>) -> Self {
        self.warm_up_url = Some(url.into());
        self
    }

    async fn request(&self, method: Method, url: &str) -> Result<Vec<u8>> {
        let response = self.client.request(method, url).send().await?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        // Decoded text so the body is UTF-8 whatever charset the server used
        Ok(response.text().await?.into_bytes())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn prepare(&mut self) -> Result<()> {
        if let Some(url) = &self.warm_up_url {
            info!("Warming up session with {}", url);
            self.request(Method::GET, url).await?;
        }
        Ok(())
    }

    async fn fetch(&self, method: &str, url: &str) -> Result<Vec<u8>> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::InvalidMethod(method.to_string()))?;

        debug!("{} {}", method, url);
        self.request(method, url).await
    }

    async fn close(&mut self) {}
}
