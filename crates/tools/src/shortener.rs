use async_trait::async_trait;
use flightbot_core::{Error, Result};
use std::time::Duration;

const TINYURL_API: &str = "https://tinyurl.com/api-create.php";

/// Turns a long absolute URL into a short one.
#[async_trait]
pub trait LinkShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

pub struct TinyUrlShortener {
    client: reqwest::Client,
    endpoint: String,
}

impl TinyUrlShortener {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(TINYURL_API)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Shortener(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn request_url(&self, url: &str) -> String {
        format!("{}?url={}", self.endpoint, urlencoding::encode(url))
    }
}

#[async_trait]
impl LinkShortener for TinyUrlShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(self.request_url(url))
            .send()
            .await
            .map_err(|e| Error::Shortener(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Shortener(format!("HTTP {}", status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Shortener(e.to_string()))?;
        let short = body.trim();
        if !short.starts_with("http") {
            return Err(Error::Shortener(format!("unexpected response '{}'", short)));
        }
        Ok(short.to_string())
    }
}

/// Leaves links untouched.
pub struct NoopShortener;

#[async_trait]
impl LinkShortener for NoopShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_encodes_target() {
        let s = TinyUrlShortener::new().unwrap();
        assert_eq!(
            s.request_url("https://www.kayak.com/flights/TLV-ATH/2024-09-01?sort=price_a"),
            "https://tinyurl.com/api-create.php?url=https%3A%2F%2Fwww.kayak.com%2Fflights%2FTLV-ATH%2F2024-09-01%3Fsort%3Dprice_a"
        );
    }

    #[tokio::test]
    async fn test_noop_shortener() {
        let link = NoopShortener.shorten("https://a.b/c").await.unwrap();
        assert_eq!(link, "https://a.b/c");
    }
}
