use anyhow::Result;
use rand::Rng;
use reqwest::{header, Client, Url};
use sitesearch_core::config::CrawlerConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Why a fetch produced no page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("HTTP error status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Transport(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// HTTP client with politeness delays and bounded retries.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    min_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl Fetcher {
    pub fn new(cfg: &CrawlerConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Ok(v) = header::HeaderValue::from_str(&cfg.referrer) {
            headers.insert(header::REFERER, v);
        }
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            min_delay_ms: cfg.min_delay_ms,
            max_delay_ms: cfg.max_delay_ms.max(cfg.min_delay_ms),
            max_attempts: cfg.max_attempts.max(1),
        })
    }

    /// Sleeps for a random duration within the configured bounds.
    pub async fn polite_delay(&self) {
        if self.max_delay_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms);
        sleep(Duration::from_millis(ms)).await;
    }

    /// Fetches `url`, retrying timeouts (after another delay) and transport errors.
    pub async fn fetch(&self, url: &Url) -> Result<Fetched, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(url = %url, attempt, max = self.max_attempts, error = %e, "fetch failed, retrying");
                    if matches!(e, FetchError::Timeout) {
                        self.polite_delay().await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Fetched, FetchError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or_default().to_ascii_lowercase();
            if !is_markup(&ct) {
                return Err(FetchError::UnsupportedContentType(ct));
            }
        }
        let final_url = resp.url().clone();
        let bytes = resp.bytes().await?;
        Ok(Fetched { url: final_url, status: status.as_u16(), body: String::from_utf8_lossy(&bytes).into_owned() })
    }
}

fn is_markup(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.starts_with("text/") || mime == "application/xml" || (mime.starts_with("application/") && mime.ends_with("+xml"))
}
