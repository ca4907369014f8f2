//! Fetching book pages from retailers.
//!
//! [`HttpPageSource`] implements [`PageSource`] with [`reqwest`], choosing the
//! fetch strategy from the site's [`ScraperKind`].

use std::time::Duration;

use async_trait::async_trait;
use bookmeta_core::sites::{ScraperKind, Site};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::Serialize;

use crate::extract::{element_text_by_class, first_heading, html_to_text};

/// Default per-request timeout for retailer pages.
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default reader proxy that renders pages to plain text.
pub const DEFAULT_READER_BASE_URL: &str = "https://r.jina.ai";

/// Browser-like user agent for direct page fetches.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Class of the synopsis element on Decitre product pages.
const DECITRE_SYNOPSIS_CLASS: &str = "product-summary-synopsys";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from fetching a retailer page.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("Failed to scrape from {site}: {source}")]
    Request {
        site: String,
        #[source]
        source: reqwest::Error,
    },

    /// The retailer returned a non-2xx status code.
    #[error("Failed to scrape from {site}: HTTP {status}")]
    Status { site: String, status: u16 },
}

// ---------------------------------------------------------------------------
// PageContent
// ---------------------------------------------------------------------------

/// Readable content of a retailer page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContent {
    pub isbn: String,
    /// Whether the page held book content.
    pub found: bool,
    /// Page text ready to be sent to the model.
    pub text: String,
    /// Retailer display name.
    pub source: String,
    pub site_id: String,
    pub duration_ms: u64,
}

/// Capability to fetch a book page and turn it into text.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, isbn: &str, site: &Site) -> Result<PageContent, ScrapeError>;
}

// ---------------------------------------------------------------------------
// ScrapeConfig
// ---------------------------------------------------------------------------

/// Configuration for [`HttpPageSource`].
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub timeout: Duration,
    pub reader_base_url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCRAPE_TIMEOUT,
            reader_base_url: DEFAULT_READER_BASE_URL.to_string(),
        }
    }
}

impl ScrapeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable              | Default              |
    /// |-----------------------|----------------------|
    /// | `SCRAPE_TIMEOUT_SECS` | `15`                 |
    /// | `READER_BASE_URL`     | `https://r.jina.ai`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("SCRAPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            reader_base_url: std::env::var("READER_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.reader_base_url),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpPageSource
// ---------------------------------------------------------------------------

/// Fetches retailer pages over HTTP.
pub struct HttpPageSource {
    client: reqwest::Client,
    reader_base_url: String,
}

impl HttpPageSource {
    /// Build a page source with its own HTTP client.
    pub fn new(config: &ScrapeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a page source reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &ScrapeConfig) -> Self {
        Self {
            client,
            reader_base_url: config.reader_base_url.clone(),
        }
    }

    /// URL actually requested for `isbn` on `site`.
    pub fn request_url(&self, isbn: &str, site: &Site) -> String {
        let book_url = site.book_url(isbn);
        match site.scraper {
            ScraperKind::Reader => format!("{}/{book_url}", self.reader_base_url),
            ScraperKind::Direct | ScraperKind::Decitre => book_url,
        }
    }

    async fn get_text(&self, url: &str, site: &Site) -> Result<String, ScrapeError> {
        let request = match site.scraper {
            ScraperKind::Reader => self
                .client
                .get(url)
                .header(ACCEPT, "text/plain")
                .header("X-With-Generated-Alt", "true"),
            ScraperKind::Direct => self
                .client
                .get(url)
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header(ACCEPT_LANGUAGE, "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7"),
            ScraperKind::Decitre => self
                .client
                .get(url)
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header(ACCEPT_LANGUAGE, "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7"),
        };

        let request_error = |source| ScrapeError::Request {
            site: site.name.to_string(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                site: site.name.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(request_error)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, isbn: &str, site: &Site) -> Result<PageContent, ScrapeError> {
        let started = std::time::Instant::now();
        let url = self.request_url(isbn, site);
        tracing::debug!(isbn, site = site.id, url = %url, "Fetching book page");

        let body = self.get_text(&url, site).await.inspect_err(|e| {
            tracing::warn!(isbn, site = site.id, error = %e, "Book page fetch failed");
        })?;
        let (found, text) = page_text(site.scraper, &body);

        tracing::debug!(isbn, site = site.id, found, chars = text.len(), "Book page fetched");
        Ok(PageContent {
            isbn: isbn.to_string(),
            found,
            text,
            source: site.name.to_string(),
            site_id: site.id.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Convert a fetched body into `(found, text)` for the given scraper kind.
pub fn page_text(kind: ScraperKind, body: &str) -> (bool, String) {
    match kind {
        ScraperKind::Reader => {
            let text = body.trim().to_string();
            (!text.is_empty(), text)
        }
        ScraperKind::Direct => {
            let text = html_to_text(body);
            (!text.is_empty(), text)
        }
        ScraperKind::Decitre => {
            let title = first_heading(body).unwrap_or_default();
            let synopsis = element_text_by_class(body, DECITRE_SYNOPSIS_CLASS);
            let found = synopsis.is_some();
            let text = format!(
                "Title: {title}\n\nDescription: {}",
                synopsis.unwrap_or_default()
            );
            (found, text)
        }
    }
}
