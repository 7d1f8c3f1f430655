use crate::browser::BrowserPool;
use crate::config::FetchConfig;
use crate::error::{EnrichmentError, FailureKind};
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request options. `wait_for_selector` implies the browser backend.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub use_browser: bool,
    pub wait_for_selector: Option<String>,
}

impl FetchOptions {
    pub fn browser(selector: Option<&str>) -> Self {
        Self {
            use_browser: true,
            wait_for_selector: selector.map(|s| s.to_string()),
            ..Default::default()
        }
    }
}

/// HTTP retrieval with timeout, bounded retries and status classification.
///
/// Two backends: a plain reqwest client for feeds, APIs and image bytes,
/// and the shared headless browser for pages that need rendering. All
/// calls for a single article run sequentially; parallelism lives one
/// level up, across articles.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    browser: Option<Arc<BrowserPool>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self { client, config, browser: None }
    }

    pub fn with_browser(mut self, browser: Arc<BrowserPool>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Fetch a page as HTML. Routes through the headless browser when the
    /// options ask for rendering and a browser is available; degrades to
    /// plain HTTP otherwise.
    pub async fn fetch_html(&self, url: &str, opts: &FetchOptions) -> Result<String, EnrichmentError> {
        if opts.use_browser {
            if let Some(browser) = &self.browser {
                return self.fetch_rendered(browser, url, opts).await;
            }
            warn!(url, "browser fetch requested but no browser configured, using plain HTTP");
        }
        self.with_retries(url, || self.plain_get_text(url, opts)).await
    }

    /// Fetch raw bytes plus the response content type. Used for images.
    pub async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), EnrichmentError> {
        self.with_retries(url, || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| classify_transport(url, &e))?;
            check_status(url, response.status())?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_transport(url, &e))?;
            Ok((bytes.to_vec(), content_type))
        })
        .await
    }

    /// Fetch and parse an RSS/Atom document.
    pub async fn fetch_feed(&self, url: &str) -> Result<feed_rs::model::Feed, EnrichmentError> {
        let default_opts = FetchOptions::default();
        let body = self
            .with_retries(url, || self.plain_get_text(url, &default_opts))
            .await?;
        feed_rs::parser::parse(body.as_bytes()).map_err(|e| {
            EnrichmentError::new(FailureKind::Parse, "fetch_feed", url, format!("unparsable feed document: {e}"))
        })
    }

    /// Fetch a JSON document (Reddit listings, YouTube API).
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, EnrichmentError> {
        let default_opts = FetchOptions::default();
        let body = self
            .with_retries(url, || self.plain_get_text(url, &default_opts))
            .await?;
        serde_json::from_str(&body).map_err(|e| {
            EnrichmentError::new(FailureKind::Parse, "fetch_json", url, format!("invalid JSON: {e}"))
        })
    }

    async fn plain_get_text(&self, url: &str, opts: &FetchOptions) -> Result<String, EnrichmentError> {
        let method = opts.method.clone().unwrap_or(Method::GET);
        let mut request = self.client.request(method, url);
        for (name, value) in &opts.headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_transport(url, &e))?;
        check_status(url, response.status())?;
        response.text().await.map_err(|e| classify_transport(url, &e))
    }

    async fn fetch_rendered(
        &self,
        browser: &BrowserPool,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, EnrichmentError> {
        match browser.render(url, opts.wait_for_selector.as_deref()).await {
            Ok(html) => Ok(html),
            Err(message) => Err(classify_browser_failure(url, &message)),
        }
    }

    /// Retry transient failures with exponential backoff, up to the
    /// configured attempt budget. Non-retryable kinds surface immediately.
    async fn with_retries<T, F, Fut>(&self, url: &str, op: F) -> Result<T, EnrichmentError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, EnrichmentError>>,
    {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: self.config.retry_delay,
            initial_interval: self.config.retry_delay,
            max_interval: self.config.retry_delay * 16,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.kind.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff.next_backoff().unwrap_or(self.config.retry_delay);
                    warn!(url, attempt = attempt + 1, error = %err, "retryable fetch failure, backing off {:?}", delay);
                    tokio::time::sleep(delay).await;
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            EnrichmentError::new(FailureKind::Transient, "fetch", url, "retries exhausted")
        }))
    }
}

/// Map an HTTP status to the error taxonomy. 4xx drops the article,
/// 5xx is retried.
fn check_status(url: &str, status: StatusCode) -> Result<(), EnrichmentError> {
    if status.is_client_error() {
        debug!(url, status = status.as_u16(), "client error response");
        return Err(EnrichmentError::new(
            FailureKind::SkipArticle,
            "fetch",
            url,
            format!("HTTP {status}"),
        )
        .with_status(status.as_u16()));
    }
    if status.is_server_error() {
        return Err(EnrichmentError::new(
            FailureKind::Transient,
            "fetch",
            url,
            format!("HTTP {status}"),
        )
        .with_status(status.as_u16()));
    }
    Ok(())
}

fn classify_transport(url: &str, e: &reqwest::Error) -> EnrichmentError {
    if let Some(status) = e.status() {
        if status.is_client_error() {
            return EnrichmentError::new(FailureKind::SkipArticle, "fetch", url, e.to_string())
                .with_status(status.as_u16());
        }
        if status.is_server_error() {
            return EnrichmentError::new(FailureKind::Transient, "fetch", url, e.to_string())
                .with_status(status.as_u16());
        }
    }
    if e.is_timeout() {
        return EnrichmentError::new(FailureKind::Timeout, "fetch", url, "request timed out");
    }
    if e.is_connect() {
        return EnrichmentError::new(FailureKind::Transient, "fetch", url, format!("connect failure: {e}"));
    }
    EnrichmentError::new(FailureKind::Transient, "fetch", url, e.to_string())
}

/// Browser navigation errors arrive as strings; scan them for an embedded
/// HTTP status. A 4xx anywhere in the message classifies the failure as
/// 4xx even when a 5xx also appears.
pub fn scan_status_code(message: &str) -> Option<u16> {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    let re = STATUS_RE.get_or_init(|| Regex::new(r"\b(40\d|41\d|50\d)\b").expect("static regex"));

    let mut first: Option<u16> = None;
    for m in re.find_iter(message) {
        let code: u16 = match m.as_str().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if (400..500).contains(&code) {
            return Some(code);
        }
        first.get_or_insert(code);
    }
    first
}

fn classify_browser_failure(url: &str, message: &str) -> EnrichmentError {
    match scan_status_code(message) {
        Some(code) if (400..500).contains(&code) => {
            EnrichmentError::new(FailureKind::SkipArticle, "fetch", url, message.to_string()).with_status(code)
        }
        Some(code) => {
            EnrichmentError::new(FailureKind::Transient, "fetch", url, message.to_string()).with_status(code)
        }
        None if message.contains("timed out") || message.contains("timeout") => {
            EnrichmentError::new(FailureKind::Timeout, "fetch", url, message.to_string())
        }
        None => EnrichmentError::new(FailureKind::Transient, "fetch", url, message.to_string()),
    }
}
