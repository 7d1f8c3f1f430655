use thiserror::Error;

/// Classified failure taxonomy used throughout ingestion.
///
/// Every failing step maps to exactly one kind; the kind decides the
/// recovery action in the enrichment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad user input at write time. Surfaced to the caller, nothing persisted.
    Validation,
    /// Network failures, 5xx responses. Retried with backoff.
    Transient,
    /// Timed-out or aborted request. Treated like Transient with bounded retries.
    Timeout,
    /// A 4xx response while fetching article content or subsidiary resources.
    /// Drops the article from the run, never the run itself.
    SkipArticle,
    /// Source document is syntactically broken.
    Parse,
    /// Database down, disk full, misconfigured plugin. Aborts the run.
    Fatal,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::Timeout)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Validation => "validation",
            FailureKind::Transient => "transient",
            FailureKind::Timeout => "timeout",
            FailureKind::SkipArticle => "skip-article",
            FailureKind::Parse => "parse",
            FailureKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Error record produced by the per-article enrichment steps.
///
/// Carries enough context that a `warn!` at the point of recovery can name
/// the step, feed and url without the caller re-deriving them.
#[derive(Debug, Clone, Error)]
#[error("{kind} failure in step `{step}` for {url}: {reason}")]
pub struct EnrichmentError {
    pub kind: FailureKind,
    pub step: &'static str,
    pub url: String,
    pub feed_id: i64,
    pub status: Option<u16>,
    pub reason: String,
}

impl EnrichmentError {
    pub fn new(kind: FailureKind, step: &'static str, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            step,
            url: url.into(),
            feed_id: 0,
            status: None,
            reason: reason.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_feed(mut self, feed_id: i64) -> Self {
        self.feed_id = feed_id;
        self
    }

    /// Re-tag the originating step, keeping everything else.
    pub fn at_step(mut self, step: &'static str) -> Self {
        self.step = step;
        self
    }

    pub fn is_skip(&self) -> bool {
        self.kind == FailureKind::SkipArticle
    }
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("feed not found: {id}")]
    FeedNotFound { id: i64 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error("image error: {0}")]
    Image(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

impl From<image::ImageError> for AggregatorError {
    fn from(e: image::ImageError) -> Self {
        AggregatorError::Image(e.to_string())
    }
}
