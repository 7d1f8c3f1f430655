use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration. Every flag can also come from the environment,
/// so container deployments configure the engine without a command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "yana", about = "Content aggregator with a Google Reader compatible API")]
pub struct Config {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://yana.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "YANA_BIND", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "YANA_ICON_CACHE_DIR", default_value = "./cache/icons")]
    pub icon_cache_dir: PathBuf,

    /// Minutes between scheduler passes over due feeds.
    #[arg(long, env = "YANA_SCHEDULE_INTERVAL_MINUTES", default_value_t = 15)]
    pub schedule_interval_minutes: u64,

    /// Upper bound on concurrently running feed aggregations.
    /// Defaults to twice the core count when 0.
    #[arg(long, env = "YANA_WORKER_CONCURRENCY", default_value_t = 0)]
    pub worker_concurrency: usize,

    /// Concurrent article enrichments per feed run.
    #[arg(long, env = "YANA_ARTICLE_CONCURRENCY", default_value_t = 4)]
    pub article_concurrency: usize,

    /// Wall-clock budget for one aggregation run, in seconds.
    #[arg(long, env = "YANA_RUN_DEADLINE_SECONDS", default_value_t = 600)]
    pub run_deadline_seconds: u64,

    #[arg(long, env = "YANA_HTTP_TIMEOUT_SECONDS", default_value_t = 30)]
    pub http_timeout_seconds: u64,

    #[arg(long, env = "YANA_HTTP_MAX_REDIRECTS", default_value_t = 10)]
    pub http_max_redirects: usize,

    #[arg(long, env = "YANA_HTTP_MAX_RETRIES", default_value_t = 3)]
    pub http_max_retries: u32,

    #[arg(long, env = "YANA_HTTP_RETRY_DELAY_SECONDS", default_value_t = 2)]
    pub http_retry_delay_seconds: u64,

    #[arg(long, env = "YANA_USER_AGENT", default_value = "Yana/1.0 (+https://github.com/yana)")]
    pub user_agent: String,

    /// Enable the headless-browser backend. When off, browser fetches
    /// degrade to plain HTTP with a warning.
    #[arg(long, env = "YANA_BROWSER_ENABLED", default_value_t = false)]
    pub browser_enabled: bool,

    /// Concurrent pages on the shared browser instance.
    #[arg(long, env = "YANA_BROWSER_MAX_PAGES", default_value_t = 4)]
    pub browser_max_pages: usize,

    #[arg(long, env = "YANA_BROWSER_NAV_TIMEOUT_SECONDS", default_value_t = 30)]
    pub browser_nav_timeout_seconds: u64,

    /// Sub-timeout for `wait_for_selector`, in seconds.
    #[arg(long, env = "YANA_BROWSER_SELECTOR_TIMEOUT_SECONDS", default_value_t = 10)]
    pub browser_selector_timeout_seconds: u64,

    #[arg(long, env = "YANA_YOUTUBE_API_KEY")]
    pub youtube_api_key: Option<String>,

    /// Days a cached page or icon stays valid before eviction.
    #[arg(long, env = "YANA_CACHE_MAX_AGE_DAYS", default_value_t = 7)]
    pub cache_max_age_days: i64,

    /// Auth token lifetime in days.
    #[arg(long, env = "YANA_TOKEN_TTL_DAYS", default_value_t = 30)]
    pub token_ttl_days: i64,
}

impl Config {
    pub fn effective_worker_concurrency(&self) -> usize {
        if self.worker_concurrency > 0 {
            return self.worker_concurrency;
        }
        std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(4)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: self.http_timeout(),
            max_retries: self.http_max_retries,
            retry_delay: Duration::from_secs(self.http_retry_delay_seconds),
            max_redirects: self.http_max_redirects,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["yana"])
    }
}

/// Knobs for the plain-HTTP backend.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Yana/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            max_redirects: 10,
        }
    }
}
