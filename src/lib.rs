pub mod aggregator;
pub mod browser;
pub mod config;
pub mod content;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod greader;
pub mod images;
pub mod quota;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::{Config, FetchConfig};
pub use error::{AggregatorError, EnrichmentError, FailureKind, Result};
pub use fetcher::Fetcher;
pub use scheduler::{Engine, EngineConfig, RunSummary, Scheduler};
pub use store::Store;

use crate::aggregator::AggregatorContext;
use crate::content::ContentProcessor;
use crate::enrich::{EnrichmentPipeline, IdentityTransform, TextTransform};
use crate::greader::streams::StreamService;
use crate::greader::AppState;
use crate::images::ImageExtractor;
use crate::store::IconCache;
use std::sync::Arc;
use tracing::warn;

/// Wire the full engine from configuration: store, fetcher (with the
/// optional browser backend), image/content pipeline, engine and the
/// GReader application state.
pub async fn build(config: &Config) -> Result<(Arc<Engine>, AppState, IconCache)> {
    build_with_transform(config, Arc::new(IdentityTransform)).await
}

pub async fn build_with_transform(
    config: &Config,
    transform: Arc<dyn TextTransform>,
) -> Result<(Arc<Engine>, AppState, IconCache)> {
    let store = Arc::new(Store::connect(&config.database_url).await?);

    let mut fetcher = Fetcher::new(config.fetch_config());
    if config.browser_enabled {
        match browser::BrowserPool::launch(
            config.browser_max_pages,
            std::time::Duration::from_secs(config.browser_nav_timeout_seconds),
            std::time::Duration::from_secs(config.browser_selector_timeout_seconds),
        )
        .await
        {
            Ok(pool) => fetcher = fetcher.with_browser(pool),
            Err(e) => warn!(error = %e, "browser launch failed, continuing with plain HTTP"),
        }
    }
    let fetcher = Arc::new(fetcher);

    let images = Arc::new(ImageExtractor::new(fetcher.clone()));
    let processor = Arc::new(ContentProcessor::new(images.clone()));
    let enrichment = Arc::new(EnrichmentPipeline::new(
        processor.clone(),
        images.clone(),
        config.cache_max_age_days,
    ));
    let icon_cache = IconCache::new(&config.icon_cache_dir, config.cache_max_age_days)?;

    let ctx = AggregatorContext {
        fetcher,
        images,
        store: store.clone(),
        youtube_api_key: config.youtube_api_key.clone(),
    };

    let engine = Arc::new(Engine::new(
        ctx,
        enrichment,
        processor,
        icon_cache.clone(),
        transform,
        EngineConfig {
            article_concurrency: config.article_concurrency,
            run_deadline: std::time::Duration::from_secs(config.run_deadline_seconds),
            cache_max_age_days: config.cache_max_age_days,
        },
    ));

    let state = AppState {
        store: store.clone(),
        streams: Arc::new(StreamService::new(store)),
        engine: engine.clone(),
        token_ttl_days: config.token_ttl_days,
    };

    Ok((engine, state, icon_cache))
}
