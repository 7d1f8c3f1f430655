use crate::aggregator::{registry, AggregatorContext, SourceAggregator};
use crate::content::{ContentProcessor, ProcessOptions};
use crate::enrich::{EnrichmentPipeline, TextTransform};
use crate::error::{AggregatorError, Result};
use crate::quota::dynamic_daily_limit;
use crate::store::{IconCache, NewArticle, PersistOutcome, Store};
use crate::types::{canonicalize_url, Feed, RawArticle};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub article_concurrency: usize,
    pub run_deadline: Duration,
    pub cache_max_age_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            article_concurrency: 4,
            run_deadline: Duration::from_secs(600),
            cache_max_age_days: 7,
        }
    }
}

/// Outcome of one aggregation run, mirrored into the run record.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: Option<Uuid>,
    pub success: bool,
    pub reason: Option<String>,
    pub fetched: usize,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub errored: i64,
}

enum ArticleOutcome {
    Inserted,
    Updated,
    Skipped,
    Errored,
}

/// Drives the aggregator template flow: validate → list → parse → filter
/// → quota cap → per-article enrichment fan-out → persistence → icon.
/// One engine serves every feed; per-feed mutexes prevent overlapping
/// runs of the same feed.
pub struct Engine {
    ctx: AggregatorContext,
    enrichment: Arc<EnrichmentPipeline>,
    processor: Arc<ContentProcessor>,
    icon_cache: IconCache,
    transform: Arc<dyn TextTransform>,
    feed_locks: DashMap<i64, Arc<Mutex<()>>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        ctx: AggregatorContext,
        enrichment: Arc<EnrichmentPipeline>,
        processor: Arc<ContentProcessor>,
        icon_cache: IconCache,
        transform: Arc<dyn TextTransform>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ctx,
            enrichment,
            processor,
            icon_cache,
            transform,
            feed_locks: DashMap::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.ctx.store
    }

    /// Validate an identifier for a kind, returning its canonical form.
    /// Used at feed-creation time.
    pub async fn validate_identifier(&self, kind: crate::types::FeedKind, identifier: &str) -> Result<String> {
        registry::create(kind).validate(&self.ctx, identifier).await
    }

    /// Run one aggregation for a feed. Concurrent runs of the same feed
    /// serialize on a per-feed mutex.
    pub async fn run_feed(&self, feed_id: i64, force_refresh: bool) -> Result<RunSummary> {
        let lock = self
            .feed_locks
            .entry(feed_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let feed = self.ctx.store.get_feed(feed_id).await?;
        if !feed.enabled && !force_refresh {
            return Err(AggregatorError::Validation(format!("feed {feed_id} is disabled")));
        }

        let run_id = self.ctx.store.start_run(feed_id).await?;
        info!(feed_id, kind = feed.kind.as_str(), force_refresh, "aggregation run started");

        let mut summary = match self.execute(&feed, force_refresh).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(feed_id, error = %e, "aggregation run failed");
                RunSummary {
                    success: false,
                    reason: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        summary.run_id = Some(run_id);

        self.ctx
            .store
            .finish_run(
                run_id,
                summary.success,
                summary.reason.as_deref(),
                summary.inserted,
                summary.updated,
                summary.skipped,
                summary.errored,
            )
            .await?;

        info!(
            feed_id,
            success = summary.success,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            errored = summary.errored,
            "aggregation run finished"
        );
        Ok(summary)
    }

    async fn execute(&self, feed: &Feed, force_refresh: bool) -> Result<RunSummary> {
        let aggregator = registry::create(feed.kind);
        let deadline = tokio::time::Instant::now() + self.config.run_deadline;

        let canonical = aggregator.validate(&self.ctx, &feed.identifier).await?;
        if canonical != feed.identifier {
            debug!(feed_id = feed.id, canonical = %canonical, "identifier normalizes differently");
        }

        let (posts_today, last_post) = self.ctx.store.posts_today(feed.id).await?;
        let limit = dynamic_daily_limit(
            feed.options.daily_post_limit,
            posts_today,
            Utc::now(),
            last_post,
            force_refresh,
        );
        if limit == 0 {
            debug!(feed_id = feed.id, "daily quota exhausted or feed disabled by limit");
            return Ok(RunSummary {
                success: true,
                reason: Some("daily quota exhausted".to_string()),
                ..Default::default()
            });
        }

        let data = aggregator.fetch_source_data(&self.ctx, feed, limit as usize).await?;
        let parsed = aggregator.parse_to_raw_articles(feed, &data)?;
        let filtered = aggregator.apply_article_filters(feed, parsed);

        let mut capped = dedup_batch(filtered);
        capped.truncate(limit as usize);
        let fetched = capped.len();
        debug!(feed_id = feed.id, fetched, limit, "articles selected for enrichment");

        let feed = Arc::new(feed.clone());
        let gate = Arc::new(Semaphore::new(self.config.article_concurrency.max(1)));
        let mut tasks: JoinSet<ArticleOutcome> = JoinSet::new();

        for raw in capped {
            let gate = gate.clone();
            let ctx = self.ctx.clone();
            let enrichment = self.enrichment.clone();
            let processor = self.processor.clone();
            let transform = self.transform.clone();
            let aggregator = aggregator.clone();
            let feed = feed.clone();

            tasks.spawn(async move {
                let _permit = match gate.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return ArticleOutcome::Errored,
                };
                enrich_and_persist(ctx, enrichment, processor, transform, aggregator, feed, raw, force_refresh, deadline)
                    .await
            });
        }

        let mut summary = RunSummary { success: true, fetched, ..Default::default() };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ArticleOutcome::Inserted) => summary.inserted += 1,
                Ok(ArticleOutcome::Updated) => summary.updated += 1,
                Ok(ArticleOutcome::Skipped) => summary.skipped += 1,
                Ok(ArticleOutcome::Errored) => summary.errored += 1,
                Err(e) => {
                    error!(feed_id = feed.id, error = %e, "enrichment task panicked");
                    summary.errored += 1;
                }
            }
        }

        self.maybe_collect_icon(&feed, aggregator.as_ref(), &summary).await;
        Ok(summary)
    }

    /// Icons are only collected when the feed has none; the disk cache
    /// stops repeated attempts for icons that keep failing.
    async fn maybe_collect_icon(&self, feed: &Feed, aggregator: &dyn SourceAggregator, summary: &RunSummary) {
        if feed.icon.is_some() || (summary.inserted == 0 && summary.updated == 0) {
            return;
        }
        if !self.icon_cache.should_fetch(&feed.identifier) {
            return;
        }
        match aggregator.collect_feed_icon(&self.ctx, feed).await {
            Ok(Some(icon)) => {
                if let Err(e) = self.ctx.store.set_feed_icon(feed.id, &icon).await {
                    warn!(feed_id = feed.id, error = %e, "storing feed icon failed");
                }
                if let Err(e) = self.icon_cache.mark_fetched(&feed.identifier) {
                    warn!(feed_id = feed.id, error = %e, "icon cache write failed");
                }
            }
            Ok(None) => debug!(feed_id = feed.id, "no feed icon found"),
            Err(e) => warn!(feed_id = feed.id, error = %e, "feed icon collection failed"),
        }
    }
}

/// The aggregator must not emit duplicate URLs in one batch; collapse
/// them here so two concurrent enrichments never race on one article.
fn dedup_batch(articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|raw| seen.insert(canonicalize_url(&raw.url)))
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn enrich_and_persist(
    ctx: AggregatorContext,
    enrichment: Arc<EnrichmentPipeline>,
    processor: Arc<ContentProcessor>,
    transform: Arc<dyn TextTransform>,
    aggregator: Arc<dyn SourceAggregator>,
    feed: Arc<Feed>,
    raw: RawArticle,
    force_refresh: bool,
    deadline: tokio::time::Instant,
) -> ArticleOutcome {
    // Cheap pre-check so known URLs skip the whole pipeline when the
    // feed opts into it.
    if feed.options.skip_duplicates && !force_refresh {
        match ctx.store.article_exists(feed.id, &raw.url).await {
            Ok(true) => {
                debug!(url = %raw.url, "known URL, skipping enrichment");
                return ArticleOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => warn!(url = %raw.url, error = %e, "duplicate pre-check failed"),
        }
    }

    let enriched = match tokio::time::timeout_at(
        deadline,
        enrichment.run(&ctx, &feed, &raw, aggregator.as_ref(), force_refresh),
    )
    .await
    {
        Err(_) => {
            warn!(
                step = "enrich",
                aggregator = feed.kind.as_str(),
                feed_id = feed.id,
                url = %raw.url,
                "run deadline reached, abandoning article"
            );
            return ArticleOutcome::Errored;
        }
        Ok(Err(e)) if e.is_skip() => {
            warn!(
                step = e.step,
                aggregator = feed.kind.as_str(),
                feed_id = feed.id,
                url = %raw.url,
                status = e.status,
                "article skipped"
            );
            return ArticleOutcome::Skipped;
        }
        Ok(Err(e)) => {
            warn!(
                step = e.step,
                aggregator = feed.kind.as_str(),
                feed_id = feed.id,
                url = %raw.url,
                error = %e,
                "article enrichment failed"
            );
            return ArticleOutcome::Errored;
        }
        Ok(Ok(enriched)) => enriched,
    };

    let (content, thumbnail) = match enriched {
        Some(enriched) => {
            let thumb = enriched.thumbnail.clone().or_else(|| raw.thumbnail_url.clone());
            (enriched.content, thumb)
        }
        // The aggregator declined the fetch: standardize the feed
        // summary instead, without header synthesis.
        None => {
            let opts = ProcessOptions {
                article_url: raw.url.clone(),
                add_source_footer: feed.options.add_source_footer,
                generate_title_image: false,
                ..Default::default()
            };
            let summary = raw.summary.clone().unwrap_or_default();
            match processor.process(&summary, &opts).await {
                Ok(content) => (content, raw.thumbnail_url.clone()),
                Err(e) => {
                    warn!(url = %raw.url, error = %e, "summary standardization failed");
                    return ArticleOutcome::Skipped;
                }
            }
        }
    };

    let content = if feed.ai_hints.is_empty() {
        content
    } else {
        match transform.apply(&feed.ai_hints, &content).await {
            Ok(transformed) => transformed,
            Err(e) => {
                warn!(url = %raw.url, error = %e, "text transform failed, keeping original");
                content
            }
        }
    };

    let date = if feed.options.use_current_timestamp {
        Utc::now()
    } else {
        raw.published.unwrap_or_else(Utc::now)
    };

    let new = NewArticle {
        feed_id: feed.id,
        url: raw.url.clone(),
        name: raw.title.clone(),
        content,
        date,
        author: raw.author.clone(),
        external_id: raw.external_id.clone(),
        thumbnail_url: thumbnail,
        media_url: raw.media_url.clone(),
        media_type: raw.media_type.clone(),
    };

    match ctx.store.persist_article(&feed, new, force_refresh).await {
        Ok(PersistOutcome::Inserted(_)) => ArticleOutcome::Inserted,
        Ok(PersistOutcome::Updated(_)) => ArticleOutcome::Updated,
        Ok(PersistOutcome::SkippedRead) | Ok(PersistOutcome::SkippedRecentTitle) => ArticleOutcome::Skipped,
        Err(e) => {
            error!(url = %raw.url, error = %e, "article persistence failed");
            ArticleOutcome::Errored
        }
    }
}

/// Periodic dispatcher: every tick, runs due feeds through the engine
/// under a process-wide concurrency bound, then sweeps the caches.
pub struct Scheduler {
    engine: Arc<Engine>,
    icon_cache: IconCache,
    interval: Duration,
    workers: Arc<Semaphore>,
    cache_max_age_days: i64,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, icon_cache: IconCache, interval: Duration, worker_concurrency: usize, cache_max_age_days: i64) -> Self {
        Self {
            engine,
            icon_cache,
            interval,
            workers: Arc::new(Semaphore::new(worker_concurrency.max(1))),
            cache_max_age_days,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_due_feeds().await;
                self.sweep_caches().await;
            }
        })
    }

    async fn run_due_feeds(&self) {
        let feeds = match self.engine.store().list_enabled_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!(error = %e, "listing feeds for scheduling failed");
                return;
            }
        };
        debug!(count = feeds.len(), "scheduler pass");

        for feed in feeds {
            let engine = self.engine.clone();
            let workers = self.workers.clone();
            tokio::spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Err(e) = engine.run_feed(feed.id, false).await {
                    warn!(feed_id = feed.id, error = %e, "scheduled run failed");
                }
            });
        }
    }

    async fn sweep_caches(&self) {
        if let Err(e) = self.engine.store().evict_stale_content(self.cache_max_age_days).await {
            warn!(error = %e, "content cache sweep failed");
        }
        if let Err(e) = self.icon_cache.sweep() {
            warn!(error = %e, "icon cache sweep failed");
        }
        if let Err(e) = self.engine.store().purge_expired_tokens().await {
            warn!(error = %e, "token purge failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_dedup_collapses_equivalent_urls() {
        let raws = vec![
            RawArticle { url: "http://x/a".to_string(), title: "a".to_string(), ..Default::default() },
            RawArticle { url: "http://x/a/".to_string(), title: "a again".to_string(), ..Default::default() },
            RawArticle { url: "http://x/b".to_string(), title: "b".to_string(), ..Default::default() },
        ];
        let deduped = dedup_batch(raws);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "a");
    }
}
