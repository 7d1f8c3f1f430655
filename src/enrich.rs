use crate::aggregator::{AggregatorContext, SourceAggregator};
use crate::content::rules::parse_rules;
use crate::content::{ContentProcessor, ProcessOptions};
use crate::error::{EnrichmentError, FailureKind, Result};
use crate::images::{ExtractOptions, ImageExtractor};
use crate::types::{AiHints, Feed, RawArticle};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of enriching one raw article.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub content: String,
    pub from_cache: bool,
    /// Compressed thumbnail data URI, when one could be derived.
    pub thumbnail: Option<String>,
}

/// Pluggable post-processing seam for the AI hints carried on a feed.
/// The engine invokes it after standardization; the default passes text
/// through untouched.
#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn apply(&self, hints: &AiHints, content: &str) -> Result<String>;
}

pub struct IdentityTransform;

#[async_trait]
impl TextTransform for IdentityTransform {
    async fn apply(&self, _hints: &AiHints, content: &str) -> Result<String> {
        Ok(content.to_string())
    }
}

/// Per-article orchestrator: cache → fetch → extract → validate →
/// process → images, each step with its own recovery policy. The only
/// error that escapes is `SkipArticle`; everything else either falls
/// back or is wrapped as a terminal failure of the step it hit.
pub struct EnrichmentPipeline {
    processor: Arc<ContentProcessor>,
    images: Arc<ImageExtractor>,
    cache_max_age_days: i64,
}

impl EnrichmentPipeline {
    pub fn new(processor: Arc<ContentProcessor>, images: Arc<ImageExtractor>, cache_max_age_days: i64) -> Self {
        Self { processor, images, cache_max_age_days }
    }

    pub async fn run(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        raw: &RawArticle,
        aggregator: &dyn SourceAggregator,
        force_refresh: bool,
    ) -> std::result::Result<Option<Enriched>, EnrichmentError> {
        if !aggregator.should_fetch_content(feed, raw) {
            debug!(url = %raw.url, "aggregator declined content fetch");
            return Ok(None);
        }

        // Cache consultation failures are misses, never errors. A forced
        // run always refetches.
        let cached = if force_refresh {
            None
        } else {
            match ctx.store.cached_content(&raw.url, self.cache_max_age_days).await {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(step = "get_cached_content", feed_id = feed.id, url = %raw.url, error = %e, "cache lookup failed");
                    None
                }
            }
        };
        let from_cache = cached.is_some();

        let html = match cached {
            Some(html) => html,
            None => match aggregator.fetch_article_content(ctx, feed, raw).await {
                Ok(html) => {
                    if let Err(e) = ctx.store.cache_content(&raw.url, &html).await {
                        warn!(step = "cache_content", feed_id = feed.id, url = %raw.url, error = %e, "content cache write failed");
                    }
                    html
                }
                Err(e) if e.is_skip() => {
                    return Err(e.at_step("fetch_article_content").with_feed(feed.id));
                }
                Err(e) => match &raw.summary {
                    Some(summary) if !summary.trim().is_empty() => {
                        warn!(step = "fetch_article_content", aggregator = %feed.kind, feed_id = feed.id, url = %raw.url, error = %e, "fetch failed, falling back to feed summary");
                        summary.clone()
                    }
                    _ => {
                        warn!(step = "fetch_article_content", aggregator = %feed.kind, feed_id = feed.id, url = %raw.url, error = %e, "fetch failed with no summary fallback");
                        return Err(EnrichmentError {
                            kind: FailureKind::SkipArticle,
                            step: "fetch_article_content",
                            url: raw.url.clone(),
                            feed_id: feed.id,
                            status: e.status,
                            reason: format!("unfetchable and no summary fallback: {}", e.reason),
                        });
                    }
                },
            },
        };

        let extracted = match aggregator.extract_content(feed, raw, &html) {
            Ok(extracted) => extracted,
            Err(e) if e.is_skip() => return Err(e.at_step("extract_content").with_feed(feed.id)),
            Err(e) => {
                warn!(step = "extract_content", aggregator = %feed.kind, feed_id = feed.id, url = %raw.url, error = %e, "extraction failed, using original document");
                html.clone()
            }
        };

        if !aggregator.validate_content(&extracted) {
            debug!(url = %raw.url, "content failed validation");
            return Err(EnrichmentError::new(
                FailureKind::SkipArticle,
                "validate_content",
                &raw.url,
                "extracted content failed validation",
            )
            .with_feed(feed.id));
        }

        let opts = self.process_options(feed, raw, aggregator);
        let processed = match self.processor.process(&extracted, &opts).await {
            Ok(processed) => processed,
            Err(e) if e.is_skip() => return Err(e.at_step("process_content").with_feed(feed.id)),
            Err(e) => {
                // The processor already falls back internally; this arm
                // catches failures in the fallback path itself.
                warn!(step = "process_content", aggregator = %feed.kind, feed_id = feed.id, url = %raw.url, error = %e, "processing failed, keeping extracted HTML");
                extracted.clone()
            }
        };

        let thumbnail = match self.extract_thumbnail(raw).await {
            Ok(thumbnail) => thumbnail,
            Err(e) if e.is_skip() => return Err(e.at_step("extract_images").with_feed(feed.id)),
            Err(e) => {
                warn!(step = "extract_images", aggregator = %feed.kind, feed_id = feed.id, url = %raw.url, error = %e, "thumbnail extraction failed");
                None
            }
        };

        Ok(Some(Enriched { content: processed, from_cache, thumbnail }))
    }

    /// Optional step: compress the source-provided thumbnail for inline
    /// storage.
    async fn extract_thumbnail(&self, raw: &RawArticle) -> std::result::Result<Option<String>, EnrichmentError> {
        let Some(thumb_url) = &raw.thumbnail_url else {
            return Ok(None);
        };
        if thumb_url.starts_with("data:") {
            return Ok(Some(thumb_url.clone()));
        }
        let image = self
            .images
            .extract(thumb_url, &ExtractOptions { is_header: false, page_html: None })
            .await?;
        Ok(image.map(|img| img.to_data_uri()))
    }

    fn process_options(&self, feed: &Feed, raw: &RawArticle, aggregator: &dyn SourceAggregator) -> ProcessOptions {
        let mut selectors: Vec<String> = aggregator
            .selectors_to_remove()
            .iter()
            .map(|s| s.to_string())
            .collect();
        selectors.extend(feed.options.exclude_selectors.iter().cloned());

        ProcessOptions {
            article_url: raw.url.clone(),
            header_image_url: aggregator.header_image_url(feed, raw),
            generate_title_image: feed.options.generate_title_image,
            add_source_footer: feed.options.add_source_footer,
            selectors_to_remove: selectors,
            regex_rules: feed
                .options
                .regex_replacements
                .as_deref()
                .map(parse_rules)
                .unwrap_or_default(),
        }
    }
}
