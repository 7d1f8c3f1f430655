use super::{raw_from_entry, validate_http_url, AggregatorContext, SourceAggregator, SourceData};
use crate::error::{EnrichmentError, FailureKind, Result};
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;
use tracing::debug;

/// RSS/Atom aggregator that trusts the feed's own content instead of
/// fetching article pages. The cheapest kind; the processor still
/// standardizes whatever the feed delivered.
pub struct FeedContentAggregator;

#[async_trait]
impl SourceAggregator for FeedContentAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::FeedContent
    }

    fn display_name(&self) -> &'static str {
        "Feed content"
    }

    async fn validate(&self, _ctx: &AggregatorContext, identifier: &str) -> Result<String> {
        validate_http_url(identifier)
    }

    async fn fetch_source_data(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        limit: usize,
    ) -> std::result::Result<SourceData, EnrichmentError> {
        debug!(feed_id = feed.id, limit, "fetching feed document");
        let parsed = ctx.fetcher.fetch_feed(&feed.identifier).await?;
        Ok(SourceData::Feed(Box::new(parsed)))
    }

    fn parse_to_raw_articles(
        &self,
        feed: &Feed,
        data: &SourceData,
    ) -> std::result::Result<Vec<RawArticle>, EnrichmentError> {
        let SourceData::Feed(parsed) = data else {
            return Err(EnrichmentError::new(
                FailureKind::Parse,
                "parse_to_raw_articles",
                &feed.identifier,
                "expected a parsed feed document",
            ));
        };
        Ok(parsed.entries.iter().filter_map(raw_from_entry).collect())
    }

    /// The feed body IS the article; no article-page fetch happens.
    async fn fetch_article_content(
        &self,
        _ctx: &AggregatorContext,
        _feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(raw.summary.clone().unwrap_or_default())
    }

    /// Feed-provided fragments need no page-level extraction.
    fn extract_content(
        &self,
        _feed: &Feed,
        _raw: &RawArticle,
        html: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(html.to_string())
    }
}
