use super::{raw_from_entry, validate_http_url, AggregatorContext, SourceAggregator, SourceData};
use crate::error::{EnrichmentError, FailureKind, Result};
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;
use tracing::debug;

/// Generic website aggregator: lists via the site's RSS/Atom feed, then
/// fetches and extracts every article page for its full content.
pub struct FullWebsiteAggregator;

#[async_trait]
impl SourceAggregator for FullWebsiteAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::FullWebsite
    }

    fn display_name(&self) -> &'static str {
        "Full website"
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
        debug!(feed_id = feed.id, limit, "fetching site feed document");
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

    /// Let the processor's in-content heuristics pick the header image
    /// from the fetched page rather than trusting feed thumbnails.
    fn header_image_url(&self, _feed: &Feed, _raw: &RawArticle) -> Option<String> {
        None
    }
}
