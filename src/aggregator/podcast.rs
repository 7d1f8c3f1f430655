use super::{raw_from_entry, validate_http_url, AggregatorContext, SourceAggregator, SourceData};
use crate::error::{EnrichmentError, FailureKind, Result};
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;

/// Podcast aggregator: an RSS feed whose entries carry audio enclosures.
/// Content is synthesized locally from the show notes plus an audio
/// element; no episode page is fetched.
pub struct PodcastAggregator;

#[async_trait]
impl SourceAggregator for PodcastAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::Podcast
    }

    fn display_name(&self) -> &'static str {
        "Podcast"
    }

    async fn validate(&self, _ctx: &AggregatorContext, identifier: &str) -> Result<String> {
        validate_http_url(identifier)
    }

    async fn fetch_source_data(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        _limit: usize,
    ) -> std::result::Result<SourceData, EnrichmentError> {
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
        // Episodes without an enclosure are announcements, not episodes.
        Ok(parsed
            .entries
            .iter()
            .filter_map(raw_from_entry)
            .filter(|raw| raw.media_url.is_some())
            .collect())
    }

    async fn fetch_article_content(
        &self,
        _ctx: &AggregatorContext,
        _feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        let notes = raw.summary.clone().unwrap_or_default();
        let player = match (&raw.media_url, &raw.media_type) {
            (Some(media_url), Some(media_type)) => format!(
                "<p><audio controls preload=\"none\"><source src=\"{media_url}\" type=\"{media_type}\"></audio></p>"
            ),
            (Some(media_url), None) => {
                format!("<p><audio controls preload=\"none\" src=\"{media_url}\"></audio></p>")
            }
            _ => String::new(),
        };
        Ok(format!("{player}{notes}"))
    }

    fn extract_content(
        &self,
        _feed: &Feed,
        _raw: &RawArticle,
        html: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(html.to_string())
    }
}
