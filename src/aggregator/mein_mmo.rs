use super::{raw_from_entry, validate_http_url, AggregatorContext, SourceAggregator, SourceData};
use crate::error::{EnrichmentError, FailureKind, Result};
use crate::fetcher::FetchOptions;
use crate::images::strategies::resolve_url;
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info};

/// MeinMMO aggregator. Long articles are split across numbered pages;
/// with `traverse_multipage` the content fetch walks every page and
/// concatenates the entry-content blocks before extraction.
pub struct MeinMmoAggregator;

const CONTENT_SELECTOR: &str = "div.entry-content";
const PAGINATION_SELECTOR: &str = "div.page-links a[href]";

#[async_trait]
impl SourceAggregator for MeinMmoAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::MeinMmo
    }

    fn display_name(&self) -> &'static str {
        "MeinMMO"
    }

    fn prefill_name(&self) -> Option<&'static str> {
        Some("MeinMMO")
    }

    fn selectors_to_remove(&self) -> &[&'static str] {
        &[
            "div.advert",
            "div.mmo-widget",
            "div.newsletter-box",
            "div.related-posts",
            "div.page-links",
            "aside",
        ]
    }

    async fn validate(&self, _ctx: &AggregatorContext, identifier: &str) -> Result<String> {
        if identifier.trim().is_empty() {
            return Ok("https://mein-mmo.de/feed/".to_string());
        }
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
        Ok(parsed.entries.iter().filter_map(raw_from_entry).collect())
    }

    async fn fetch_article_content(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        let first_page = ctx.fetcher.fetch_html(&raw.url, &FetchOptions::default()).await?;
        let further_pages = pagination_urls(&first_page, &raw.url);

        if further_pages.is_empty() {
            return Ok(first_page);
        }

        if !feed.options.traverse_multipage {
            info!(url = %raw.url, pages = further_pages.len() + 1, "multipage article detected, traversal disabled");
            return Ok(first_page);
        }

        // Pages are fetched one after another to match the source's
        // pagination ordering.
        let mut blocks = vec![content_block(&first_page).unwrap_or_else(|| first_page.clone())];
        for page_url in &further_pages {
            debug!(page_url = %page_url, "fetching continuation page");
            let page_html = ctx.fetcher.fetch_html(page_url, &FetchOptions::default()).await?;
            if let Some(block) = content_block(&page_html) {
                blocks.push(block);
            }
        }

        Ok(format!("<article>{}</article>", blocks.join("")))
    }

    /// Single pages reduce to their entry-content block; traversed
    /// articles arrive pre-wrapped and fall through to the generic path.
    fn extract_content(
        &self,
        _feed: &Feed,
        raw: &RawArticle,
        html: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        if let Some(block) = content_block(html) {
            return Ok(block);
        }
        Ok(super::default_extract(html, &raw.url))
    }

    fn header_image_url(&self, _feed: &Feed, _raw: &RawArticle) -> Option<String> {
        None
    }
}

/// First entry-content block of a page.
fn content_block(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(CONTENT_SELECTOR).expect("static selector");
    doc.select(&sel).next().map(|el| el.inner_html())
}

/// Distinct continuation-page URLs from the pagination block, in
/// document order, excluding the page itself.
pub fn pagination_urls(html: &str, base_url: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(PAGINATION_SELECTOR).expect("static selector");

    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for anchor in doc.select(&sel) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let Some(resolved) = resolve_url(base_url, href) else { continue };
        if resolved.trim_end_matches('/') == base_url.trim_end_matches('/') {
            continue;
        }
        if seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }
    urls
}
