pub mod feed_content;
pub mod full_website;
pub mod mein_mmo;
pub mod podcast;
pub mod reddit;
pub mod registry;
pub mod sites;
pub mod youtube;

use crate::error::{EnrichmentError, FailureKind, Result};
use crate::fetcher::{FetchOptions, Fetcher};
use crate::images::ImageExtractor;
use crate::store::Store;
use crate::types::{Feed, FeedKind, OptionDescriptor, OptionType, OptionWidget, RawArticle};
use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;

/// Shared collaborators handed to every aggregator call.
#[derive(Clone)]
pub struct AggregatorContext {
    pub fetcher: Arc<Fetcher>,
    pub images: Arc<ImageExtractor>,
    pub store: Arc<Store>,
    pub youtube_api_key: Option<String>,
}

/// What `fetch_source_data` hands to `parse_to_raw_articles`.
pub enum SourceData {
    Feed(Box<feed_rs::model::Feed>),
    Json(serde_json::Value),
    Raw(Vec<RawArticle>),
}

/// One source plugin. The template flow in the engine calls the slots in
/// a fixed order; concrete kinds fill in listing and parsing and override
/// the enrichment hooks where the source needs special handling.
#[async_trait]
pub trait SourceAggregator: Send + Sync {
    fn kind(&self) -> FeedKind;
    fn display_name(&self) -> &'static str;

    fn identifier_editable(&self) -> bool {
        true
    }

    fn prefill_name(&self) -> Option<&'static str> {
        None
    }

    /// Options this kind supports, for admin-UI rendering.
    fn options(&self) -> Vec<OptionDescriptor> {
        common_options()
    }

    /// Selector the browser must see before capturing the page.
    fn wait_for_selector(&self) -> Option<&'static str> {
        None
    }

    /// Base removal list, merged with the feed's configured selectors.
    fn selectors_to_remove(&self) -> &[&'static str] {
        &[]
    }

    fn needs_browser(&self) -> bool {
        false
    }

    /// Check and canonicalize the identifier at feed-creation time.
    async fn validate(&self, ctx: &AggregatorContext, identifier: &str) -> Result<String>;

    /// List the source into memory, bounded by the dynamic daily limit.
    async fn fetch_source_data(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        limit: usize,
    ) -> std::result::Result<SourceData, EnrichmentError>;

    fn parse_to_raw_articles(
        &self,
        feed: &Feed,
        data: &SourceData,
    ) -> std::result::Result<Vec<RawArticle>, EnrichmentError>;

    /// Filter hook; the default applies the ignore lists from feed options.
    fn apply_article_filters(&self, feed: &Feed, articles: Vec<RawArticle>) -> Vec<RawArticle> {
        apply_ignore_filters(feed, articles)
    }

    // Enrichment hooks, called by the pipeline.

    fn should_fetch_content(&self, _feed: &Feed, _raw: &RawArticle) -> bool {
        true
    }

    async fn fetch_article_content(
        &self,
        ctx: &AggregatorContext,
        _feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        let opts = if self.needs_browser() {
            FetchOptions::browser(self.wait_for_selector())
        } else {
            FetchOptions::default()
        };
        ctx.fetcher.fetch_html(&raw.url, &opts).await
    }

    /// Reduce the fetched page to the article portion.
    fn extract_content(
        &self,
        _feed: &Feed,
        raw: &RawArticle,
        html: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(default_extract(html, &raw.url))
    }

    fn validate_content(&self, html: &str) -> bool {
        !html.trim().is_empty()
    }

    /// Explicit header-image source, when the aggregator knows better
    /// than the processor's in-content heuristics.
    fn header_image_url(&self, _feed: &Feed, raw: &RawArticle) -> Option<String> {
        raw.thumbnail_url.clone()
    }

    /// Fetch and compress the feed icon; the engine persists the result
    /// when the feed has none yet.
    async fn collect_feed_icon(&self, ctx: &AggregatorContext, feed: &Feed) -> Result<Option<String>> {
        default_collect_icon(ctx, &feed.identifier).await
    }
}

/// Case-insensitive substring filters from the feed options:
/// `ignore_title_contains` over titles, `ignore_content_contains` over
/// title + summary.
pub fn apply_ignore_filters(feed: &Feed, articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let title_needles: Vec<String> = feed
        .options
        .ignore_title_contains
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    let content_needles: Vec<String> = feed
        .options
        .ignore_content_contains
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    if title_needles.is_empty() && content_needles.is_empty() {
        return articles;
    }

    let before = articles.len();
    let kept: Vec<RawArticle> = articles
        .into_iter()
        .filter(|raw| {
            let title = raw.title.to_lowercase();
            if title_needles.iter().any(|n| title.contains(n)) {
                return false;
            }
            let haystack = format!("{} {}", title, raw.summary.as_deref().unwrap_or("").to_lowercase());
            !content_needles.iter().any(|n| haystack.contains(n))
        })
        .collect();

    if kept.len() != before {
        debug!(feed_id = feed.id, dropped = before - kept.len(), "ignore filters removed articles");
    }
    kept
}

/// Generic extraction: prefer an `<article>` element, then `<main>`,
/// then the body contents.
pub fn default_extract(html: &str, _url: &str) -> String {
    let doc = Html::parse_document(html);
    for selector in ["article", "main"] {
        let sel = Selector::parse(selector).expect("static selector");
        if let Some(el) = doc.select(&sel).next() {
            return el.html();
        }
    }
    let body_sel = Selector::parse("body").expect("static selector");
    match doc.select(&body_sel).next() {
        Some(body) => body.inner_html(),
        None => html.to_string(),
    }
}

/// Default icon lookup: the site's `/favicon.ico`, then whatever the
/// image chain finds on the site root.
pub async fn default_collect_icon(ctx: &AggregatorContext, site_url: &str) -> Result<Option<String>> {
    let Ok(parsed) = url::Url::parse(site_url) else {
        return Ok(None);
    };
    let origin = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default());

    let favicon = format!("{origin}/favicon.ico");
    let opts = crate::images::ExtractOptions::default();
    match ctx.images.extract(&favicon, &opts).await {
        Ok(Some(icon)) => return Ok(Some(icon.to_data_uri())),
        Ok(None) => {}
        Err(e) => debug!(favicon = %favicon, error = %e, "favicon fetch failed"),
    }

    match ctx.images.extract(&origin, &opts).await {
        Ok(Some(icon)) => Ok(Some(icon.to_data_uri())),
        Ok(None) => Ok(None),
        Err(e) => {
            debug!(origin = %origin, error = %e, "site icon extraction failed");
            Ok(None)
        }
    }
}

/// Convert one feed-rs entry into the transient raw article shape.
pub fn raw_from_entry(entry: &feed_rs::model::Entry) -> Option<RawArticle> {
    let url = entry.links.first()?.href.clone();
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Untitled".to_string());

    let summary = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

    let author = entry.authors.first().map(|a| a.name.clone());
    let published = entry.published.map(|dt| dt.with_timezone(&Utc)).or(entry.updated);

    let thumbnail_url = entry
        .media
        .first()
        .and_then(|m| m.thumbnails.first().map(|t| t.image.uri.clone()));
    let (media_url, media_type) = entry
        .media
        .first()
        .and_then(|m| m.content.first())
        .map(|c| {
            (
                c.url.as_ref().map(|u| u.to_string()),
                c.content_type.as_ref().map(|m| m.to_string()),
            )
        })
        .unwrap_or((None, None));

    let external_id = if entry.id.is_empty() { None } else { Some(entry.id.clone()) };

    Some(RawArticle {
        title,
        url,
        published,
        summary,
        author,
        thumbnail_url,
        media_url,
        media_type,
        external_id,
        tags: Vec::new(),
    })
}

/// Options every kind understands.
pub fn common_options() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::new("ignore_title_contains", "Ignore titles containing", OptionType::String)
            .widget(OptionWidget::Textarea),
        OptionDescriptor::new("ignore_content_contains", "Ignore content containing", OptionType::String)
            .widget(OptionWidget::Textarea),
        OptionDescriptor::new("exclude_selectors", "CSS selectors to remove", OptionType::String)
            .widget(OptionWidget::Textarea),
        OptionDescriptor::new("regex_replacements", "Regex replacements", OptionType::String)
            .widget(OptionWidget::Textarea),
        OptionDescriptor::new("skip_duplicates", "Skip known URLs before fetching", OptionType::Boolean),
        OptionDescriptor::new("use_current_timestamp", "Stamp articles with ingestion time", OptionType::Boolean),
        OptionDescriptor::new("generate_title_image", "Generate a title image", OptionType::Boolean),
        OptionDescriptor::new("add_source_footer", "Append a source footer", OptionType::Boolean),
        OptionDescriptor::new("daily_post_limit", "Daily post limit", OptionType::Integer),
    ]
}

/// Identifier must be an absolute http(s) URL; shared by the URL-based kinds.
pub fn validate_http_url(identifier: &str) -> Result<String> {
    let parsed = url::Url::parse(identifier.trim())
        .map_err(|e| crate::error::AggregatorError::Validation(format!("not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(crate::error::AggregatorError::Validation(
            "identifier must be an http(s) URL".to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(crate::error::AggregatorError::Validation("identifier URL has no host".to_string()));
    }
    Ok(parsed.to_string())
}

pub(crate) fn parse_error(url: &str, step: &'static str, reason: impl Into<String>) -> EnrichmentError {
    EnrichmentError::new(FailureKind::Parse, step, url, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AiHints, FeedOptions};

    fn feed_with_filters(titles: &[&str], contents: &[&str]) -> Feed {
        Feed {
            id: 1,
            user_id: None,
            kind: FeedKind::FeedContent,
            identifier: "http://x/feed.xml".to_string(),
            name: "test".to_string(),
            icon: None,
            enabled: true,
            options: FeedOptions {
                ignore_title_contains: titles.iter().map(|s| s.to_string()).collect(),
                ignore_content_contains: contents.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            ai_hints: AiHints::default(),
            created_at: Utc::now(),
        }
    }

    fn raw(title: &str, summary: &str) -> RawArticle {
        RawArticle {
            title: title.to_string(),
            url: format!("http://x/{title}"),
            summary: Some(summary.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn title_filter_is_case_insensitive() {
        let feed = feed_with_filters(&["SPONSORED"], &[]);
        let kept = apply_ignore_filters(&feed, vec![raw("A sponsored post", "x"), raw("Plain", "y")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Plain");
    }

    #[test]
    fn content_filter_covers_title_and_summary() {
        let feed = feed_with_filters(&[], &["crypto"]);
        let kept = apply_ignore_filters(
            &feed,
            vec![
                raw("Crypto crash", "markets"),
                raw("Markets", "all about CRYPTO coins"),
                raw("Weather", "sunny"),
            ],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Weather");
    }

    #[test]
    fn no_filters_keeps_everything() {
        let feed = feed_with_filters(&[], &[]);
        let kept = apply_ignore_filters(&feed, vec![raw("A", "a"), raw("B", "b")]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn default_extract_prefers_article() {
        let html = "<html><body><nav>menu</nav><article><p>story</p></article></body></html>";
        let out = default_extract(html, "http://x/a");
        assert!(out.starts_with("<article>"));
        assert!(!out.contains("menu"));

        let no_article = "<html><body><main><p>m</p></main></body></html>";
        assert!(default_extract(no_article, "http://x/a").starts_with("<main>"));

        let bare = "<html><body><p>just text</p></body></html>";
        assert_eq!(default_extract(bare, "http://x/a"), "<p>just text</p>");
    }

    #[test]
    fn url_validation() {
        assert!(validate_http_url("https://example.com/feed.xml").is_ok());
        assert!(validate_http_url("ftp://example.com/feed").is_err());
        assert!(validate_http_url("not a url").is_err());
    }
}
