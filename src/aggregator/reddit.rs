use super::{AggregatorContext, SourceAggregator, SourceData};
use crate::error::{AggregatorError, EnrichmentError, FailureKind, Result};
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing::debug;

/// Subreddit aggregator over the public JSON listing API.
pub struct RedditAggregator;

impl RedditAggregator {
    fn normalize_subreddit(identifier: &str) -> String {
        identifier
            .trim()
            .trim_start_matches('/')
            .trim_start_matches("r/")
            .trim_end_matches('/')
            .to_string()
    }
}

#[async_trait]
impl SourceAggregator for RedditAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::Reddit
    }

    fn display_name(&self) -> &'static str {
        "Reddit"
    }

    async fn validate(&self, ctx: &AggregatorContext, identifier: &str) -> Result<String> {
        let sub = Self::normalize_subreddit(identifier);
        if sub.is_empty() || !sub.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AggregatorError::Validation(format!("`{identifier}` is not a valid subreddit name")));
        }

        let about_url = format!("https://www.reddit.com/r/{sub}/about.json");
        let about = ctx
            .fetcher
            .fetch_json(&about_url)
            .await
            .map_err(|e| AggregatorError::Validation(format!("subreddit `{sub}` is not reachable: {e}")))?;
        if about.pointer("/data/display_name").and_then(|v| v.as_str()).is_none() {
            return Err(AggregatorError::Validation(format!("`{sub}` does not look like a subreddit")));
        }
        Ok(sub)
    }

    async fn fetch_source_data(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        limit: usize,
    ) -> std::result::Result<SourceData, EnrichmentError> {
        let sub = Self::normalize_subreddit(&feed.identifier);
        let listing_url = format!(
            "https://www.reddit.com/r/{sub}/new.json?limit={}",
            limit.clamp(1, 100)
        );
        debug!(feed_id = feed.id, listing_url = %listing_url, "fetching subreddit listing");
        let listing = ctx.fetcher.fetch_json(&listing_url).await?;
        Ok(SourceData::Json(listing))
    }

    fn parse_to_raw_articles(
        &self,
        feed: &Feed,
        data: &SourceData,
    ) -> std::result::Result<Vec<RawArticle>, EnrichmentError> {
        let SourceData::Json(listing) = data else {
            return Err(EnrichmentError::new(
                FailureKind::Parse,
                "parse_to_raw_articles",
                &feed.identifier,
                "expected a JSON listing",
            ));
        };

        let children = listing
            .pointer("/data/children")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                EnrichmentError::new(
                    FailureKind::Parse,
                    "parse_to_raw_articles",
                    &feed.identifier,
                    "listing has no data.children array",
                )
            })?;

        let mut articles = Vec::new();
        for child in children {
            let Some(post) = child.get("data") else { continue };
            let Some(permalink) = post.get("permalink").and_then(|v| v.as_str()) else {
                continue;
            };
            let title = post
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string();

            let summary = post
                .get("selftext_html")
                .and_then(|v| v.as_str())
                .map(unescape_html)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| link_card(post));

            let published = post
                .get("created_utc")
                .and_then(|v| v.as_f64())
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());

            let thumbnail_url = preview_image(post);

            let (media_url, media_type) = match post.get("is_video").and_then(|v| v.as_bool()) {
                Some(true) => (
                    post.pointer("/media/reddit_video/fallback_url")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    Some("video/mp4".to_string()),
                ),
                _ => (None, None),
            };

            articles.push(RawArticle {
                title,
                url: format!("https://www.reddit.com{permalink}"),
                published,
                summary,
                author: post.get("author").and_then(|v| v.as_str()).map(|s| s.to_string()),
                thumbnail_url,
                media_url,
                media_type,
                external_id: post.get("name").and_then(|v| v.as_str()).map(|s| s.to_string()),
                tags: Vec::new(),
            });
        }
        Ok(articles)
    }

    /// Listing data already carries everything; no page fetch.
    async fn fetch_article_content(
        &self,
        _ctx: &AggregatorContext,
        _feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(raw.summary.clone().unwrap_or_default())
    }

    fn extract_content(
        &self,
        _feed: &Feed,
        _raw: &RawArticle,
        html: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        Ok(html.to_string())
    }

    fn validate_content(&self, _html: &str) -> bool {
        // Title-only posts are legitimate; the embed header carries them.
        true
    }

    /// Video posts get the vxreddit embed header; everything else uses
    /// the preview image.
    fn header_image_url(&self, _feed: &Feed, raw: &RawArticle) -> Option<String> {
        if raw.media_url.is_some() {
            let permalink = raw.url.strip_prefix("https://www.reddit.com")?;
            return Some(format!("https://vxreddit.com{permalink}"));
        }
        raw.thumbnail_url.clone()
    }

    async fn collect_feed_icon(&self, ctx: &AggregatorContext, feed: &Feed) -> Result<Option<String>> {
        let sub = Self::normalize_subreddit(&feed.identifier);
        let about_url = format!("https://www.reddit.com/r/{sub}/about.json");
        let about = match ctx.fetcher.fetch_json(&about_url).await {
            Ok(about) => about,
            Err(e) => {
                debug!(about_url = %about_url, error = %e, "subreddit about fetch failed");
                return Ok(None);
            }
        };

        let icon_url = about
            .pointer("/data/community_icon")
            .and_then(|v| v.as_str())
            .map(unescape_html)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                about
                    .pointer("/data/icon_img")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
            });

        let Some(icon_url) = icon_url else { return Ok(None) };
        match ctx.images.extract(&icon_url, &crate::images::ExtractOptions::default()).await {
            Ok(Some(icon)) => Ok(Some(icon.to_data_uri())),
            _ => Ok(None),
        }
    }
}

/// The listing API double-encodes HTML payloads.
fn unescape_html(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn preview_image(post: &serde_json::Value) -> Option<String> {
    if let Some(source) = post
        .pointer("/preview/images/0/source/url")
        .and_then(|v| v.as_str())
    {
        return Some(unescape_html(source));
    }
    post.get("thumbnail")
        .and_then(|v| v.as_str())
        .filter(|t| t.starts_with("http"))
        .map(|t| t.to_string())
}

/// External link posts become a single outbound anchor the processor can
/// use as its header source.
fn link_card(post: &serde_json::Value) -> Option<String> {
    let target = post.get("url_overridden_by_dest").or_else(|| post.get("url"))?;
    let target = target.as_str()?;
    if !target.starts_with("http") {
        return None;
    }
    Some(format!("<p><a href=\"{target}\">{target}</a></p>"))
}
