use super::{raw_from_entry, AggregatorContext, SourceAggregator, SourceData};
use crate::error::{AggregatorError, EnrichmentError, FailureKind, Result};
use crate::fetcher::Fetcher;
use crate::types::{Feed, FeedKind, RawArticle};
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube channel aggregator. Validation resolves handles and channel
/// URLs to a canonical `UC…` id through the Data API; listing uses the
/// channel's uploads feed, which needs no key.
pub struct YoutubeAggregator;

/// Thin Data API client. The base URL is injectable so tests can stand
/// in a local server.
pub struct YoutubeApi {
    base: String,
    key: String,
}

#[derive(Debug, Clone)]
pub struct ChannelHit {
    pub channel_id: String,
    pub title: String,
    pub custom_url: Option<String>,
}

impl YoutubeApi {
    pub fn new(key: impl Into<String>) -> Self {
        Self { base: API_BASE.to_string(), key: key.into() }
    }

    pub fn with_base(base: impl Into<String>, key: impl Into<String>) -> Self {
        Self { base: base.into(), key: key.into() }
    }

    pub async fn search_channels(
        &self,
        fetcher: &Fetcher,
        query: &str,
    ) -> std::result::Result<Vec<ChannelHit>, EnrichmentError> {
        let url = format!(
            "{}/search?part=snippet&type=channel&maxResults=10&q={}&key={}",
            self.base,
            urlencode(query),
            self.key
        );
        let body = fetcher.fetch_json(&url).await?;
        let items = body.get("items").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|item| {
                let channel_id = item
                    .pointer("/id/channelId")
                    .or_else(|| item.pointer("/snippet/channelId"))
                    .and_then(|v| v.as_str())?
                    .to_string();
                Some(ChannelHit {
                    channel_id,
                    title: item
                        .pointer("/snippet/title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    custom_url: item
                        .pointer("/snippet/customUrl")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                })
            })
            .collect())
    }

    pub async fn channel_for_username(
        &self,
        fetcher: &Fetcher,
        username: &str,
    ) -> std::result::Result<Option<String>, EnrichmentError> {
        let url = format!(
            "{}/channels?part=id&forUsername={}&key={}",
            self.base,
            urlencode(username),
            self.key
        );
        let body = fetcher.fetch_json(&url).await?;
        Ok(body
            .pointer("/items/0/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

/// Already-canonical channel id: `UC` plus 22 id characters.
pub fn is_channel_id(s: &str) -> bool {
    s.len() == 24
        && s.starts_with("UC")
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// What the identifier parsed into, before any API round-trip.
enum IdentifierShape {
    ChannelId(String),
    Handle(String),
    Username(String),
}

fn classify_identifier(identifier: &str) -> std::result::Result<IdentifierShape, String> {
    let trimmed = identifier.trim();
    if is_channel_id(trimmed) {
        return Ok(IdentifierShape::ChannelId(trimmed.to_string()));
    }

    if let Ok(parsed) = Url::parse(trimmed) {
        if let Some(id) = parsed
            .query_pairs()
            .find(|(k, _)| k == "channel_id")
            .map(|(_, v)| v.into_owned())
        {
            if is_channel_id(&id) {
                return Ok(IdentifierShape::ChannelId(id));
            }
        }
        let segments: Vec<String> = parsed
            .path_segments()
            .map(|s| s.map(|p| p.to_string()).collect())
            .unwrap_or_default();
        return match segments.as_slice() {
            [handle, ..] if handle.starts_with('@') => {
                Ok(IdentifierShape::Handle(handle.trim_start_matches('@').to_string()))
            }
            [c, name, ..] if c == "c" => Ok(IdentifierShape::Handle(name.clone())),
            [user, name, ..] if user == "user" => Ok(IdentifierShape::Username(name.clone())),
            [channel, id, ..] if channel == "channel" => {
                if is_channel_id(id) {
                    Ok(IdentifierShape::ChannelId(id.clone()))
                } else {
                    Err(format!("`{id}` is not a valid channel id"))
                }
            }
            _ => Err(format!("unrecognized YouTube URL `{trimmed}`")),
        };
    }

    if let Some(handle) = trimmed.strip_prefix('@') {
        return Ok(IdentifierShape::Handle(handle.to_string()));
    }
    Ok(IdentifierShape::Handle(trimmed.to_string()))
}

/// Choose among search hits: exact customUrl match first, then exact
/// title match, then the first hit.
pub fn pick_channel(hits: &[ChannelHit], handle: &str) -> Option<String> {
    let wanted = handle.trim_start_matches('@').to_ascii_lowercase();

    if let Some(hit) = hits.iter().find(|h| {
        h.custom_url
            .as_deref()
            .map(|c| c.trim_start_matches('@').to_ascii_lowercase() == wanted)
            .unwrap_or(false)
    }) {
        return Some(hit.channel_id.clone());
    }
    if let Some(hit) = hits.iter().find(|h| h.title.to_ascii_lowercase() == wanted) {
        return Some(hit.channel_id.clone());
    }
    hits.first().map(|h| h.channel_id.clone())
}

/// Full handle resolution: id passthrough, URL dissection, API search
/// with customUrl preference, `forUsername` fallback.
pub async fn resolve_channel_id(
    fetcher: &Fetcher,
    api: Option<&YoutubeApi>,
    identifier: &str,
) -> Result<String> {
    let shape = classify_identifier(identifier).map_err(AggregatorError::Validation)?;

    let (needle, try_username_first) = match shape {
        IdentifierShape::ChannelId(id) => return Ok(id),
        IdentifierShape::Handle(handle) => (handle, false),
        IdentifierShape::Username(name) => (name, true),
    };

    let Some(api) = api else {
        return Err(AggregatorError::Validation(
            "resolving YouTube handles requires a configured API key".to_string(),
        ));
    };

    if try_username_first {
        if let Some(id) = api.channel_for_username(fetcher, &needle).await.map_err(to_validation)? {
            return Ok(id);
        }
    }

    let hits = api.search_channels(fetcher, &needle).await.map_err(to_validation)?;
    if let Some(id) = pick_channel(&hits, &needle) {
        debug!(handle = %needle, channel_id = %id, "resolved channel via search");
        return Ok(id);
    }

    if let Some(id) = api.channel_for_username(fetcher, &needle).await.map_err(to_validation)? {
        debug!(handle = %needle, channel_id = %id, "resolved channel via forUsername");
        return Ok(id);
    }

    Err(AggregatorError::Validation(format!("could not resolve YouTube channel for `{identifier}`")))
}

fn to_validation(e: EnrichmentError) -> AggregatorError {
    AggregatorError::Validation(format!("YouTube API lookup failed: {e}"))
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[async_trait]
impl SourceAggregator for YoutubeAggregator {
    fn kind(&self) -> FeedKind {
        FeedKind::Youtube
    }

    fn display_name(&self) -> &'static str {
        "YouTube channel"
    }

    async fn validate(&self, ctx: &AggregatorContext, identifier: &str) -> Result<String> {
        let api = ctx.youtube_api_key.as_ref().map(YoutubeApi::new);
        resolve_channel_id(&ctx.fetcher, api.as_ref(), identifier).await
    }

    async fn fetch_source_data(
        &self,
        ctx: &AggregatorContext,
        feed: &Feed,
        _limit: usize,
    ) -> std::result::Result<SourceData, EnrichmentError> {
        let feed_url = format!("https://www.youtube.com/feeds/videos.xml?channel_id={}", feed.identifier);
        let parsed = ctx.fetcher.fetch_feed(&feed_url).await?;
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
                "expected a parsed uploads feed",
            ));
        };

        let mut articles = Vec::new();
        for entry in &parsed.entries {
            let Some(mut raw) = raw_from_entry(entry) else { continue };
            // The uploads feed keeps the description in the media group.
            if raw.summary.is_none() {
                raw.summary = entry
                    .media
                    .first()
                    .and_then(|m| m.description.as_ref())
                    .map(|d| d.content.clone());
            }
            articles.push(raw);
        }
        Ok(articles)
    }

    /// The description is the body; the watch page itself is all script.
    async fn fetch_article_content(
        &self,
        _ctx: &AggregatorContext,
        _feed: &Feed,
        raw: &RawArticle,
    ) -> std::result::Result<String, EnrichmentError> {
        let description = raw.summary.clone().unwrap_or_default();
        Ok(format!("<p>{}</p>", text_to_html(&description)))
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
        // A video without a description is still a video.
        true
    }

    /// The watch URL drives the embed header.
    fn header_image_url(&self, _feed: &Feed, raw: &RawArticle) -> Option<String> {
        Some(raw.url.clone())
    }

    async fn collect_feed_icon(&self, ctx: &AggregatorContext, feed: &Feed) -> Result<Option<String>> {
        let channel_url = format!("https://www.youtube.com/channel/{}", feed.identifier);
        match ctx.images.extract(&channel_url, &crate::images::ExtractOptions::default()).await {
            Ok(Some(icon)) => Ok(Some(icon.to_data_uri())),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(channel_url = %channel_url, error = %e, "channel icon extraction failed");
                Ok(None)
            }
        }
    }
}

fn text_to_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}
