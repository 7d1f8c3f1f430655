use crate::error::{EnrichmentError, FailureKind};
use crate::fetcher::{FetchOptions, Fetcher};
use crate::images::compress::{compress_image, CompressedImage};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Minimum size for an in-page `<img>` to count as article imagery.
/// Anything below is a tracking pixel or spacer.
pub const MIN_PAGE_IMAGE_BYTES: usize = 4 * 1024;

/// How many in-page images to probe before giving up.
const PAGE_IMAGE_PROBE_LIMIT: usize = 5;

const DIRECT_EXTENSIONS: [&str; 7] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];

/// Ordered strategy chain. The orchestrator walks the variants in
/// declaration order and stops at the first hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectImage,
    YoutubeThumbnail,
    Twitter,
    MetaTags,
    InlineSvg,
    PageImages,
}

impl Strategy {
    pub const ORDER: [Strategy; 6] = [
        Strategy::DirectImage,
        Strategy::YoutubeThumbnail,
        Strategy::Twitter,
        Strategy::MetaTags,
        Strategy::InlineSvg,
        Strategy::PageImages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectImage => "direct_image",
            Strategy::YoutubeThumbnail => "youtube_thumbnail",
            Strategy::Twitter => "twitter",
            Strategy::MetaTags => "meta_tags",
            Strategy::InlineSvg => "inline_svg",
            Strategy::PageImages => "page_images",
        }
    }

    /// Cheap URL gate, evaluated before the strategy does any I/O.
    pub fn can_handle(&self, url: &str) -> bool {
        match self {
            Strategy::DirectImage => has_direct_extension(url),
            Strategy::YoutubeThumbnail => is_youtube_host(url),
            Strategy::Twitter => is_twitter_host(url),
            // DOM-based strategies apply to anything fetchable.
            Strategy::MetaTags | Strategy::InlineSvg | Strategy::PageImages => true,
        }
    }
}

pub fn has_direct_extension(url: &str) -> bool {
    let path = Url::parse(url).map(|u| u.path().to_ascii_lowercase()).unwrap_or_else(|_| url.to_ascii_lowercase());
    DIRECT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn is_youtube_host(url: &str) -> bool {
    host_matches(url, &["youtube.com", "youtu.be"])
}

pub fn is_twitter_host(url: &str) -> bool {
    host_matches(url, &["twitter.com", "x.com"])
}

fn host_matches(url: &str, hosts: &[&str]) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };
    let Some(host) = parsed.host_str() else { return false };
    let host = host.strip_prefix("www.").unwrap_or(host);
    hosts.iter().any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

/// Pull the video id out of any of the YouTube URL shapes.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.strip_prefix("www.").unwrap_or(parsed.host_str()?).to_string();

    let id = if host == "youtu.be" {
        parsed.path_segments()?.next().map(|s| s.to_string())
    } else if host.ends_with("youtube.com") {
        if let Some(v) = parsed.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()) {
            Some(v)
        } else {
            let segments: Vec<_> = parsed.path_segments()?.collect();
            match segments.as_slice() {
                ["embed", id, ..] | ["shorts", id, ..] | ["v", id, ..] => Some(id.to_string()),
                _ => None,
            }
        }
    } else {
        None
    };

    id.filter(|id| id.len() == 11 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
}

pub async fn run_direct_image(
    fetcher: &Fetcher,
    url: &str,
    is_header: bool,
) -> Result<Option<CompressedImage>, EnrichmentError> {
    let (bytes, content_type) = fetcher.fetch_bytes(url).await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    compress_or_enrichment_err(url, &bytes, content_type.as_deref(), is_header).map(Some)
}

pub async fn run_youtube_thumbnail(
    fetcher: &Fetcher,
    url: &str,
    is_header: bool,
) -> Result<Option<CompressedImage>, EnrichmentError> {
    let Some(video_id) = youtube_video_id(url) else {
        return Ok(None);
    };

    let maxres = format!("https://i.ytimg.com/vi/{video_id}/maxresdefault.jpg");
    match fetcher.fetch_bytes(&maxres).await {
        Ok((bytes, ct)) if !bytes.is_empty() => {
            return compress_or_enrichment_err(&maxres, &bytes, ct.as_deref(), is_header).map(Some);
        }
        Ok(_) => {}
        Err(e) if e.is_skip() => {
            debug!(video_id = %video_id, "no maxresdefault thumbnail, falling back to hqdefault");
        }
        Err(e) => return Err(e),
    }

    let hq = format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg");
    let (bytes, ct) = fetcher.fetch_bytes(&hq).await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    compress_or_enrichment_err(&hq, &bytes, ct.as_deref(), is_header).map(Some)
}

pub async fn run_twitter(
    fetcher: &Fetcher,
    url: &str,
    page_html: &str,
    is_header: bool,
) -> Result<Option<CompressedImage>, EnrichmentError> {
    // Tweet pages expose their imagery through the same meta tags; the
    // dedicated strategy exists so twitter hosts bypass later strategies
    // that cannot work on the script-only markup.
    match meta_image_url(page_html, url) {
        Some(image_url) => {
            let (bytes, ct) = fetcher.fetch_bytes(&image_url).await?;
            compress_or_enrichment_err(&image_url, &bytes, ct.as_deref(), is_header).map(Some)
        }
        None => Ok(None),
    }
}

pub async fn run_meta_tags(
    fetcher: &Fetcher,
    url: &str,
    page_html: &str,
    is_header: bool,
) -> Result<Option<CompressedImage>, EnrichmentError> {
    let Some(image_url) = meta_image_url(page_html, url) else {
        return Ok(None);
    };
    let (bytes, ct) = fetcher.fetch_bytes(&image_url).await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    compress_or_enrichment_err(&image_url, &bytes, ct.as_deref(), is_header).map(Some)
}

/// `og:image` wins over `twitter:image`; both resolve against the page URL.
pub fn meta_image_url(page_html: &str, base_url: &str) -> Option<String> {
    let doc = Html::parse_document(page_html);
    let og = Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#).ok()?;
    let tw = Selector::parse(r#"meta[name="twitter:image"], meta[property="twitter:image"]"#).ok()?;

    let candidate = doc
        .select(&og)
        .filter_map(|el| el.value().attr("content"))
        .find(|c| !c.trim().is_empty())
        .or_else(|| {
            doc.select(&tw)
                .filter_map(|el| el.value().attr("content"))
                .find(|c| !c.trim().is_empty())
        })?;

    resolve_url(base_url, candidate)
}

pub fn run_inline_svg(page_html: &str) -> Result<Option<CompressedImage>, EnrichmentError> {
    let doc = Html::parse_document(page_html);
    let svg_sel = Selector::parse("svg").expect("static selector");

    for svg in doc.select(&svg_sel) {
        // Skip empty placeholders and icon sprites without drawable content.
        if svg.inner_html().trim().is_empty() {
            continue;
        }
        let serialized = svg.html();
        return Ok(Some(CompressedImage {
            bytes: serialized.into_bytes(),
            content_type: "image/svg+xml".to_string(),
        }));
    }
    Ok(None)
}

pub async fn run_page_images(
    fetcher: &Fetcher,
    url: &str,
    page_html: &str,
    is_header: bool,
) -> Result<Option<CompressedImage>, EnrichmentError> {
    let candidates: Vec<String> = {
        let doc = Html::parse_document(page_html);
        let img_sel = Selector::parse("img[src]").expect("static selector");
        doc.select(&img_sel)
            .filter_map(|el| el.value().attr("src"))
            .filter(|src| !src.starts_with("data:"))
            .filter_map(|src| resolve_url(url, src))
            .take(PAGE_IMAGE_PROBE_LIMIT)
            .collect()
    };

    for image_url in candidates {
        match fetcher.fetch_bytes(&image_url).await {
            Ok((bytes, ct)) if bytes.len() >= MIN_PAGE_IMAGE_BYTES => {
                return compress_or_enrichment_err(&image_url, &bytes, ct.as_deref(), is_header).map(Some);
            }
            Ok((bytes, _)) => {
                debug!(image_url = %image_url, size = bytes.len(), "in-page image below size threshold");
            }
            Err(e) if e.is_skip() => return Err(e),
            Err(e) => {
                debug!(image_url = %image_url, error = %e, "in-page image fetch failed, trying next");
            }
        }
    }
    Ok(None)
}

pub fn resolve_url(base: &str, candidate: &str) -> Option<String> {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate.to_string());
    }
    Url::parse(base).ok()?.join(candidate).ok().map(|u| u.to_string())
}

fn compress_or_enrichment_err(
    url: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    is_header: bool,
) -> Result<CompressedImage, EnrichmentError> {
    compress_image(bytes, content_type, is_header).map_err(|e| {
        EnrichmentError::new(FailureKind::Parse, "extract_images", url, format!("image decode failed: {e}"))
    })
}

pub async fn fetch_page_html(fetcher: &Fetcher, url: &str) -> Result<String, EnrichmentError> {
    fetcher.fetch_html(url, &FetchOptions::browser(None)).await
}
