pub mod embeds;
pub mod rules;

use crate::error::EnrichmentError;
use crate::images::strategies::resolve_url;
use crate::images::{compress_image, decode_data_uri, ExtractOptions, ImageExtractor};
use ego_tree::NodeId;
use rules::RegexRule;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};

/// Elements that keep an otherwise text-empty parent alive.
const MEDIA_ELEMENTS: [&str; 6] = ["img", "iframe", "video", "svg", "embed", "picture"];

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub article_url: String,
    /// Explicit header-image source chosen by the aggregator.
    pub header_image_url: Option<String>,
    pub generate_title_image: bool,
    pub add_source_footer: bool,
    /// Base per-aggregator list merged with the feed's configured list.
    pub selectors_to_remove: Vec<String>,
    pub regex_rules: Vec<RegexRule>,
}

/// Standardizes extracted article HTML into the persisted shape:
/// `<article>` root, at most one `<header>`, one primary `<section>`,
/// trailing comment sections and an optional footer.
pub struct ContentProcessor {
    images: Arc<ImageExtractor>,
}

/// What analysis decided the header should be built from.
#[derive(Debug, Clone)]
enum HeaderSource {
    Existing(String),
    DataUri(String),
    YoutubeEmbed(String),
    RedditEmbed(String),
    RedditPost { post_url: String, subreddit: String },
    Remote(String),
}

/// Sync analysis output; no DOM handle survives into the async phase.
struct Analysis {
    body_html: String,
    header_source: Option<HeaderSource>,
    existing_footer: Option<String>,
    comment_sections: Vec<String>,
}

/// Header actually inserted, for the leftover-dedup pass.
enum InsertedHeader {
    None,
    Plain,
    Youtube(String),
    Reddit(String),
}

impl ContentProcessor {
    pub fn new(images: Arc<ImageExtractor>) -> Self {
        Self { images }
    }

    /// Run the standardization pipeline. A `SkipArticle` from image
    /// extraction propagates; any other failure falls back to the input
    /// wrapped as a bare `<article>`.
    pub async fn process(&self, html: &str, opts: &ProcessOptions) -> Result<String, EnrichmentError> {
        match self.standardize(html, opts).await {
            Ok(output) => Ok(output),
            Err(e) if e.is_skip() => Err(e),
            Err(e) => {
                warn!(url = %opts.article_url, error = %e, "content standardization failed, wrapping input");
                Ok(fallback_wrap(html, opts))
            }
        }
    }

    async fn standardize(&self, html: &str, opts: &ProcessOptions) -> Result<String, EnrichmentError> {
        let analysis = analyze(html, opts);

        let (header_html, inserted) = self.build_header(&analysis, html, opts).await?;

        let body_html = match &inserted {
            InsertedHeader::Youtube(id) => strip_youtube_leftovers(&analysis.body_html, id),
            InsertedHeader::Reddit(post_url) => strip_reddit_leftovers(&analysis.body_html, post_url),
            _ => analysis.body_html.clone(),
        };

        let footer_html = match &analysis.existing_footer {
            Some(existing) => Some(existing.clone()),
            None if opts.add_source_footer => Some(source_footer(&opts.article_url)),
            None => None,
        };

        let mut assembled = String::from("<article>");
        if let Some(header) = &header_html {
            assembled.push_str(header);
        }
        assembled.push_str(&wrap_primary_section(&body_html));
        for section in &analysis.comment_sections {
            assembled.push_str(section);
        }
        if let Some(footer) = &footer_html {
            assembled.push_str(footer);
        }
        assembled.push_str("</article>");

        let cleaned = remove_selectors(&assembled, &opts.selectors_to_remove);
        Ok(rules::apply_rules(&opts.regex_rules, &cleaned))
    }

    async fn build_header(
        &self,
        analysis: &Analysis,
        original_html: &str,
        opts: &ProcessOptions,
    ) -> Result<(Option<String>, InsertedHeader), EnrichmentError> {
        let Some(source) = &analysis.header_source else {
            return Ok((None, InsertedHeader::None));
        };

        match source {
            HeaderSource::Existing(header) => Ok((Some(header.clone()), InsertedHeader::Plain)),
            HeaderSource::DataUri(uri) => {
                let (bytes, content_type) = decode_data_uri(uri)
                    .map_err(|e| EnrichmentError::new(
                        crate::error::FailureKind::Parse,
                        "process_content",
                        &opts.article_url,
                        e.to_string(),
                    ))?;
                let compressed = compress_image(&bytes, Some(&content_type), true).map_err(|e| {
                    EnrichmentError::new(
                        crate::error::FailureKind::Parse,
                        "process_content",
                        &opts.article_url,
                        e.to_string(),
                    )
                })?;
                Ok((Some(image_header_block(&compressed.to_data_uri())), InsertedHeader::Plain))
            }
            HeaderSource::YoutubeEmbed(video_id) => Ok((
                Some(embeds::youtube_embed_header(video_id)),
                InsertedHeader::Youtube(video_id.clone()),
            )),
            HeaderSource::RedditEmbed(embed_url) => {
                let post_url = embeds::reddit_post_url_from_embed(embed_url)
                    .unwrap_or_else(|| embed_url.clone());
                Ok((
                    Some(embeds::reddit_embed_header(embed_url)),
                    InsertedHeader::Reddit(post_url),
                ))
            }
            HeaderSource::RedditPost { post_url, subreddit } => {
                let icon_page = format!("https://www.reddit.com/r/{subreddit}/");
                let image = self
                    .images
                    .extract(&icon_page, &ExtractOptions { is_header: true, page_html: None })
                    .await?;
                match image {
                    Some(img) => Ok((Some(image_header_block(&img.to_data_uri())), InsertedHeader::Plain)),
                    None => {
                        debug!(post_url = %post_url, "no subreddit icon found, omitting header");
                        Ok((None, InsertedHeader::None))
                    }
                }
            }
            HeaderSource::Remote(url) => {
                // When the header source is the article page itself, the
                // already-fetched document spares a second render.
                let page_html = if url == &opts.article_url {
                    Some(original_html.to_string())
                } else {
                    None
                };
                let image = self
                    .images
                    .extract(url, &ExtractOptions { is_header: true, page_html })
                    .await?;
                match image {
                    Some(img) => Ok((Some(image_header_block(&img.to_data_uri())), InsertedHeader::Plain)),
                    None => Ok((None, InsertedHeader::None)),
                }
            }
        }
    }
}

/// Sync DOM pass: locate the body, set aside headers/footers and comment
/// sections, pick the header source, and serialize what remains.
fn analyze(html: &str, opts: &ProcessOptions) -> Analysis {
    let mut doc = Html::parse_document(html);
    let body_id = find_body_root(&doc);

    let header_sel = Selector::parse("header").expect("static selector");
    let footer_sel = Selector::parse("footer").expect("static selector");
    let section_sel = Selector::parse("section").expect("static selector");

    let existing_header = first_match_html(&doc, body_id, &header_sel);
    let existing_footer = first_match_html(&doc, body_id, &footer_sel);
    detach_all_matches(&mut doc, body_id, &header_sel);
    detach_all_matches(&mut doc, body_id, &footer_sel);

    let comment_sections = extract_comment_sections(&mut doc, body_id, &section_sel);

    let mut header_source = existing_header.map(HeaderSource::Existing);

    if header_source.is_none() && opts.generate_title_image {
        header_source = pick_header_source(&mut doc, body_id, opts);
    }

    Analysis {
        body_html: serialize_children(&doc, body_id),
        header_source,
        existing_footer,
        comment_sections,
    }
}

/// Priority chain for the synthesized header: explicit aggregator choice,
/// first in-content image, first valid outbound link, the article URL.
/// The originating element is removed from the body.
fn pick_header_source(doc: &mut Html, body_id: NodeId, opts: &ProcessOptions) -> Option<HeaderSource> {
    if let Some(explicit) = &opts.header_image_url {
        return Some(classify_header_url(explicit));
    }

    let img_sel = Selector::parse("img[src]").expect("static selector");
    let img = body_element(doc, body_id).and_then(|body| {
        body.select(&img_sel)
            .find_map(|el| el.value().attr("src").map(|src| (el.id(), src.to_string())))
    });
    if let Some((origin, src)) = img {
        detach_and_collapse(doc, origin, body_id);
        if src.starts_with("data:") {
            return Some(HeaderSource::DataUri(src));
        }
        if let Some(resolved) = resolve_url(&opts.article_url, &src) {
            return Some(classify_header_url(&resolved));
        }
        return None;
    }

    let link_sel = Selector::parse("a[href]").expect("static selector");
    let link = body_element(doc, body_id).and_then(|body| {
        body.select(&link_sel)
            .filter_map(|el| el.value().attr("href").map(|href| (el.id(), href.to_string())))
            .find(|(_, href)| href.starts_with("http://") || href.starts_with("https://"))
    });
    if let Some((origin, href)) = link {
        detach_and_collapse(doc, origin, body_id);
        return Some(classify_header_url(&href));
    }

    Some(classify_header_url(&opts.article_url))
}

/// Special embedders run before the generic image chain.
fn classify_header_url(url: &str) -> HeaderSource {
    if url.starts_with("data:") {
        return HeaderSource::DataUri(url.to_string());
    }
    if embeds::is_reddit_embed_url(url) {
        return HeaderSource::RedditEmbed(url.to_string());
    }
    if let Some(video_id) = embeds::youtube_video_id(url) {
        return HeaderSource::YoutubeEmbed(video_id);
    }
    if embeds::is_reddit_post_url(url) {
        if let Some(subreddit) = embeds::subreddit_from_url(url) {
            return HeaderSource::RedditPost { post_url: url.to_string(), subreddit };
        }
    }
    HeaderSource::Remote(url.to_string())
}

/// Sections that carry the discussion rather than the article body are
/// moved behind the primary section.
fn extract_comment_sections(doc: &mut Html, body_id: NodeId, section_sel: &Selector) -> Vec<String> {
    let matches: Vec<(NodeId, String)> = match body_element(doc, body_id) {
        Some(body) => body
            .select(section_sel)
            .filter(|el| {
                let text: String = el.text().collect::<String>().to_ascii_lowercase();
                text.contains("comment")
            })
            .map(|el| (el.id(), el.html()))
            .collect(),
        None => Vec::new(),
    };

    let mut sections = Vec::new();
    for (id, html) in matches {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
            sections.push(html);
        }
    }
    sections
}

fn find_body_root(doc: &Html) -> NodeId {
    let article_sel = Selector::parse("article").expect("static selector");
    if let Some(article) = doc.select(&article_sel).next() {
        return article.id();
    }
    let body_sel = Selector::parse("body").expect("static selector");
    doc.select(&body_sel)
        .next()
        .map(|el| el.id())
        .unwrap_or_else(|| doc.tree.root().id())
}

fn body_element(doc: &Html, body_id: NodeId) -> Option<ElementRef<'_>> {
    doc.tree.get(body_id).and_then(ElementRef::wrap)
}

fn first_match_html(doc: &Html, body_id: NodeId, sel: &Selector) -> Option<String> {
    body_element(doc, body_id).and_then(|body| body.select(sel).next().map(|el| el.html()))
}

fn detach_all_matches(doc: &mut Html, body_id: NodeId, sel: &Selector) {
    let ids: Vec<NodeId> = match body_element(doc, body_id) {
        Some(body) => body.select(sel).map(|el| el.id()).collect(),
        None => Vec::new(),
    };
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Detach a node, then collapse ancestors that end up empty, stopping
/// below the body root.
fn detach_and_collapse(doc: &mut Html, id: NodeId, stop: NodeId) {
    let mut parent = doc.tree.get(id).and_then(|n| n.parent()).map(|p| p.id());
    if let Some(mut node) = doc.tree.get_mut(id) {
        node.detach();
    }

    while let Some(pid) = parent {
        if pid == stop {
            break;
        }
        let keep = match doc.tree.get(pid).and_then(ElementRef::wrap) {
            Some(el) => {
                let name = el.value().name();
                name == "body" || name == "html" || !is_effectively_empty(&el)
            }
            None => true,
        };
        if keep {
            break;
        }
        let next = doc.tree.get(pid).and_then(|n| n.parent()).map(|p| p.id());
        if let Some(mut node) = doc.tree.get_mut(pid) {
            node.detach();
        }
        parent = next;
    }
}

fn is_effectively_empty(el: &ElementRef) -> bool {
    if el.text().any(|t| !t.trim().is_empty()) {
        return false;
    }
    !el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| MEDIA_ELEMENTS.contains(&d.value().name()))
}

fn serialize_children(doc: &Html, id: NodeId) -> String {
    let Some(node) = doc.tree.get(id) else {
        return String::new();
    };
    let mut out = String::new();
    for child in node.children() {
        if let Some(el) = ElementRef::wrap(child) {
            out.push_str(&el.html());
        } else if let Some(text) = child.value().as_text() {
            out.push_str(&escape_text(text));
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// The remaining body becomes the primary section; an existing single
/// `<section>` wrapper is reused instead of nested.
fn wrap_primary_section(body_html: &str) -> String {
    let doc = Html::parse_document(body_html);
    let body_sel = Selector::parse("body").expect("static selector");
    if let Some(body) = doc.select(&body_sel).next() {
        let elements: Vec<ElementRef> = body.children().filter_map(ElementRef::wrap).collect();
        let only_ws_text = body
            .children()
            .all(|c| c.value().as_text().map(|t| t.trim().is_empty()).unwrap_or(true));
        if elements.len() == 1 && only_ws_text && elements[0].value().name() == "section" {
            return elements[0].html();
        }
    }
    format!("<section>{body_html}</section>")
}

/// Once a YouTube header exists, in-body links to the same video are noise.
fn strip_youtube_leftovers(body_html: &str, video_id: &str) -> String {
    let mut doc = Html::parse_document(body_html);
    let body_id = find_plain_body(&doc);
    let link_sel = Selector::parse("a[href]").expect("static selector");

    let ids: Vec<NodeId> = match body_element(&doc, body_id) {
        Some(body) => body
            .select(&link_sel)
            .filter(|el| {
                el.value()
                    .attr("href")
                    .and_then(embeds::youtube_video_id)
                    .is_some_and(|id| id == video_id)
            })
            .map(|el| el.id())
            .collect(),
        None => Vec::new(),
    };

    for id in ids {
        detach_and_collapse(&mut doc, id, body_id);
    }
    serialize_children(&doc, body_id)
}

/// Once a Reddit embed header exists, the raw video links and preview
/// thumbnails of the same post are removed and emptied parents collapsed.
fn strip_reddit_leftovers(body_html: &str, post_url: &str) -> String {
    let mut doc = Html::parse_document(body_html);
    let body_id = find_plain_body(&doc);
    let link_sel = Selector::parse("a[href]").expect("static selector");
    let img_sel = Selector::parse("img[src]").expect("static selector");

    let mut to_remove: Vec<NodeId> = Vec::new();

    if let Some(body) = body_element(&doc, body_id) {
        for el in body.select(&link_sel) {
            let Some(href) = el.value().attr("href") else { continue };
            if embeds::is_vredd_it_link(href) {
                to_remove.push(el.id());
                continue;
            }
            let text: String = el.text().collect::<String>();
            if text.trim().eq_ignore_ascii_case("view video") && embeds::same_post_url(href, post_url) {
                to_remove.push(el.id());
            }
        }

        for el in body.select(&img_sel) {
            let Some(src) = el.value().attr("src") else { continue };
            if !embeds::is_reddit_preview_host(src) {
                continue;
            }
            let alt = el.value().attr("alt").unwrap_or("");
            let parent_text: String = el
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| p.text().collect())
                .unwrap_or_default();
            if embeds::indicates_video_thumbnail(alt) || embeds::indicates_video_thumbnail(&parent_text) {
                to_remove.push(el.id());
            }
        }
    }

    for id in to_remove {
        detach_and_collapse(&mut doc, id, body_id);
    }
    serialize_children(&doc, body_id)
}

fn find_plain_body(doc: &Html) -> NodeId {
    let body_sel = Selector::parse("body").expect("static selector");
    doc.select(&body_sel)
        .next()
        .map(|el| el.id())
        .unwrap_or_else(|| doc.tree.root().id())
}

/// Strip configured CSS selectors from the assembled article. Invalid
/// selectors are skipped with a warning.
fn remove_selectors(html: &str, selectors: &[String]) -> String {
    if selectors.is_empty() {
        return html.to_string();
    }
    let mut doc = Html::parse_document(html);
    for raw in selectors {
        let sel = match Selector::parse(raw) {
            Ok(sel) => sel,
            Err(e) => {
                warn!(selector = raw.as_str(), "invalid removal selector, skipping: {e:?}");
                continue;
            }
        };
        let ids: Vec<NodeId> = doc.select(&sel).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.detach();
            }
        }
    }
    serialize_children(&doc, find_plain_body(&doc))
}

fn image_header_block(data_uri: &str) -> String {
    format!(
        "<header><p><img src=\"{data_uri}\" alt=\"Article image\" style=\"max-width:100%; height:auto\"></p></header>"
    )
}

fn source_footer(url: &str) -> String {
    format!("<footer style=\"margin-bottom:16px\"><a href=\"{url}\" style=\"float:right\">Source</a></footer>")
}

fn fallback_wrap(html: &str, opts: &ProcessOptions) -> String {
    let footer = if opts.add_source_footer {
        source_footer(&opts.article_url)
    } else {
        String::new()
    };
    format!("<article>{html}{footer}</article>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_opts(url: &str) -> ProcessOptions {
        ProcessOptions {
            article_url: url.to_string(),
            generate_title_image: false,
            ..Default::default()
        }
    }

    #[test]
    fn analysis_preserves_existing_header_and_footer() {
        let html = "<article><header><h1>T</h1></header><p>body</p><footer>credits</footer></article>";
        let analysis = analyze(html, &bare_opts("http://x/a"));
        assert!(matches!(analysis.header_source, Some(HeaderSource::Existing(_))));
        assert_eq!(analysis.existing_footer.as_deref(), Some("<footer>credits</footer>"));
        assert!(analysis.body_html.contains("<p>body</p>"));
        assert!(!analysis.body_html.contains("<footer>"));
    }

    #[test]
    fn analysis_extracts_comment_sections() {
        let html = "<body><section><p>story</p></section><section><h2>Comments</h2><p>hi</p></section></body>";
        let analysis = analyze(html, &bare_opts("http://x/a"));
        assert_eq!(analysis.comment_sections.len(), 1);
        assert!(analysis.comment_sections[0].contains("Comments"));
        assert!(analysis.body_html.contains("story"));
        assert!(!analysis.body_html.contains("Comments"));
    }

    #[test]
    fn header_source_priority_image_then_link_then_url() {
        let with_img = "<body><p><img src=\"http://x/pic.png\"><a href=\"http://y/\">l</a></p></body>";
        let mut opts = bare_opts("http://x/a");
        opts.generate_title_image = true;
        let analysis = analyze(with_img, &opts);
        match analysis.header_source {
            Some(HeaderSource::Remote(url)) => assert_eq!(url, "http://x/pic.png"),
            other => panic!("unexpected source: {other:?}"),
        }
        // Origin image removed from the body.
        assert!(!analysis.body_html.contains("pic.png"));
        assert!(analysis.body_html.contains("http://y/"));

        let with_link = "<body><p><a href=\"http://y/page\">l</a></p></body>";
        let analysis = analyze(with_link, &opts);
        match analysis.header_source {
            Some(HeaderSource::Remote(url)) => assert_eq!(url, "http://y/page"),
            other => panic!("unexpected source: {other:?}"),
        }

        let bare = "<body><p>text only</p></body>";
        let analysis = analyze(bare, &opts);
        match analysis.header_source {
            Some(HeaderSource::Remote(url)) => assert_eq!(url, "http://x/a"),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn origin_removal_collapses_empty_ancestors() {
        let html = "<body><div><p><img src=\"http://x/pic.png\"></p></div><p>kept</p></body>";
        let mut opts = bare_opts("http://x/a");
        opts.generate_title_image = true;
        let analysis = analyze(html, &opts);
        assert!(!analysis.body_html.contains("<div>"));
        assert!(analysis.body_html.contains("kept"));
    }

    #[test]
    fn classify_special_urls() {
        assert!(matches!(
            classify_header_url("https://vxreddit.com/r/x/comments/abc/t"),
            HeaderSource::RedditEmbed(_)
        ));
        assert!(matches!(
            classify_header_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            HeaderSource::YoutubeEmbed(_)
        ));
        assert!(matches!(
            classify_header_url("https://www.reddit.com/r/rust/comments/abc/t"),
            HeaderSource::RedditPost { .. }
        ));
        assert!(matches!(classify_header_url("data:image/png;base64,AA=="), HeaderSource::DataUri(_)));
        assert!(matches!(classify_header_url("https://example.com/a"), HeaderSource::Remote(_)));
    }

    #[test]
    fn reddit_leftover_removal_collapses_parents() {
        let body = concat!(
            "<p><a href=\"https://reddit.com/r/x/comments/abc/title\">View video</a></p>",
            "<p><img src=\"https://preview.redd.it/abc.jpg\" alt=\"video thumbnail\"></p>",
            "<p>kept text</p>"
        );
        let out = strip_reddit_leftovers(body, "https://www.reddit.com/r/x/comments/abc/title");
        assert!(!out.contains("View video"));
        assert!(!out.contains("preview.redd.it"));
        assert!(!out.contains("<p></p>"));
        assert!(out.contains("kept text"));
    }

    #[test]
    fn reddit_leftover_removal_drops_vredd_links() {
        let body = "<p><a href=\"https://v.redd.it/xyz\">direct</a> and <span>words</span></p>";
        let out = strip_reddit_leftovers(body, "https://www.reddit.com/r/x/comments/abc/title");
        assert!(!out.contains("v.redd.it"));
        assert!(out.contains("words"));
    }

    #[test]
    fn youtube_leftover_removal_matches_video_id() {
        let body = concat!(
            "<p><a href=\"https://youtu.be/dQw4w9WgXcQ\">watch</a></p>",
            "<p><a href=\"https://youtu.be/otherVideo1\">other</a></p>"
        );
        let out = strip_youtube_leftovers(body, "dQw4w9WgXcQ");
        assert!(!out.contains("dQw4w9WgXcQ"));
        assert!(out.contains("otherVideo1"));
    }

    #[test]
    fn selector_removal_skips_invalid() {
        let html = "<article><section><div class=\"ads\">buy</div><p>text</p></section></article>";
        let out = remove_selectors(html, &[":::garbage".to_string(), ".ads".to_string()]);
        assert!(!out.contains("buy"));
        assert!(out.contains("text"));
    }

    #[test]
    fn primary_section_reuses_single_section() {
        assert_eq!(wrap_primary_section("<section><p>a</p></section>"), "<section><p>a</p></section>");
        let wrapped = wrap_primary_section("<p>a</p><p>b</p>");
        assert_eq!(wrapped, "<section><p>a</p><p>b</p></section>");
    }

    #[test]
    fn fallback_wrap_adds_footer_only_when_configured() {
        let mut opts = bare_opts("http://x/a");
        assert_eq!(fallback_wrap("<p>x</p>", &opts), "<article><p>x</p></article>");
        opts.add_source_footer = true;
        let wrapped = fallback_wrap("<p>x</p>", &opts);
        assert!(wrapped.contains("href=\"http://x/a\""));
        assert!(wrapped.ends_with("</article>"));
    }

    #[tokio::test]
    async fn process_assembles_article_with_footer() {
        let fetcher = Arc::new(crate::fetcher::Fetcher::new(crate::config::FetchConfig::default()));
        let processor = ContentProcessor::new(Arc::new(ImageExtractor::new(fetcher)));
        let opts = ProcessOptions {
            article_url: "http://x/1".to_string(),
            add_source_footer: true,
            generate_title_image: false,
            ..Default::default()
        };
        let out = processor.process("<p>hello</p>", &opts).await.unwrap();
        assert!(out.starts_with("<article>"));
        assert!(out.ends_with("</article>"));
        assert_eq!(out.matches("<footer").count(), 1);
        assert!(out.contains("<a href=\"http://x/1\" style=\"float:right\">Source</a>"));
        assert_eq!(out.matches("<section>").count(), 1);
    }

    #[tokio::test]
    async fn process_preserves_existing_footer() {
        let fetcher = Arc::new(crate::fetcher::Fetcher::new(crate::config::FetchConfig::default()));
        let processor = ContentProcessor::new(Arc::new(ImageExtractor::new(fetcher)));
        let opts = ProcessOptions {
            article_url: "http://x/1".to_string(),
            add_source_footer: true,
            generate_title_image: false,
            ..Default::default()
        };
        let out = processor
            .process("<article><p>hello</p><footer>original</footer></article>", &opts)
            .await
            .unwrap();
        assert_eq!(out.matches("<footer").count(), 1);
        assert!(out.contains("original"));
        assert!(!out.contains("float:right"));
    }
}
