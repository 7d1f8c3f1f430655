use url::Url;

pub use crate::images::strategies::youtube_video_id;

/// Header block embedding a YouTube player at a responsive 16:9.
pub fn youtube_embed_header(video_id: &str) -> String {
    format!(
        "<header><div style=\"position:relative; padding-bottom:56.25%; height:0; overflow:hidden; max-width:100%\">\
<iframe src=\"https://www.youtube.com/embed/{video_id}\" \
style=\"position:absolute; top:0; left:0; width:100%; height:100%\" \
frameborder=\"0\" allowfullscreen></iframe></div></header>"
    )
}

/// Header block embedding a Reddit post player.
pub fn reddit_embed_header(embed_url: &str) -> String {
    format!(
        "<header><iframe src=\"{embed_url}\" \
style=\"width:100%; min-height:500px; border:none\" \
sandbox=\"allow-scripts allow-same-origin allow-popups\"></iframe></header>"
    )
}

/// vxreddit.com mirrors and reddit.com/embed URLs both produce the
/// Reddit-embed header.
pub fn is_reddit_embed_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };
    let Some(host) = parsed.host_str() else { return false };
    let host = host.strip_prefix("www.").unwrap_or(host);

    if host == "vxreddit.com" || host.ends_with(".vxreddit.com") {
        return true;
    }
    (host == "reddit.com" || host.ends_with(".reddit.com")) && parsed.path().starts_with("/embed")
}

/// A regular (non-embed) Reddit post link.
pub fn is_reddit_post_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };
    let Some(host) = parsed.host_str() else { return false };
    let host = host.strip_prefix("www.").unwrap_or(host);
    (host == "reddit.com" || host.ends_with(".reddit.com")) && parsed.path().contains("/comments/")
}

pub fn subreddit_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("r"), Some(sub)) if !sub.is_empty() => Some(sub.to_string()),
        _ => None,
    }
}

/// Rewrite a vxreddit/embed URL back to the canonical reddit.com post URL.
pub fn reddit_post_url_from_embed(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_start_matches("/embed");
    if !path.contains("/comments/") {
        return None;
    }
    Some(format!("https://www.reddit.com{path}"))
}

/// Compare two URLs as post links: case-insensitive, ignoring trailing
/// slash, query and fragment.
pub fn same_post_url(a: &str, b: &str) -> bool {
    normalize_post_url(a) == normalize_post_url(b)
}

fn normalize_post_url(raw: &str) -> String {
    let mut s = raw;
    if let Some(idx) = s.find(|c| c == '#' || c == '?') {
        s = &s[..idx];
    }
    s.trim_end_matches('/').to_ascii_lowercase().replace("://www.", "://")
}

/// v.redd.it video links are leftovers once a Reddit embed header exists.
pub fn is_vredd_it_link(href: &str) -> bool {
    let Ok(parsed) = Url::parse(href) else { return false };
    parsed.host_str().is_some_and(|h| h == "v.redd.it" || h.ends_with(".v.redd.it"))
}

/// Reddit-hosted preview/thumbnail image hosts.
pub fn is_reddit_preview_host(src: &str) -> bool {
    let Ok(parsed) = Url::parse(src) else { return false };
    parsed.host_str().is_some_and(|h| {
        h == "preview.redd.it" || h == "i.redd.it" || h == "external-preview.redd.it"
    })
}

/// "video thumbnail" markers in the alt text or the surrounding copy.
pub fn indicates_video_thumbnail(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("video")
}
