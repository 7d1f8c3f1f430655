use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Closed set of aggregator kinds. Each kind maps to one plugin in the
/// registry; the string forms are what gets persisted on the feed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    FullWebsite,
    FeedContent,
    Youtube,
    Reddit,
    Podcast,
    MeinMmo,
    Heise,
    Merkur,
    Tagesschau,
    Explosm,
    DarkLegacy,
    Oglaf,
    CaschysBlog,
    Mactechnews,
}

impl FeedKind {
    pub const ALL: [FeedKind; 14] = [
        FeedKind::FullWebsite,
        FeedKind::FeedContent,
        FeedKind::Youtube,
        FeedKind::Reddit,
        FeedKind::Podcast,
        FeedKind::MeinMmo,
        FeedKind::Heise,
        FeedKind::Merkur,
        FeedKind::Tagesschau,
        FeedKind::Explosm,
        FeedKind::DarkLegacy,
        FeedKind::Oglaf,
        FeedKind::CaschysBlog,
        FeedKind::Mactechnews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::FullWebsite => "full_website",
            FeedKind::FeedContent => "feed_content",
            FeedKind::Youtube => "youtube",
            FeedKind::Reddit => "reddit",
            FeedKind::Podcast => "podcast",
            FeedKind::MeinMmo => "mein_mmo",
            FeedKind::Heise => "heise",
            FeedKind::Merkur => "merkur",
            FeedKind::Tagesschau => "tagesschau",
            FeedKind::Explosm => "explosm",
            FeedKind::DarkLegacy => "dark_legacy",
            FeedKind::Oglaf => "oglaf",
            FeedKind::CaschysBlog => "caschys_blog",
            FeedKind::Mactechnews => "mactechnews",
        }
    }

    pub fn parse(s: &str) -> Option<FeedKind> {
        FeedKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feed options map. Persisted as JSON on the feed row; unknown keys
/// are kept so older rows survive plugin upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_selectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_title_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_content_contains: Vec<String>,
    /// Raw `pattern|replacement` lines, parsed by the content processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_replacements: Option<String>,
    #[serde(default)]
    pub traverse_multipage: bool,
    #[serde(default)]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub use_current_timestamp: bool,
    #[serde(default = "default_true")]
    pub generate_title_image: bool,
    #[serde(default)]
    pub add_source_footer: bool,
    /// -1 unlimited, 0 disabled, n > 0 daily target.
    #[serde(default = "default_daily_post_limit")]
    pub daily_post_limit: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            exclude_selectors: Vec::new(),
            ignore_title_contains: Vec::new(),
            ignore_content_contains: Vec::new(),
            regex_replacements: None,
            traverse_multipage: false,
            skip_duplicates: false,
            use_current_timestamp: false,
            generate_title_image: true,
            add_source_footer: false,
            daily_post_limit: -1,
            extra: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_daily_post_limit() -> i64 {
    -1
}

/// Pluggable text-transform hints. The engine only carries these through;
/// the transform itself is an injected collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiHints {
    #[serde(default)]
    pub summarize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

impl AiHints {
    pub fn is_empty(&self) -> bool {
        !self.summarize && self.translate_to.is_none() && self.custom_prompt.is_none()
    }
}

/// Configuration for one ingestion source.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    /// None means the feed is shared across all users.
    pub user_id: Option<i64>,
    pub kind: FeedKind,
    /// URL, subreddit name, channel id or handle, depending on kind.
    pub identifier: String,
    pub name: String,
    pub icon: Option<String>,
    pub enabled: bool,
    pub options: FeedOptions,
    pub ai_hints: AiHints,
    pub created_at: DateTime<Utc>,
}

/// Transient pre-persistence item emitted by `parse_to_raw_articles`.
#[derive(Debug, Clone, Default)]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub external_id: Option<String>,
    /// Source-specific markers, e.g. the multipage flag.
    pub tags: Vec<String>,
}

impl RawArticle {
    pub const TAG_MULTIPAGE: &'static str = "__isMultiPage";

    pub fn is_multipage(&self) -> bool {
        self.tags.iter().any(|t| t == Self::TAG_MULTIPAGE)
    }
}

/// Persisted, processed item. `content` is an HTML fragment rooted at
/// `<article>` with at most one header, one primary section and an
/// optional footer.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    /// Trailing slash, fragment and query stripped; dedup key together
    /// with `feed_id`.
    pub canonical_url: String,
    pub name: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub author: Option<String>,
    pub external_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub score: i64,
    pub view_count: i64,
}

/// Per-(user, article) read/star flags, created lazily on first toggle.
#[derive(Debug, Clone)]
pub struct UserArticleState {
    pub user_id: i64,
    pub article_id: i64,
    pub is_read: bool,
    pub is_saved: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FeedGroup {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

/// Outcome record of one aggregation run, persisted for operators.
#[derive(Debug, Clone)]
pub struct AggregationRun {
    pub id: Uuid,
    pub feed_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub reason: Option<String>,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub errored: i64,
}

/// Normalize a URL for dedup comparison: drop fragment and query, strip a
/// single trailing slash. The original stays on the article for display.
pub fn canonicalize_url(raw: &str) -> String {
    let mut s = raw;
    if let Some(idx) = s.find('#') {
        s = &s[..idx];
    }
    if let Some(idx) = s.find('?') {
        s = &s[..idx];
    }
    let trimmed = s.strip_suffix('/').unwrap_or(s);
    trimmed.to_string()
}

/// Widget hint for rendering a feed option in an admin UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionWidget {
    Text,
    Textarea,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Boolean,
    Integer,
    Float,
    String,
    Password,
    Choice,
}

/// One enumerated option a kind supports, for UI rendering.
#[derive(Debug, Clone, Serialize)]
pub struct OptionDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: OptionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<OptionWidget>,
}

impl OptionDescriptor {
    pub const fn new(key: &'static str, label: &'static str, kind: OptionType) -> Self {
        Self { key, label, kind, widget: None }
    }

    pub const fn widget(mut self, widget: OptionWidget) -> Self {
        self.widget = Some(widget);
        self
    }

    /// Widget used when none was set explicitly: strings render as text,
    /// everything else is inferred from the option type by the client.
    pub fn effective_widget(&self) -> Option<OptionWidget> {
        match self.widget {
            Some(w) => Some(w),
            None if self.kind == OptionType::String => Some(OptionWidget::Text),
            None => None,
        }
    }
}
