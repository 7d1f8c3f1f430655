use super::ids::{format_item_id, StreamId};
use crate::error::{AggregatorError, Result};
use crate::store::Store;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sqlx::Row;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Unread-count responses are cached briefly; clients poll this endpoint
/// aggressively.
const UNREAD_CACHE_TTL: Duration = Duration::from_secs(30);

const MAX_ITEM_IDS: i64 = 10_000;
const DEFAULT_CONTENTS_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub id: String,
    pub count: i64,
    #[serde(rename = "newestItemTimestampUsec")]
    pub newest_item_timestamp_usec: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCounts {
    pub max: i64,
    pub unreadcounts: Vec<UnreadCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRefs {
    #[serde(rename = "itemRefs")]
    pub item_refs: Vec<ItemRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Origin {
    #[serde(rename = "streamId")]
    pub stream_id: String,
    pub title: String,
    #[serde(rename = "htmlUrl")]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamItem {
    pub id: String,
    pub title: String,
    pub published: i64,
    pub updated: i64,
    #[serde(rename = "crawlTimeMsec")]
    pub crawl_time_msec: String,
    #[serde(rename = "timestampUsec")]
    pub timestamp_usec: String,
    pub alternate: Vec<Link>,
    pub canonical: Vec<Link>,
    pub categories: Vec<String>,
    pub origin: Origin,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamContents {
    pub id: String,
    pub updated: i64,
    pub items: Vec<StreamItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

/// Filters shared by the item-id and contents queries.
#[derive(Debug, Clone, Default)]
pub struct StreamQuery {
    pub older_than: Option<DateTime<Utc>>,
    pub exclude_read: bool,
    pub starred_only: bool,
    pub reverse_order: bool,
    pub limit: Option<i64>,
    pub continuation: Option<String>,
    pub item_ids: Vec<i64>,
}

enum Bind {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

/// GReader read path over the article store: unread counts, item-id
/// listings and full stream contents. Read-only and safe to run fully in
/// parallel; mutations made concurrently show up as phantom rows at
/// worst.
pub struct StreamService {
    store: Arc<Store>,
    unread_cache: DashMap<(i64, bool), (Instant, UnreadCounts)>,
}

impl StreamService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, unread_cache: DashMap::new() }
    }

    /// Per-feed unread counts from two aggregate queries: article totals
    /// per feed and read-state counts per feed. No per-article iteration.
    pub async fn unread_count(&self, user_id: i64, include_all: bool) -> Result<UnreadCounts> {
        let key = (user_id, include_all);
        if let Some(entry) = self.unread_cache.get(&key) {
            let (cached_at, cached) = entry.value();
            if cached_at.elapsed() < UNREAD_CACHE_TTL {
                return Ok(cached.clone());
            }
        }

        let totals = sqlx::query(
            r#"
            SELECT f.id AS feed_id, COUNT(a.id) AS total, MAX(a.date) AS newest
            FROM feeds f
            LEFT JOIN articles a ON a.feed_id = f.id
            WHERE f.enabled = 1 AND (f.user_id IS NULL OR f.user_id = ?)
            GROUP BY f.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;

        let read_counts = sqlx::query(
            r#"
            SELECT a.feed_id AS feed_id, COUNT(*) AS read_count
            FROM user_article_states s
            JOIN articles a ON a.id = s.article_id
            WHERE s.user_id = ? AND s.is_read = 1
            GROUP BY a.feed_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;

        let mut read_by_feed = std::collections::HashMap::new();
        for row in &read_counts {
            let feed_id: i64 = row.try_get("feed_id")?;
            let read_count: i64 = row.try_get("read_count")?;
            read_by_feed.insert(feed_id, read_count);
        }

        let mut unreadcounts = Vec::new();
        let mut max = 0;
        for row in &totals {
            let feed_id: i64 = row.try_get("feed_id")?;
            let total: i64 = row.try_get("total")?;
            let newest: Option<DateTime<Utc>> = row.try_get("newest")?;
            let count = total - read_by_feed.get(&feed_id).copied().unwrap_or(0);
            max += count;
            if count > 0 || include_all {
                unreadcounts.push(UnreadCount {
                    id: format!("feed/{feed_id}"),
                    count,
                    newest_item_timestamp_usec: newest
                        .map(|dt| dt.timestamp_micros().to_string())
                        .unwrap_or_else(|| "0".to_string()),
                });
            }
        }

        let response = UnreadCounts { max, unreadcounts };
        self.unread_cache.insert(key, (Instant::now(), response.clone()));
        Ok(response)
    }

    /// Item ids for a stream, newest first unless reversed. `older_than`
    /// filters strictly below the given article date.
    pub async fn stream_item_ids(
        &self,
        user_id: i64,
        stream: &StreamId,
        query: &StreamQuery,
    ) -> Result<ItemRefs> {
        let limit = query.limit.unwrap_or(MAX_ITEM_IDS).clamp(1, MAX_ITEM_IDS);

        let (mut sql, mut binds) = self.base_filter(user_id, stream, query)?;
        sql.push_str(if query.reverse_order {
            " ORDER BY a.date ASC, a.id ASC"
        } else {
            " ORDER BY a.date DESC, a.id DESC"
        });
        sql.push_str(" LIMIT ?");
        binds.push(Bind::Int(limit));

        let select = format!(
            "SELECT a.id FROM articles a JOIN feeds f ON f.id = a.feed_id WHERE {sql}"
        );
        let rows = bind_all(sqlx::query(&select), &binds).fetch_all(self.store.pool()).await?;

        let item_refs = rows
            .iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                Ok(ItemRef { id: id.to_string() })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(user_id, count = item_refs.len(), "stream item ids");
        Ok(ItemRefs { item_refs })
    }

    /// Stream contents with the canonical envelope and an offset-based
    /// continuation token. The continuation only appears when exactly
    /// `limit` rows came back, the "possibly more" signal.
    pub async fn stream_contents(
        &self,
        user_id: i64,
        stream: &StreamId,
        stream_id_raw: &str,
        query: &StreamQuery,
    ) -> Result<StreamContents> {
        let limit = query.limit.unwrap_or(DEFAULT_CONTENTS_LIMIT).clamp(1, MAX_ITEM_IDS);
        // NaN-safe: anything unparsable is offset zero.
        let offset = query
            .continuation
            .as_deref()
            .and_then(|c| c.parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);

        let (filter, mut binds) = self.base_filter(user_id, stream, query)?;

        let mut sql = format!(
            r#"
            SELECT a.*, f.id AS f_id, f.name AS feed_name, f.identifier AS feed_identifier,
                   COALESCE(s.is_read, 0) AS is_read, COALESCE(s.is_saved, 0) AS is_saved
            FROM articles a
            JOIN feeds f ON f.id = a.feed_id
            LEFT JOIN user_article_states s ON s.article_id = a.id AND s.user_id = ?
            WHERE {filter}
            "#
        );
        binds.insert(0, Bind::Int(user_id));

        sql.push_str(if query.reverse_order {
            " ORDER BY a.date ASC, a.id ASC"
        } else {
            " ORDER BY a.date DESC, a.id DESC"
        });
        // Fetch offset+limit and slice; an extra OFFSET clause would hide
        // whether the window filled up.
        sql.push_str(" LIMIT ?");
        binds.push(Bind::Int(offset + limit));

        let rows = bind_all(sqlx::query(&sql), &binds).fetch_all(self.store.pool()).await?;

        let mut items = Vec::new();
        for row in rows.iter().skip(offset as usize) {
            items.push(stream_item_from_row(row)?);
        }

        let continuation = if items.len() as i64 == limit {
            Some((offset + limit).to_string())
        } else {
            None
        };

        Ok(StreamContents {
            id: stream_id_raw.to_string(),
            updated: Utc::now().timestamp(),
            items,
            continuation,
        })
    }

    /// Shared WHERE clause: access control plus the stream and tag
    /// filters. Returns SQL with `?` placeholders and the matching binds.
    fn base_filter(
        &self,
        user_id: i64,
        stream: &StreamId,
        query: &StreamQuery,
    ) -> Result<(String, Vec<Bind>)> {
        let mut sql = String::from("f.enabled = 1 AND (f.user_id IS NULL OR f.user_id = ?)");
        let mut binds = vec![Bind::Int(user_id)];

        match stream {
            StreamId::Feed(feed_id) => {
                sql.push_str(" AND a.feed_id = ?");
                binds.push(Bind::Int(*feed_id));
            }
            StreamId::Label(name) => {
                sql.push_str(
                    " AND f.group_id IN (SELECT id FROM feed_groups WHERE user_id = ? AND name = ?)",
                );
                binds.push(Bind::Int(user_id));
                binds.push(Bind::Text(name.clone()));
            }
            StreamId::ReadingList => {}
            // The starred stream is answered directly, no recursion
            // through the include-tag path.
            StreamId::Starred => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM user_article_states s2 WHERE s2.article_id = a.id AND s2.user_id = ? AND s2.is_saved = 1)",
                );
                binds.push(Bind::Int(user_id));
            }
            StreamId::Read => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM user_article_states s2 WHERE s2.article_id = a.id AND s2.user_id = ? AND s2.is_read = 1)",
                );
                binds.push(Bind::Int(user_id));
            }
        }

        if let Some(older_than) = query.older_than {
            sql.push_str(" AND a.date < ?");
            binds.push(Bind::Time(older_than));
        }
        if query.exclude_read {
            sql.push_str(
                " AND NOT EXISTS (SELECT 1 FROM user_article_states s3 WHERE s3.article_id = a.id AND s3.user_id = ? AND s3.is_read = 1)",
            );
            binds.push(Bind::Int(user_id));
        }
        if query.starred_only && !matches!(stream, StreamId::Starred) {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM user_article_states s4 WHERE s4.article_id = a.id AND s4.user_id = ? AND s4.is_saved = 1)",
            );
            binds.push(Bind::Int(user_id));
        }
        if !query.item_ids.is_empty() {
            let placeholders = vec!["?"; query.item_ids.len()].join(", ");
            sql.push_str(&format!(" AND a.id IN ({placeholders})"));
            for id in &query.item_ids {
                binds.push(Bind::Int(*id));
            }
        }

        Ok((sql, binds))
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Int(v) => query.bind(*v),
            Bind::Text(v) => query.bind(v.as_str()),
            Bind::Time(v) => query.bind(*v),
        };
    }
    query
}

fn stream_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StreamItem> {
    let article_id: i64 = row.try_get("id")?;
    let feed_id: i64 = row.try_get("f_id")?;
    let url: String = row.try_get("url")?;
    let date: DateTime<Utc> = row.try_get("date")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let is_read: i64 = row.try_get("is_read")?;
    let is_saved: i64 = row.try_get("is_saved")?;
    let feed_identifier: String = row.try_get("feed_identifier")?;

    let mut categories = vec!["user/-/state/com.google/reading-list".to_string()];
    if is_read != 0 {
        categories.push("user/-/state/com.google/read".to_string());
    }
    if is_saved != 0 {
        categories.push("user/-/state/com.google/starred".to_string());
    }

    Ok(StreamItem {
        id: format_item_id(article_id),
        title: row.try_get("name")?,
        published: date.timestamp(),
        updated: date.timestamp(),
        crawl_time_msec: created_at.timestamp_millis().to_string(),
        timestamp_usec: date.timestamp_micros().to_string(),
        alternate: vec![Link { href: url.clone(), link_type: Some("text/html".to_string()) }],
        canonical: vec![Link { href: url, link_type: None }],
        categories,
        origin: Origin {
            stream_id: format!("feed/{feed_id}"),
            title: row.try_get("feed_name")?,
            html_url: feed_identifier,
        },
        summary: Summary { content: row.try_get("content")? },
        author: row.try_get("author")?,
    })
}

impl AggregatorError {
    /// 404-equivalent for unknown stream ids at the API layer.
    pub fn unknown_stream(raw: &str) -> Self {
        AggregatorError::Validation(format!("unrecognized stream id `{raw}`"))
    }
}
