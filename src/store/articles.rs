use super::Store;
use crate::error::{AggregatorError, Result};
use crate::types::{canonicalize_url, Article, Feed};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use sqlx::Row;
use tracing::{debug, info};

/// How long a title blocks same-named articles in the same feed.
const TITLE_DEDUP_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: i64,
    pub url: String,
    pub name: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub author: Option<String>,
    pub external_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

/// What persistence decided for one enriched article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted(i64),
    Updated(i64),
    /// Same URL already present and read by the feed owner.
    SkippedRead,
    /// Same title within the recent window.
    SkippedRecentTitle,
}

impl Store {
    /// Dedup rules, evaluated in order: same-URL-in-feed (owner read →
    /// skip, unread → refresh in place), then recent same-title, then
    /// insert. `force_refresh` bypasses the title check so a manual run
    /// can re-ingest everything, but a read article is never overwritten.
    pub async fn persist_article(
        &self,
        feed: &Feed,
        new: NewArticle,
        force_refresh: bool,
    ) -> Result<PersistOutcome> {
        let canonical = canonicalize_url(&new.url);

        let existing = sqlx::query("SELECT id FROM articles WHERE feed_id = ? AND canonical_url = ?")
            .bind(new.feed_id)
            .bind(&canonical)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            let article_id: i64 = row.try_get("id")?;

            if self.owner_has_read(feed, article_id).await? {
                debug!(article_id, url = %new.url, "duplicate url already read, skipping");
                return Ok(PersistOutcome::SkippedRead);
            }

            // Unread duplicate: refresh content and date, keep id,
            // created_at and any read/star state.
            sqlx::query(
                r#"
                UPDATE articles
                SET name = ?, content = ?, date = ?, author = ?,
                    thumbnail_url = ?, media_url = ?, media_type = ?
                WHERE id = ?
                "#,
            )
            .bind(&new.name)
            .bind(&new.content)
            .bind(new.date)
            .bind(&new.author)
            .bind(&new.thumbnail_url)
            .bind(&new.media_url)
            .bind(&new.media_type)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
            debug!(article_id, url = %new.url, "refreshed unread duplicate");
            return Ok(PersistOutcome::Updated(article_id));
        }

        if !force_refresh {
            let cutoff = Utc::now() - Duration::days(TITLE_DEDUP_WINDOW_DAYS);
            let title_dup: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM articles WHERE feed_id = ? AND name = ? AND created_at >= ?",
            )
            .bind(new.feed_id)
            .bind(&new.name)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
            if title_dup > 0 {
                debug!(title = %new.name, "recent article with same title, skipping");
                return Ok(PersistOutcome::SkippedRecentTitle);
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (feed_id, url, canonical_url, name, content, date, created_at,
                 author, external_id, thumbnail_url, media_url, media_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.feed_id)
        .bind(&new.url)
        .bind(&canonical)
        .bind(&new.name)
        .bind(&new.content)
        .bind(new.date)
        .bind(Utc::now())
        .bind(&new.author)
        .bind(&new.external_id)
        .bind(&new.thumbnail_url)
        .bind(&new.media_url)
        .bind(&new.media_type)
        .execute(&self.pool)
        .await?;

        let article_id = result.last_insert_rowid();
        info!(article_id, url = %new.url, "inserted article");
        Ok(PersistOutcome::Inserted(article_id))
    }

    /// Whether the feed owner has read the article. Shared feeds have no
    /// owner, so their duplicates always refresh.
    async fn owner_has_read(&self, feed: &Feed, article_id: i64) -> Result<bool> {
        let Some(owner) = feed.user_id else {
            return Ok(false);
        };
        let is_read: Option<i64> = sqlx::query_scalar(
            "SELECT is_read FROM user_article_states WHERE user_id = ? AND article_id = ?",
        )
        .bind(owner)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(is_read.unwrap_or(0) != 0)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Article> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => article_from_row(&row),
            None => Err(AggregatorError::General(format!("article {article_id} not found"))),
        }
    }

    /// Count and newest insertion since UTC midnight, for the quota
    /// distributor. One aggregate query at run start.
    pub async fn posts_today(&self, feed_id: i64) -> Result<(i64, Option<DateTime<Utc>>)> {
        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, MAX(created_at) AS newest FROM articles WHERE feed_id = ? AND created_at >= ?",
        )
        .bind(feed_id)
        .bind(midnight)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("n")?;
        let newest: Option<DateTime<Utc>> = row.try_get("newest")?;
        Ok((count, newest))
    }

    /// Whether a URL already exists in the feed, without side effects.
    pub async fn article_exists(&self, feed_id: i64, url: &str) -> Result<bool> {
        let canonical = canonicalize_url(url);
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE feed_id = ? AND canonical_url = ?")
                .bind(feed_id)
                .bind(&canonical)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn list_articles_for_feed(&self, feed_id: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query("SELECT * FROM articles WHERE feed_id = ? ORDER BY date DESC, id DESC")
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(article_from_row).collect()
    }

    pub async fn count_articles(&self, feed_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn delete_article(&self, article_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(super) fn article_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        feed_id: row.try_get("feed_id")?,
        url: row.try_get("url")?,
        canonical_url: row.try_get("canonical_url")?,
        name: row.try_get("name")?,
        content: row.try_get("content")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
        author: row.try_get("author")?,
        external_id: row.try_get("external_id")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        media_url: row.try_get("media_url")?,
        media_type: row.try_get("media_type")?,
        score: row.try_get("score")?,
        view_count: row.try_get("view_count")?,
    })
}
