use super::Store;
use crate::error::Result;
use chrono::{Duration, Utc};
use sqlx::Row;
use tracing::debug;

impl Store {
    /// Most recent cached page for a URL, if younger than `max_age_days`.
    /// The cache is advisory; callers treat any failure as a miss.
    pub async fn cached_content(&self, url: &str, max_age_days: i64) -> Result<Option<String>> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let row = sqlx::query("SELECT html, cached_at FROM content_cache WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let cached_at: chrono::DateTime<Utc> = row.try_get("cached_at")?;
        if cached_at < cutoff {
            debug!(url, "cached content expired");
            return Ok(None);
        }
        Ok(Some(row.try_get("html")?))
    }

    /// Idempotent write of the latest fetched page.
    pub async fn cache_content(&self, url: &str, html: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_cache (url, html, cached_at) VALUES (?, ?, ?)
            ON CONFLICT (url) DO UPDATE SET html = excluded.html, cached_at = excluded.cached_at
            "#,
        )
        .bind(url)
        .bind(html)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn evict_stale_content(&self, max_age_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let result = sqlx::query("DELETE FROM content_cache WHERE cached_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            debug!(evicted = result.rows_affected(), "content cache sweep");
        }
        Ok(result.rows_affected())
    }
}
