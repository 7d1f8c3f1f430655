use super::Store;
use crate::error::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

impl Store {
    /// Upsert one flag of the (user, article) state row, creating it
    /// lazily on the first toggle.
    pub async fn set_read(&self, user_id: i64, article_id: i64, is_read: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_article_states (user_id, article_id, is_read, is_saved, updated_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT (user_id, article_id)
            DO UPDATE SET is_read = excluded.is_read, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(article_id)
        .bind(is_read)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!(user_id, article_id, is_read, "read flag updated");
        Ok(())
    }

    pub async fn set_saved(&self, user_id: i64, article_id: i64, is_saved: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_article_states (user_id, article_id, is_read, is_saved, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT (user_id, article_id)
            DO UPDATE SET is_saved = excluded.is_saved, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(article_id)
        .bind(is_saved)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!(user_id, article_id, is_saved, "saved flag updated");
        Ok(())
    }

    pub async fn is_read(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let flag: Option<i64> = sqlx::query_scalar(
            "SELECT is_read FROM user_article_states WHERE user_id = ? AND article_id = ?",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flag.unwrap_or(0) != 0)
    }

    pub async fn is_saved(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let flag: Option<i64> = sqlx::query_scalar(
            "SELECT is_saved FROM user_article_states WHERE user_id = ? AND article_id = ?",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Mark every accessible article in one feed as read, optionally only
    /// those at or before a cutoff timestamp.
    pub async fn mark_feed_read(
        &self,
        user_id: i64,
        feed_id: i64,
        up_to: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let now = Utc::now();
        let result = match up_to {
            Some(cutoff) => {
                sqlx::query(
                    r#"
                    INSERT INTO user_article_states (user_id, article_id, is_read, is_saved, updated_at)
                    SELECT ?, a.id, 1, 0, ?
                    FROM articles a WHERE a.feed_id = ? AND a.date <= ?
                    ON CONFLICT (user_id, article_id)
                    DO UPDATE SET is_read = 1, updated_at = excluded.updated_at
                    "#,
                )
                .bind(user_id)
                .bind(now)
                .bind(feed_id)
                .bind(cutoff)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO user_article_states (user_id, article_id, is_read, is_saved, updated_at)
                    SELECT ?, a.id, 1, 0, ?
                    FROM articles a WHERE a.feed_id = ?
                    ON CONFLICT (user_id, article_id)
                    DO UPDATE SET is_read = 1, updated_at = excluded.updated_at
                    "#,
                )
                .bind(user_id)
                .bind(now)
                .bind(feed_id)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }
}
