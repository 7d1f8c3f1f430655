use super::Store;
use crate::error::{AggregatorError, Result};
use crate::types::{AiHints, Feed, FeedGroup, FeedKind, FeedOptions};
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, info};

/// Parameters for creating a feed. Identifier validation happens in the
/// aggregator plugin before this is called.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub user_id: Option<i64>,
    pub kind: FeedKind,
    pub identifier: String,
    pub name: String,
    pub options: FeedOptions,
    pub ai_hints: AiHints,
}

impl Store {
    pub async fn create_feed(&self, new: NewFeed) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO feeds (user_id, kind, identifier, name, options, ai_hints, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(&new.identifier)
        .bind(&new.name)
        .bind(serde_json::to_string(&new.options)?)
        .bind(serde_json::to_string(&new.ai_hints)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                AggregatorError::Validation(format!("a feed named `{}` already exists", new.name))
            }
            other => other.into(),
        })?;

        let feed_id = result.last_insert_rowid();
        info!(feed_id, kind = new.kind.as_str(), identifier = %new.identifier, "created feed");
        Ok(feed_id)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed> {
        let row = sqlx::query("SELECT * FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => feed_from_row(&row),
            None => Err(AggregatorError::FeedNotFound { id: feed_id }),
        }
    }

    pub async fn list_enabled_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query("SELECT * FROM feeds WHERE enabled = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(feed_from_row).collect()
    }

    /// Feeds visible to one user: their own plus the shared ones.
    pub async fn list_feeds_for_user(&self, user_id: i64) -> Result<Vec<Feed>> {
        let rows = sqlx::query(
            "SELECT * FROM feeds WHERE enabled = 1 AND (user_id IS NULL OR user_id = ?) ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(feed_from_row).collect()
    }

    pub async fn set_feed_enabled(&self, feed_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE feeds SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        info!(feed_id, enabled, "feed enabled flag changed");
        Ok(())
    }

    pub async fn set_feed_name(&self, feed_id: i64, name: &str) -> Result<()> {
        sqlx::query("UPDATE feeds SET name = ? WHERE id = ?")
            .bind(name)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the collected icon, base64-encoded. Only called when the
    /// feed has none yet.
    pub async fn set_feed_icon(&self, feed_id: i64, icon: &str) -> Result<()> {
        sqlx::query("UPDATE feeds SET icon = ? WHERE id = ? AND icon IS NULL")
            .bind(icon)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        debug!(feed_id, "feed icon stored");
        Ok(())
    }

    pub async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        info!(feed_id, "feed deleted");
        Ok(())
    }

    pub async fn create_feed_group(&self, user_id: i64, name: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO feed_groups (user_id, name) VALUES (?, ?) ON CONFLICT (user_id, name) DO NOTHING",
        )
        .bind(user_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(result.last_insert_rowid());
        }
        let id: i64 = sqlx::query_scalar("SELECT id FROM feed_groups WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn list_feed_groups(&self, user_id: i64) -> Result<Vec<FeedGroup>> {
        let rows = sqlx::query("SELECT id, user_id, name FROM feed_groups WHERE user_id = ? ORDER BY name")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(FeedGroup {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    pub async fn set_feed_group(&self, feed_id: i64, group_id: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE feeds SET group_id = ? WHERE id = ?")
            .bind(group_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_feed_ids_in_group(&self, user_id: i64, group_name: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id FROM feeds f
            JOIN feed_groups g ON g.id = f.group_id
            WHERE g.user_id = ? AND g.name = ? AND f.enabled = 1
            "#,
        )
        .bind(user_id)
        .bind(group_name)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| Ok(row.try_get("id")?)).collect()
    }

    pub async fn feed_group_of(&self, feed_id: i64) -> Result<Option<FeedGroup>> {
        let row = sqlx::query(
            r#"
            SELECT g.id, g.user_id, g.name FROM feed_groups g
            JOIN feeds f ON f.group_id = g.id
            WHERE f.id = ?
            "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(FeedGroup {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }
}

pub(super) fn feed_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Feed> {
    let kind_str: String = row.try_get("kind")?;
    let kind = FeedKind::parse(&kind_str)
        .ok_or_else(|| AggregatorError::General(format!("unknown aggregator kind `{kind_str}` on feed row")))?;

    let options_json: String = row.try_get("options")?;
    let ai_hints_json: String = row.try_get("ai_hints")?;

    Ok(Feed {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        identifier: row.try_get("identifier")?,
        name: row.try_get("name")?,
        icon: row.try_get("icon")?,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        options: serde_json::from_str(&options_json)?,
        ai_hints: serde_json::from_str(&ai_hints_json)?,
        created_at: row.try_get("created_at")?,
    })
}
