use super::Store;
use crate::error::Result;
use crate::types::AggregationRun;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Store {
    pub async fn start_run(&self, feed_id: i64) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query("INSERT INTO aggregation_runs (id, feed_id, started_at) VALUES (?, ?, ?)")
            .bind(run_id.to_string())
            .bind(feed_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(run_id)
    }

    pub async fn finish_run(
        &self,
        run_id: Uuid,
        success: bool,
        reason: Option<&str>,
        inserted: i64,
        updated: i64,
        skipped: i64,
        errored: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE aggregation_runs
            SET finished_at = ?, success = ?, reason = ?,
                inserted = ?, updated = ?, skipped = ?, errored = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(success)
        .bind(reason)
        .bind(inserted)
        .bind(updated)
        .bind(skipped)
        .bind(errored)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_runs(&self, feed_id: i64, limit: i64) -> Result<Vec<AggregationRun>> {
        let rows = sqlx::query(
            "SELECT * FROM aggregation_runs WHERE feed_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id_text: String = row.try_get("id")?;
                Ok(AggregationRun {
                    id: Uuid::parse_str(&id_text)
                        .map_err(|e| crate::error::AggregatorError::General(e.to_string()))?,
                    feed_id: row.try_get("feed_id")?,
                    started_at: row.try_get("started_at")?,
                    finished_at: row.try_get("finished_at")?,
                    success: row.try_get::<i64, _>("success")? != 0,
                    reason: row.try_get("reason")?,
                    inserted: row.try_get("inserted")?,
                    updated: row.try_get("updated")?,
                    skipped: row.try_get("skipped")?,
                    errored: row.try_get("errored")?,
                })
            })
            .collect()
    }
}
