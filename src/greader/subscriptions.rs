use crate::error::Result;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCategory {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: String,
    pub title: String,
    pub categories: Vec<SubscriptionCategory>,
    pub sortid: String,
    pub firstitemmsec: String,
    #[serde(rename = "htmlUrl")]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionList {
    pub subscriptions: Vec<Subscription>,
}

/// Feeds visible to the user, with their group as the single GReader
/// category and the oldest insertion as `firstitemmsec`.
pub async fn subscription_list(store: &Store, user_id: i64) -> Result<SubscriptionList> {
    let rows = sqlx::query(
        r#"
        SELECT f.id, f.name, f.identifier, g.name AS group_name,
               (SELECT MIN(a.created_at) FROM articles a WHERE a.feed_id = f.id) AS first_item
        FROM feeds f
        LEFT JOIN feed_groups g ON g.id = f.group_id
        WHERE f.enabled = 1 AND (f.user_id IS NULL OR f.user_id = ?)
        ORDER BY f.id
        "#,
    )
    .bind(user_id)
    .fetch_all(store.pool())
    .await?;

    let mut subscriptions = Vec::new();
    for row in &rows {
        let feed_id: i64 = row.try_get("id")?;
        let group_name: Option<String> = row.try_get("group_name")?;
        let first_item: Option<DateTime<Utc>> = row.try_get("first_item")?;

        let categories = group_name
            .map(|label| {
                vec![SubscriptionCategory { id: format!("user/-/label/{label}"), label }]
            })
            .unwrap_or_default();

        subscriptions.push(Subscription {
            id: format!("feed/{feed_id}"),
            title: row.try_get("name")?,
            categories,
            sortid: format!("{feed_id:08x}"),
            firstitemmsec: first_item
                .map(|dt| dt.timestamp_millis().to_string())
                .unwrap_or_else(|| "0".to_string()),
            html_url: row.try_get("identifier")?,
        });
    }

    Ok(SubscriptionList { subscriptions })
}
