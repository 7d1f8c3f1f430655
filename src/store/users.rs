use super::Store;
use crate::error::{AggregatorError, Result};
use crate::types::User;
use chrono::Utc;
use sqlx::Row;
use tracing::info;

impl Store {
    pub async fn create_user(&self, name: &str, email: Option<&str>, password: &str) -> Result<i64> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AggregatorError::General(format!("password hashing failed: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(&hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                AggregatorError::Validation(format!("user `{name}` already exists"))
            }
            other => other.into(),
        })?;
        let user_id = result.last_insert_rowid();
        info!(user_id, name, "created user");
        Ok(user_id)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| user_from_row(&row))
            .transpose()?
            .ok_or(AggregatorError::Unauthorized)
    }

    /// Check credentials for ClientLogin. A wrong name and a wrong
    /// password are indistinguishable to the caller.
    pub async fn verify_login(&self, name: &str, password: &str) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE name = ? OR email = ?")
            .bind(name)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(AggregatorError::Unauthorized);
        };
        let user = user_from_row(&row)?;
        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| AggregatorError::General(format!("password verification failed: {e}")))?;
        if !valid {
            return Err(AggregatorError::Unauthorized);
        }
        Ok(user)
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}
