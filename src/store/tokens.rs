use super::Store;
use crate::error::{AggregatorError, Result};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

impl Store {
    /// Issue a fresh auth token for a user. The caller gets the raw
    /// token; only its SHA-256 lands in the database.
    pub async fn create_auth_token(&self, user_id: i64, ttl_days: i64) -> Result<String> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(now)
        .bind(now + Duration::days(ttl_days))
        .execute(&self.pool)
        .await?;

        debug!(user_id, "issued auth token");
        Ok(token)
    }

    /// Resolve a presented token to its user id, rejecting unknown and
    /// expired tokens alike.
    pub async fn resolve_auth_token(&self, token: &str) -> Result<i64> {
        let user_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM auth_tokens WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(hash_token(token))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        user_id.ok_or(AggregatorError::Unauthorized)
    }

    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
