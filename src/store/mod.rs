mod articles;
mod content_cache;
mod feeds;
pub mod icon_cache;
mod runs;
mod schema;
mod states;
mod tokens;
mod users;

pub use articles::{NewArticle, PersistOutcome};
pub use feeds::NewFeed;
pub use icon_cache::IconCache;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Relational persistence for feeds, articles, per-user state, tokens and
/// the advisory content cache. One logical pool, short transactions only.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        schema::initialize(&pool).await?;
        info!(database_url, "store ready");
        Ok(Self { pool })
    }

    /// Single-connection in-memory store, used by the test suites.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        schema::initialize(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
