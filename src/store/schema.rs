use crate::error::Result;
use sqlx::SqlitePool;

/// Idempotent schema setup, executed at startup. Statements are ordered
/// so foreign keys always reference existing tables.
const STATEMENTS: [&str; 13] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        email TEXT,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        UNIQUE (user_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feeds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
        group_id INTEGER REFERENCES feed_groups(id) ON DELETE SET NULL,
        kind TEXT NOT NULL,
        identifier TEXT NOT NULL,
        name TEXT NOT NULL,
        icon TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        options TEXT NOT NULL DEFAULT '{}',
        ai_hints TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
    "#,
    // (name, user) unique; NULL owners collapse onto a sentinel so the
    // shared namespace is unique too.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_feeds_name_user
        ON feeds (name, COALESCE(user_id, -1))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
        url TEXT NOT NULL,
        canonical_url TEXT NOT NULL,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        author TEXT,
        external_id TEXT,
        thumbnail_url TEXT,
        media_url TEXT,
        media_type TEXT,
        score INTEGER NOT NULL DEFAULT 0,
        view_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE (feed_id, canonical_url)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_articles_feed_date ON articles (feed_id, date)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_articles_feed_created ON articles (feed_id, created_at)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_articles_feed_name ON articles (feed_id, name)"#,
    r#"
    CREATE TABLE IF NOT EXISTS user_article_states (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        is_read INTEGER NOT NULL DEFAULT 0,
        is_saved INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, article_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_tokens (
        token_hash TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content_cache (
        url TEXT PRIMARY KEY,
        html TEXT NOT NULL,
        cached_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS aggregation_runs (
        id TEXT PRIMARY KEY,
        feed_id INTEGER NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        success INTEGER NOT NULL DEFAULT 0,
        reason TEXT,
        inserted INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        skipped INTEGER NOT NULL DEFAULT 0,
        errored INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_runs_feed_started ON aggregation_runs (feed_id, started_at)"#,
];

pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
