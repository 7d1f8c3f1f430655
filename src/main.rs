use clap::Parser;
use std::time::Duration;
use tracing::info;
use yana::{greader, Config, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    info!(bind = %config.bind_addr, database = %config.database_url, "starting yana");

    let (engine, state, icon_cache) = yana::build(&config).await?;

    let scheduler = Scheduler::new(
        engine,
        icon_cache,
        Duration::from_secs(config.schedule_interval_minutes * 60),
        config.effective_worker_concurrency(),
        config.cache_max_age_days,
    );
    scheduler.spawn();

    let app = greader::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "reader API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
