use std::sync::Arc;

use anyhow::Result;
use banca_engine::MovementEngine;
use banca_platform::{
    PgCardDirectory, PgLedger, PgMovementRepository, RedisBus, RedisNotifier, ServiceConfig,
    connect_database, ensure_schema,
};
use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

const RUNS_CHANNEL: &str = "direct-debits.runs";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "banca_scheduler=info,banca_engine=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let engine = MovementEngine::new(
        Arc::new(PgMovementRepository::new(pool.clone())),
        Arc::new(PgLedger::new(pool.clone())),
        Arc::new(RedisNotifier::new(redis.clone(), config.movements_channel.clone())),
        Arc::new(PgCardDirectory::new(pool)),
    );

    let mut ticker = interval(config.scheduler_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        interval_secs = config.scheduler_interval.as_secs(),
        "direct debit scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = run_once(&engine, &redis).await {
                    error!("direct debit run failed: {err:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("direct debit scheduler stopping");
                return Ok(());
            }
        }
    }
}

async fn run_once(engine: &MovementEngine, redis: &RedisBus) -> Result<()> {
    let report = engine.run_due(Utc::now()).await?;
    if let Err(err) = redis.publish_json(RUNS_CHANNEL, &report).await {
        warn!("failed to publish run report: {err:#}");
    }
    Ok(())
}
