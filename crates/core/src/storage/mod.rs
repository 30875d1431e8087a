pub mod events;
pub mod lock;
pub mod recommendations;

use crate::config::env_parse;
use crate::domain::event::{AnalystEvent, StoredEvent};
use crate::domain::recommendation::Recommendation;
use anyhow::Context;
use uuid::Uuid;

const DEFAULT_INSERT_BATCH: usize = 100;
const DEFAULT_ANALYSIS_MAX_EVENTS: i64 = 10_000;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Bulk append. All-or-nothing per call.
    async fn store_events(&self, events: &[AnalystEvent]) -> anyhow::Result<u64>;

    /// The analysis window in a stable order. May be empty; callers decide what that means.
    async fn fetch_events_for_analysis(&self) -> anyhow::Result<Vec<StoredEvent>>;
}

#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Append-only. Safe to call concurrently for distinct tickers.
    async fn store_recommendation(&self, rec: &Recommendation) -> anyhow::Result<Uuid>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
    insert_batch: usize,
    analysis_max_events: i64,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            insert_batch: DEFAULT_INSERT_BATCH,
            analysis_max_events: DEFAULT_ANALYSIS_MAX_EVENTS,
        }
    }

    /// Reads `EVENTS_INSERT_BATCH` and `ANALYSIS_MAX_EVENTS`.
    pub fn from_env(pool: sqlx::PgPool) -> anyhow::Result<Self> {
        let insert_batch = env_parse("EVENTS_INSERT_BATCH", DEFAULT_INSERT_BATCH);
        let analysis_max_events = env_parse("ANALYSIS_MAX_EVENTS", DEFAULT_ANALYSIS_MAX_EVENTS);

        anyhow::ensure!(insert_batch >= 1, "EVENTS_INSERT_BATCH must be >= 1");
        anyhow::ensure!(
            analysis_max_events >= 1,
            "ANALYSIS_MAX_EVENTS must be >= 1"
        );

        Ok(Self {
            pool,
            insert_batch,
            analysis_max_events,
        })
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EventStore for PgStore {
    async fn store_events(&self, events: &[AnalystEvent]) -> anyhow::Result<u64> {
        events::insert_events_atomic(&self.pool, events, self.insert_batch).await
    }

    async fn fetch_events_for_analysis(&self) -> anyhow::Result<Vec<StoredEvent>> {
        events::load_events_for_analysis(&self.pool, self.analysis_max_events).await
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn store_recommendation(&self, rec: &Recommendation) -> anyhow::Result<Uuid> {
        recommendations::insert_recommendation(&self.pool, rec).await
    }
}
