use ratings_core::cycle::{plan_recommendations, run_generation, run_ingest, GenerationRun};
use ratings_core::ingest::provider::{drain_feed, HttpEventFeed};
use ratings_core::scoring::Scorer;
use ratings_core::storage::lock::{try_acquire_cycle_lock, CycleKind, CycleLock};
use ratings_core::storage::{EventStore, PgStore};
use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Job {
    Fetch,
    Generate,
    All,
}

impl Job {
    pub fn needs_feed(self) -> bool {
        matches!(self, Self::Fetch | Self::All)
    }

    pub fn needs_database(self, dry_run: bool) -> bool {
        !(dry_run && self == Self::Fetch)
    }
}

pub struct Jobs {
    pub store: Option<PgStore>,
    pub feed: Option<HttpEventFeed>,
    pub scorer: Scorer,
    pub max_pages: usize,
    pub dry_run: bool,
}

impl Jobs {
    fn store(&self) -> anyhow::Result<&PgStore> {
        self.store
            .as_ref()
            .context("database is not configured for this job")
    }

    fn feed(&self) -> anyhow::Result<&HttpEventFeed> {
        self.feed.as_ref().context("feed is not configured for this job")
    }

    pub async fn run(&self, job: Job) -> anyhow::Result<()> {
        match job {
            Job::Fetch => self.fetch().await,
            Job::Generate => self.generate().await,
            Job::All => {
                self.fetch().await?;
                self.generate().await
            }
        }
    }

    pub async fn fetch(&self) -> anyhow::Result<()> {
        let feed = self.feed()?;

        if self.dry_run {
            let drained = drain_feed(feed, self.max_pages).await?;
            tracing::info!(
                dry_run = true,
                pages = drained.pages,
                fetched = drained.events.len(),
                skipped = drained.skipped,
                "fetch finished without writing"
            );
            return Ok(());
        }

        let store = self.store()?;
        let Some(lock) = acquire(store, CycleKind::Ingest).await? else {
            return Ok(());
        };
        let result = run_ingest(feed, store, self.max_pages).await;
        release(lock).await;
        result.map(|_| ())
    }

    pub async fn generate(&self) -> anyhow::Result<()> {
        let store = self.store()?;

        if self.dry_run {
            let events = store.fetch_events_for_analysis().await?;
            let run = GenerationRun::start();
            let mut recs = plan_recommendations(&self.scorer, &events, &run)?;
            recs.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.ticker.cmp(&b.ticker)));

            for rec in recs.iter().take(10) {
                tracing::info!(
                    ticker = %rec.ticker,
                    score = rec.score,
                    risk_level = %rec.risk_level,
                    sentiment = %rec.sentiment,
                    expected_return_pct = rec.expected_return_pct,
                    reason = %rec.reason,
                    "dry-run recommendation"
                );
            }
            tracing::info!(
                dry_run = true,
                events = events.len(),
                tickers = recs.len(),
                "generation finished without writing"
            );
            return Ok(());
        }

        let Some(lock) = acquire(store, CycleKind::Generate).await? else {
            return Ok(());
        };
        let result = run_generation(store, &self.scorer).await;
        release(lock).await;
        result.map(|_| ())
    }
}

async fn acquire(store: &PgStore, kind: CycleKind) -> anyhow::Result<Option<CycleLock>> {
    let lock = try_acquire_cycle_lock(store.pool(), kind).await?;
    if lock.is_none() {
        tracing::warn!(cycle = kind.as_str(), "cycle lock not acquired; another run in progress");
    }
    Ok(lock)
}

async fn release(lock: CycleLock) {
    let kind = lock.kind();
    if let Err(err) = lock.release().await {
        tracing::warn!(cycle = kind.as_str(), error = %err, "cycle lock release failed");
    }
}
