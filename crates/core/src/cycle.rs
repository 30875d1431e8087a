//! The two jobs the worker and the API trigger: ingesting the analyst feed and turning
//! stored events into recommendations.

use crate::aggregate::{group_by_ticker, TickerGroup};
use crate::domain::event::StoredEvent;
use crate::domain::recommendation::{Recommendation, RecommendationScore, TimeHorizon};
use crate::error::NoEventsError;
use crate::ingest::provider::{drain_feed, EventFeed};
use crate::scoring::{Scorer, SignalClassifier};
use crate::storage::{EventStore, RecommendationStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub provider: &'static str,
    pub pages: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub stored: u64,
}

/// Drains the whole feed, then stores everything in one all-or-nothing write. A failed
/// page means nothing from this run is stored.
pub async fn run_ingest(
    feed: &dyn EventFeed,
    store: &dyn EventStore,
    max_pages: usize,
) -> anyhow::Result<IngestReport> {
    let t0 = std::time::Instant::now();
    let drained = drain_feed(feed, max_pages)
        .await
        .context("ingest: feed drain failed")?;

    let stored = store
        .store_events(&drained.events)
        .await
        .with_context(|| format!("ingest: storing {} events failed", drained.events.len()))?;

    let report = IngestReport {
        provider: feed.provider_name(),
        pages: drained.pages,
        fetched: drained.events.len(),
        skipped: drained.skipped,
        stored,
    };

    tracing::info!(
        provider = report.provider,
        pages = report.pages,
        fetched = report.fetched,
        skipped = report.skipped,
        stored = report.stored,
        elapsed_ms = t0.elapsed().as_millis(),
        "ingest finished"
    );

    Ok(report)
}

/// Identity shared by every recommendation written in one generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl GenerationRun {
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

pub fn assemble(
    ticker: &str,
    representative: &StoredEvent,
    score: RecommendationScore,
    run: &GenerationRun,
) -> Recommendation {
    Recommendation {
        generation_id: run.id,
        generated_at: run.started_at,
        security_ref: representative.id,
        ticker: ticker.to_string(),
        company: representative.event.company.clone(),
        score: score.score,
        risk_level: score.risk_level,
        expected_return_pct: score.expected_return_pct,
        time_horizon: TimeHorizon::Medium,
        reason: score.reason,
        sentiment: score.sentiment,
        upgrade_count: score.upgrade_count,
        downgrade_count: score.downgrade_count,
    }
}

fn recommend_group<C: SignalClassifier>(
    scorer: &Scorer<C>,
    group: &TickerGroup<'_>,
    run: &GenerationRun,
) -> Recommendation {
    let score = scorer.evaluate(group.events());
    assemble(group.ticker(), group.representative(), score, run)
}

/// Scores every ticker without touching storage. One recommendation per ticker, ordered
/// by ticker.
pub fn plan_recommendations<C: SignalClassifier>(
    scorer: &Scorer<C>,
    events: &[StoredEvent],
    run: &GenerationRun,
) -> anyhow::Result<Vec<Recommendation>> {
    if events.is_empty() {
        return Err(NoEventsError.into());
    }

    Ok(group_by_ticker(events)
        .iter()
        .map(|group| recommend_group(scorer, group, run))
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub generation_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub events: usize,
    pub tickers: usize,
    pub stored: usize,
    pub failed_tickers: Vec<String>,
}

/// Loads the analysis window, scores each ticker group, and appends one recommendation
/// per group. A ticker whose write fails is logged and skipped; the cycle itself only
/// fails when the input cannot be loaded or is empty.
pub async fn run_generation<S, C>(store: &S, scorer: &Scorer<C>) -> anyhow::Result<GenerationReport>
where
    S: EventStore + RecommendationStore + ?Sized,
    C: SignalClassifier,
{
    let run = GenerationRun::start();
    let t0 = std::time::Instant::now();

    let events = store
        .fetch_events_for_analysis()
        .await
        .context("generate: failed to load events for analysis")?;

    let recs = plan_recommendations(scorer, &events, &run)?;

    let mut report = GenerationReport {
        generation_id: run.id,
        generated_at: run.started_at,
        events: events.len(),
        tickers: recs.len(),
        stored: 0,
        failed_tickers: Vec::new(),
    };

    for rec in &recs {
        match store.store_recommendation(rec).await {
            Ok(_) => report.stored += 1,
            Err(err) => {
                tracing::error!(
                    generation_id = %run.id,
                    ticker = %rec.ticker,
                    error = format!("{err:#}"),
                    "failed to store recommendation; skipping ticker"
                );
                report.failed_tickers.push(rec.ticker.clone());
            }
        }
    }

    tracing::info!(
        generation_id = %run.id,
        events = report.events,
        tickers = report.tickers,
        stored = report.stored,
        failed = report.failed_tickers.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "generation finished"
    );

    Ok(report)
}
