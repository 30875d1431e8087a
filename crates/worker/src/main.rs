use anyhow::Context;
use clap::Parser;
use ratings_core::error::is_no_events;
use ratings_core::time::interval::interval_from_env;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod jobs;

use jobs::{Job, Jobs};

const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(6 * 3600);
const DEFAULT_GENERATE_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Parser)]
#[command(name = "ratings_worker")]
struct Args {
    /// Run a single job and exit instead of scheduling.
    #[arg(long, value_enum)]
    once: Option<Job>,

    /// Fetch and score without writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ratings_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    // The scheduler runs both jobs.
    let scope = args.once.unwrap_or(Job::All);

    let store = if scope.needs_database(args.dry_run) {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        ratings_core::storage::migrate(&pool).await?;
        Some(ratings_core::storage::PgStore::from_env(pool)?)
    } else {
        None
    };

    let feed = if scope.needs_feed() {
        Some(ratings_core::ingest::provider::HttpEventFeed::from_settings(&settings)?)
    } else {
        None
    };

    let jobs = Jobs {
        store,
        feed,
        scorer: ratings_core::scoring::Scorer::from_env()?,
        max_pages: ratings_core::ingest::provider::max_pages_from_env(),
        dry_run: args.dry_run,
    };

    if let Some(job) = args.once {
        return jobs.run(job).await.map_err(|err| {
            report_failure(job, &err);
            err
        });
    }

    schedule(&jobs).await;
    Ok(())
}

async fn schedule(jobs: &Jobs) {
    let fetch_every = interval_from_env("DATA_FETCH_INTERVAL", DEFAULT_FETCH_INTERVAL);
    let generate_every = interval_from_env("RECOMMENDATION_INTERVAL", DEFAULT_GENERATE_INTERVAL);

    tracing::info!(
        fetch_every_secs = fetch_every.as_secs(),
        generate_every_secs = generate_every.as_secs(),
        dry_run = jobs.dry_run,
        "scheduler started"
    );

    // Both timers fire immediately, giving the initial fetch and then the initial generation.
    let mut fetch_tick = tokio::time::interval(fetch_every);
    fetch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut generate_tick = tokio::time::interval(generate_every);
    generate_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received; scheduler stopping");
                break;
            }
            _ = fetch_tick.tick() => {
                if let Err(err) = jobs.run(Job::Fetch).await {
                    report_failure(Job::Fetch, &err);
                }
            }
            _ = generate_tick.tick() => {
                if let Err(err) = jobs.run(Job::Generate).await {
                    report_failure(Job::Generate, &err);
                }
            }
        }
    }
}

fn report_failure(job: Job, err: &anyhow::Error) {
    if is_no_events(err) {
        tracing::warn!(?job, "no stored events to analyze; generation skipped");
        return;
    }
    sentry_anyhow::capture_anyhow(err);
    tracing::error!(?job, error = format!("{err:#}"), "job failed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_sentry(settings: &ratings_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
