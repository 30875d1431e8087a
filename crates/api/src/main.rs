use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratings_core::cycle::{run_generation, run_ingest, GenerationReport, IngestReport};
use ratings_core::domain::event::StoredEvent;
use ratings_core::domain::recommendation::Recommendation;
use ratings_core::error::is_no_events;
use ratings_core::ingest::provider::HttpEventFeed;
use ratings_core::scoring::Scorer;
use ratings_core::storage::lock::{try_acquire_cycle_lock, CycleKind, CycleLock};
use ratings_core::storage::{events, recommendations, PgStore};

const STOCKS_DEFAULT_LIMIT: i64 = 20;
const STOCKS_MAX_LIMIT: i64 = 100;
const RECOMMENDATIONS_DEFAULT_LIMIT: i64 = 10;
const RECOMMENDATIONS_MAX_LIMIT: i64 = 50;

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

    let pool = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match ratings_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let store = pool.map(PgStore::from_env).transpose()?;

    let feed = match HttpEventFeed::from_settings(&settings) {
        Ok(feed) => Some(Arc::new(feed)),
        Err(e) => {
            tracing::warn!(error = %e, "feed not configured; POST /stocks/fetch disabled");
            None
        }
    };

    let state = AppState {
        store,
        feed,
        scorer: Arc::new(Scorer::from_env()?),
        max_pages: ratings_core::ingest::provider::max_pages_from_env(),
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stocks", get(list_stocks))
        .route("/stocks/fetch", post(fetch_stocks))
        .route("/stocks/:ticker", get(get_stock))
        .route("/recommendations", get(list_recommendations))
        .route("/recommendations/generate", post(generate_recommendations))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Clone)]
struct AppState {
    store: Option<PgStore>,
    feed: Option<Arc<HttpEventFeed>>,
    scorer: Arc<Scorer>,
    max_pages: usize,
}

impl AppState {
    fn store(&self) -> Result<&PgStore, ApiError> {
        self.store
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("database unavailable"))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: &'static str,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str) -> Self {
        Self {
            status,
            error,
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn unavailable(error: &'static str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, error)
    }

    fn busy(kind: CycleKind) -> Self {
        Self::new(StatusCode::CONFLICT, "cycle already running")
            .with_details(format!("another {} cycle holds the lock", kind.as_str()))
    }

    /// Empty analysis input becomes 422; anything else is reported and becomes 500.
    fn from_anyhow(err: anyhow::Error, error: &'static str) -> Self {
        if is_no_events(&err) {
            return Self::new(StatusCode::UNPROCESSABLE_ENTITY, "no stock data available")
                .with_details("run POST /stocks/fetch before generating recommendations");
        }
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = format!("{err:#}"), "{error}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error).with_details(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ratings-api",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct StocksQuery {
    q: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Debug, Serialize)]
struct Pagination {
    limit: i64,
    offset: i64,
    total: i64,
}

#[derive(Debug, Serialize)]
struct StocksPage {
    data: Vec<StoredEvent>,
    pagination: Pagination,
}

/// Out-of-range or unparsable limits fall back to the default rather than being clamped.
fn page_limit(raw: Option<&str>, default: i64, max: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| (1..=max).contains(n))
        .unwrap_or(default)
}

fn page_offset(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(params): Query<StocksQuery>,
) -> Result<Json<StocksPage>, ApiError> {
    let store = state.store()?;

    let limit = page_limit(params.limit.as_deref(), STOCKS_DEFAULT_LIMIT, STOCKS_MAX_LIMIT);
    let offset = page_offset(params.offset.as_deref());
    let q = params.q.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let data = events::list_events(store.pool(), q, limit, offset)
        .await
        .map_err(|e| ApiError::from_anyhow(e, "failed to list stocks"))?;
    let total = events::count_events(store.pool(), q)
        .await
        .map_err(|e| ApiError::from_anyhow(e, "failed to count stocks"))?;

    Ok(Json(StocksPage {
        data,
        pagination: Pagination {
            limit,
            offset,
            total,
        },
    }))
}

#[derive(Debug, Serialize)]
struct StockDetail {
    data: StoredEvent,
}

async fn get_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockDetail>, ApiError> {
    let store = state.store()?;

    events::latest_event_for_ticker(store.pool(), &ticker)
        .await
        .map_err(|e| ApiError::from_anyhow(e, "failed to load stock"))?
        .map(|data| Json(StockDetail { data }))
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "stock not found")
                .with_details(format!("no events for ticker {ticker}"))
        })
}

async fn fetch_stocks(State(state): State<AppState>) -> Result<Json<IngestReport>, ApiError> {
    let store = state.store()?;
    let feed = state
        .feed
        .as_deref()
        .ok_or_else(|| ApiError::unavailable("feed not configured"))?;

    let lock = acquire(store, CycleKind::Ingest).await?;
    let result = run_ingest(feed, store, state.max_pages).await;
    release(lock).await;

    result
        .map(Json)
        .map_err(|e| ApiError::from_anyhow(e, "failed to fetch stock data"))
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationsQuery {
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecommendationsList {
    data: Vec<Recommendation>,
    count: usize,
}

async fn list_recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationsQuery>,
) -> Result<Json<RecommendationsList>, ApiError> {
    let store = state.store()?;
    let limit = page_limit(
        params.limit.as_deref(),
        RECOMMENDATIONS_DEFAULT_LIMIT,
        RECOMMENDATIONS_MAX_LIMIT,
    );

    let data = recommendations::top_recommendations(store.pool(), limit)
        .await
        .map_err(|e| ApiError::from_anyhow(e, "failed to list recommendations"))?;

    Ok(Json(RecommendationsList {
        count: data.len(),
        data,
    }))
}

async fn generate_recommendations(
    State(state): State<AppState>,
) -> Result<Json<GenerationReport>, ApiError> {
    let store = state.store()?;

    let lock = acquire(store, CycleKind::Generate).await?;
    let result = run_generation(store, state.scorer.as_ref()).await;
    release(lock).await;

    result
        .map(Json)
        .map_err(|e| ApiError::from_anyhow(e, "failed to generate recommendations"))
}

async fn acquire(store: &PgStore, kind: CycleKind) -> Result<CycleLock, ApiError> {
    try_acquire_cycle_lock(store.pool(), kind)
        .await
        .map_err(|e| ApiError::from_anyhow(e, "failed to acquire cycle lock"))?
        .ok_or_else(|| ApiError::busy(kind))
}

async fn release(lock: CycleLock) {
    let kind = lock.kind();
    if let Err(err) = lock.release().await {
        tracing::warn!(cycle = kind.as_str(), error = %err, "cycle lock release failed");
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use ratings_core::error::NoEventsError;

    fn degraded_state() -> AppState {
        AppState {
            store: None,
            feed: None,
            scorer: Arc::new(Scorer::default()),
            max_pages: 10,
        }
    }

    #[test]
    fn limits_outside_range_use_the_default() {
        assert_eq!(page_limit(None, 20, 100), 20);
        assert_eq!(page_limit(Some("50"), 20, 100), 50);
        assert_eq!(page_limit(Some("100"), 20, 100), 100);
        assert_eq!(page_limit(Some("101"), 20, 100), 20);
        assert_eq!(page_limit(Some("0"), 20, 100), 20);
        assert_eq!(page_limit(Some("-3"), 10, 50), 10);
        assert_eq!(page_limit(Some("lots"), 10, 50), 10);
    }

    #[test]
    fn negative_or_garbage_offset_is_zero() {
        assert_eq!(page_offset(None), 0);
        assert_eq!(page_offset(Some("40")), 40);
        assert_eq!(page_offset(Some("-1")), 0);
        assert_eq!(page_offset(Some("x")), 0);
    }

    #[test]
    fn empty_analysis_input_maps_to_unprocessable() {
        let err = anyhow::Error::new(NoEventsError).context("generate failed");
        let api = ApiError::from_anyhow(err, "failed to generate recommendations");
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.error, "no stock data available");
    }

    #[test]
    fn other_failures_map_to_internal_error_with_details() {
        let api = ApiError::from_anyhow(anyhow::anyhow!("connection reset"), "failed to list stocks");
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.details.as_deref(), Some("connection reset"));
    }

    #[test]
    fn lock_contention_maps_to_conflict() {
        let api = ApiError::busy(CycleKind::Generate);
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert!(api.details.unwrap().contains("generate"));
    }

    #[test]
    fn stock_detail_wraps_event_in_data() {
        use chrono::TimeZone;
        use ratings_core::domain::event::AnalystEvent;

        let event = StoredEvent {
            id: uuid::Uuid::nil(),
            ingested_at: Utc.with_ymd_and_hms(2026, 2, 3, 0, 0, 0).unwrap(),
            event: AnalystEvent {
                ticker: "AAPL".to_string(),
                company: "Apple Inc.".to_string(),
                target_from: "$200.00".to_string(),
                target_to: "$220.00".to_string(),
                action: "upgraded by".to_string(),
                brokerage: "Acme".to_string(),
                rating_from: "Hold".to_string(),
                rating_to: "Buy".to_string(),
                occurred_at: Utc.with_ymd_and_hms(2026, 2, 2, 14, 0, 0).unwrap(),
            },
        };

        let body = serde_json::to_value(StockDetail { data: event }).unwrap();
        assert_eq!(body["data"]["ticker"], "AAPL");
        assert_eq!(body["data"]["rating_to"], "Buy");
        assert_eq!(body.as_object().unwrap().len(), 1);
    }

    #[test]
    fn error_body_omits_missing_details() {
        let body = ErrorBody {
            error: "stock not found",
            details: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "error": "stock not found" })
        );
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "ratings-api");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn handlers_return_unavailable_without_a_database() {
        let err = list_stocks(State(degraded_state()), Query(StocksQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err = generate_recommendations(State(degraded_state()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err = list_recommendations(State(degraded_state()), Query(RecommendationsQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
