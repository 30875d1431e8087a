use crate::domain::recommendation::Recommendation;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Appends one recommendation. Rows are never updated; consumers pick the latest
/// generation per ticker.
pub async fn insert_recommendation(
    pool: &sqlx::PgPool,
    rec: &Recommendation,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO recommendations (id, generation_id, generated_at, event_id, ticker, company, \
         score, risk_level, expected_return_pct, time_horizon, reason, sentiment, upgrade_count, downgrade_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .persistent(false)
    .bind(id)
    .bind(rec.generation_id)
    .bind(rec.generated_at)
    .bind(rec.security_ref)
    .bind(&rec.ticker)
    .bind(&rec.company)
    .bind(rec.score)
    .bind(rec.risk_level.as_str())
    .bind(rec.expected_return_pct)
    .bind(rec.time_horizon.as_str())
    .bind(&rec.reason)
    .bind(rec.sentiment.as_str())
    .bind(rec.upgrade_count)
    .bind(rec.downgrade_count)
    .execute(pool)
    .await
    .with_context(|| format!("insert recommendations failed (ticker={})", rec.ticker))?;

    Ok(id)
}

#[derive(Debug, sqlx::FromRow)]
struct RecommendationRow {
    generation_id: Uuid,
    generated_at: DateTime<Utc>,
    event_id: Uuid,
    ticker: String,
    company: String,
    score: f64,
    risk_level: String,
    expected_return_pct: f64,
    time_horizon: String,
    reason: String,
    sentiment: String,
    upgrade_count: i32,
    downgrade_count: i32,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = anyhow::Error;

    fn try_from(row: RecommendationRow) -> anyhow::Result<Self> {
        Ok(Self {
            generation_id: row.generation_id,
            generated_at: row.generated_at,
            security_ref: row.event_id,
            risk_level: row
                .risk_level
                .parse()
                .with_context(|| format!("invalid risk_level in DB for ticker={}", row.ticker))?,
            sentiment: row
                .sentiment
                .parse()
                .with_context(|| format!("invalid sentiment in DB for ticker={}", row.ticker))?,
            time_horizon: row
                .time_horizon
                .parse()
                .with_context(|| format!("invalid time_horizon in DB for ticker={}", row.ticker))?,
            ticker: row.ticker,
            company: row.company,
            score: row.score,
            expected_return_pct: row.expected_return_pct,
            reason: row.reason,
            upgrade_count: row.upgrade_count,
            downgrade_count: row.downgrade_count,
        })
    }
}

/// Most recent recommendation of every ticker, best score first.
pub async fn top_recommendations(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<Recommendation>> {
    let rows = sqlx::query_as::<_, RecommendationRow>(
        "SELECT * FROM ( \
           SELECT DISTINCT ON (ticker) generation_id, generated_at, event_id, ticker, company, score, \
                  risk_level, expected_return_pct, time_horizon, reason, sentiment, upgrade_count, downgrade_count \
           FROM recommendations \
           ORDER BY ticker, generated_at DESC, created_at DESC \
         ) latest \
         ORDER BY score DESC, ticker ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select latest recommendations failed")?;

    rows.into_iter().map(Recommendation::try_from).collect()
}
