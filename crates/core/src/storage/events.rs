use crate::domain::event::{AnalystEvent, StoredEvent};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, ingested_at, ticker, company, target_from, target_to, action, \
                             brokerage, rating_from, rating_to, occurred_at";

type EventRow = (
    Uuid,
    DateTime<Utc>,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
);

fn from_row(row: EventRow) -> StoredEvent {
    let (
        id,
        ingested_at,
        ticker,
        company,
        target_from,
        target_to,
        action,
        brokerage,
        rating_from,
        rating_to,
        occurred_at,
    ) = row;

    StoredEvent {
        id,
        ingested_at,
        event: AnalystEvent {
            ticker,
            company,
            target_from,
            target_to,
            action,
            brokerage,
            rating_from,
            rating_to,
            occurred_at,
        },
    }
}

/// Appends all events in one transaction, `chunk_size` rows per statement. Either every
/// event is stored or none is.
pub async fn insert_events_atomic(
    pool: &sqlx::PgPool,
    events: &[AnalystEvent],
    chunk_size: usize,
) -> anyhow::Result<u64> {
    anyhow::ensure!(chunk_size >= 1, "EVENTS_INSERT_BATCH must be >= 1");
    if events.is_empty() {
        return Ok(0);
    }

    let ingested_at = Utc::now();
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut inserted: u64 = 0;
    for (batch_idx, chunk) in events.chunks(chunk_size).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO analyst_events (id, ticker, company, target_from, target_to, action, \
             brokerage, rating_from, rating_to, occurred_at, ingested_at) ",
        );
        qb.push_values(chunk, |mut b, event| {
            b.push_bind(Uuid::new_v4())
                .push_bind(&event.ticker)
                .push_bind(&event.company)
                .push_bind(&event.target_from)
                .push_bind(&event.target_to)
                .push_bind(&event.action)
                .push_bind(&event.brokerage)
                .push_bind(&event.rating_from)
                .push_bind(&event.rating_to)
                .push_bind(event.occurred_at)
                .push_bind(ingested_at);
        });

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("batch insert analyst_events failed (batch {})", batch_idx + 1))?;
        inserted += res.rows_affected();

        tracing::debug!(
            batch_idx = batch_idx + 1,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "analyst_events batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}

/// The `limit` most recent events, newest first. Rows with equal `occurred_at` come back
/// in insertion order so grouping downstream is reproducible.
pub async fn load_events_for_analysis(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<StoredEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM analyst_events \
         ORDER BY occurred_at DESC, seq ASC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, EventRow>(&sql)
        .persistent(false)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("load analyst_events for analysis failed")?;

    Ok(rows.into_iter().map(from_row).collect())
}

/// Lists events newest first, optionally filtered by a case-insensitive match on ticker or
/// company.
pub async fn list_events(
    pool: &sqlx::PgPool,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<StoredEvent>> {
    let rows = match query {
        Some(q) => {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM analyst_events \
                 WHERE ticker ILIKE $1 OR company ILIKE $1 \
                 ORDER BY occurred_at DESC, seq ASC \
                 LIMIT $2 OFFSET $3"
            );
            sqlx::query_as::<_, EventRow>(&sql)
                .bind(like_pattern(q))
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM analyst_events \
                 ORDER BY occurred_at DESC, seq ASC \
                 LIMIT $1 OFFSET $2"
            );
            sqlx::query_as::<_, EventRow>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
    }
    .context("list analyst_events failed")?;

    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn count_events(pool: &sqlx::PgPool, query: Option<&str>) -> anyhow::Result<i64> {
    let count: i64 = match query {
        Some(q) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM analyst_events WHERE ticker ILIKE $1 OR company ILIKE $1",
            )
            .bind(like_pattern(q))
            .fetch_one(pool)
            .await
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM analyst_events")
                .fetch_one(pool)
                .await
        }
    }
    .context("count analyst_events failed")?;

    Ok(count)
}

pub async fn latest_event_for_ticker(
    pool: &sqlx::PgPool,
    ticker: &str,
) -> anyhow::Result<Option<StoredEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM analyst_events \
         WHERE ticker = $1 \
         ORDER BY occurred_at DESC, seq ASC \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, EventRow>(&sql)
        .bind(ticker)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("load latest analyst_event for {ticker} failed"))?;

    Ok(row.map(from_row))
}

/// Wraps user text in `%...%`, escaping LIKE metacharacters.
fn like_pattern(q: &str) -> String {
    let mut out = String::with_capacity(q.len() + 2);
    out.push('%');
    for ch in q.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("aapl"), "%aapl%");
        assert_eq!(like_pattern(" 100%_x "), "%100\\%\\_x%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
