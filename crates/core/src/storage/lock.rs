use anyhow::Context;

// Transaction-scoped advisory locks guard against overlapping cycles of the same kind
// (scheduled worker vs. on-demand API trigger). The lock lives exactly as long as the
// transaction, so a dropped guard cannot leak it onto a pooled connection.
const LOCK_NAMESPACE: i64 = 0x5241_5449_4E47; // "RATING"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Ingest,
    Generate,
}

impl CycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Generate => "generate",
        }
    }

    fn lock_key(self) -> i64 {
        let discriminant: i64 = match self {
            Self::Ingest => 1,
            Self::Generate => 2,
        };
        LOCK_NAMESPACE ^ discriminant
    }
}

#[derive(Debug)]
pub struct CycleLock {
    kind: CycleKind,
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

/// Returns `None` when another cycle of the same kind holds the lock.
pub async fn try_acquire_cycle_lock(
    pool: &sqlx::PgPool,
    kind: CycleKind,
) -> anyhow::Result<Option<CycleLock>> {
    let key = kind.lock_key();
    let mut tx = pool.begin().await.context("begin lock transaction failed")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_xact_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to acquire advisory lock (cycle={}, key={key})", kind.as_str()))?;

    if !acquired.0 {
        tx.rollback().await.ok();
        return Ok(None);
    }

    Ok(Some(CycleLock { kind, tx }))
}

impl CycleLock {
    pub fn kind(&self) -> CycleKind {
        self.kind
    }

    pub async fn release(self) -> anyhow::Result<()> {
        self.tx
            .rollback()
            .await
            .with_context(|| format!("failed to release advisory lock (cycle={})", self.kind.as_str()))
    }
}
