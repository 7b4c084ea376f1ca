use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::engine::{Engine, EngineError};
use crate::observability::WAL_COMPACTIONS_TOTAL;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once enough appends pile up.
/// Exits when the engine is dropped.
pub async fn run_compactor(engine: Weak<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let Some(engine) = engine.upgrade() else {
            return;
        };
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

/// Returns `true` when a compaction ran.
pub async fn compact_if_needed(engine: &Arc<Engine>, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    let result = engine.compact_wal().await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => status).increment(1);
    result?;
    tracing::info!("compacted WAL after {appends} appends");
    Ok(true)
}
