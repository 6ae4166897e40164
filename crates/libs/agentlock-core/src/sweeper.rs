//! Stale-Lock Sweeper (§4.6). A periodic background task that walks every
//! lock hash and drops expired entries, so a crashed or abandoned agent's
//! locks don't linger past their TTL even if nobody calls `check_status`
//! against them again.

use crate::coordination::CoordinationApi;
use std::sync::Arc;
use std::time::Duration;

/// Spawns the sweeper loop on the current Tokio runtime. Returns the
/// `JoinHandle` so callers can abort it on shutdown.
pub fn spawn(api: Arc<CoordinationApi>, interval: Duration, now_ms: impl Fn() -> i64 + Send + 'static) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match api.cleanup_stale_locks(now_ms()).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "swept expired locks");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "stale-lock sweep failed");
                }
            }
        }
    })
}
