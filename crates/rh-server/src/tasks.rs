//! Periodic background work: library rescans and cache sweeps.
//!
//! Both loops run until the cancellation token fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Rescan every root each `interval`. The first scan runs immediately.
pub async fn run_periodic_scan(ctx: AppContext, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Periodic scan started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        match ctx.scanner.clone().scan_all().await {
            Ok(reports) => {
                let upserted: usize = reports.iter().map(|r| r.upserted).sum();
                let deleted: usize = reports.iter().map(|r| r.deleted).sum();
                let errors: usize = reports.iter().map(|r| r.errors.len()).sum();
                tracing::info!(upserted, deleted, errors, "Periodic scan finished");
            }
            Err(e) => tracing::warn!(error = %e, "Periodic scan failed"),
        }
    }

    tracing::info!("Periodic scan stopped");
}

/// Evict stale cache rows and idle rate-limiter keys each `interval`.
pub async fn run_cache_sweep(ctx: AppContext, interval: Duration, cancel: CancellationToken) {
    let max_age = ctx.config.transcoding.cache_max_age();
    tracing::info!(
        interval_secs = interval.as_secs(),
        max_age_secs = max_age.as_secs(),
        "Cache sweep started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }

        sweep_once(&ctx, max_age);
    }

    tracing::info!("Cache sweep stopped");
}

fn sweep_once(ctx: &AppContext, max_age: Duration) {
    match ctx.transcoder.cleanup_old_cache(max_age) {
        Ok(0) => {}
        Ok(n) => tracing::debug!(evicted = n, "Cache sweep evicted entries"),
        Err(e) => tracing::warn!(error = %e, "Cache sweep failed"),
    }
    ctx.scan_limiter.prune();
    ctx.playback_limiter.prune();
}
