// Performance and outcome counters for the discount engine
//
// Tracks selection latency plus the coupon and ledger events operators watch
// for: orphaned provider coupons and duplicate webhook deliveries.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Threshold for a slow selection (100ms)
const SLOW_SELECTION_THRESHOLD_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    selections: AtomicU64,
    total_selection_time_us: AtomicU64,
    slow_selections: AtomicU64,
    no_discount_outcomes: AtomicU64,

    coupons_created: AtomicU64,
    orphaned_coupons: AtomicU64,

    redemptions_recorded: AtomicU64,
    duplicate_deliveries: AtomicU64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Start timing a selection; recorded when the timer is dropped
    pub fn start_selection(&self) -> SelectionTimer {
        SelectionTimer {
            start: Instant::now(),
            metrics: self.clone(),
        }
    }

    pub fn record_no_discount(&self) {
        self.inner.no_discount_outcomes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coupon_created(&self) {
        self.inner.coupons_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned_coupon(&self) {
        self.inner.orphaned_coupons.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redemption(&self) {
        self.inner.redemptions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_delivery(&self) {
        self.inner.duplicate_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_selection(&self, duration: Duration) {
        self.inner.selections.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_selection_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_SELECTION_THRESHOLD_MS {
            self.inner.slow_selections.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow discount selection: {}ms", duration.as_millis());
        }
    }

    /// Average selection time in milliseconds
    pub fn avg_selection_time_ms(&self) -> f64 {
        let count = self.inner.selections.load(Ordering::Relaxed);
        let total_us = self.inner.total_selection_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            selections: self.inner.selections.load(Ordering::Relaxed),
            avg_selection_time_ms: self.avg_selection_time_ms(),
            slow_selections: self.inner.slow_selections.load(Ordering::Relaxed),
            no_discount_outcomes: self.inner.no_discount_outcomes.load(Ordering::Relaxed),
            coupons_created: self.inner.coupons_created.load(Ordering::Relaxed),
            orphaned_coupons: self.inner.orphaned_coupons.load(Ordering::Relaxed),
            redemptions_recorded: self.inner.redemptions_recorded.load(Ordering::Relaxed),
            duplicate_deliveries: self.inner.duplicate_deliveries.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Discount engine metrics:\n\
             Selection: {} runs, avg {:.2}ms, {} slow, {} without discount\n\
             Coupons: {} created, {} orphaned\n\
             Ledger: {} recorded, {} duplicate deliveries",
            summary.selections,
            summary.avg_selection_time_ms,
            summary.slow_selections,
            summary.no_discount_outcomes,
            summary.coupons_created,
            summary.orphaned_coupons,
            summary.redemptions_recorded,
            summary.duplicate_deliveries,
        );
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records selection duration on drop
pub struct SelectionTimer {
    start: Instant,
    metrics: PerformanceMetrics,
}

impl Drop for SelectionTimer {
    fn drop(&mut self) {
        self.metrics.record_selection(self.start.elapsed());
    }
}

/// Snapshot of the counters
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSummary {
    pub selections: u64,
    pub avg_selection_time_ms: f64,
    pub slow_selections: u64,
    pub no_discount_outcomes: u64,
    pub coupons_created: u64,
    pub orphaned_coupons: u64,
    pub redemptions_recorded: u64,
    pub duplicate_deliveries: u64,
}
