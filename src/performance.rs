// =============================================================================
// VENDOR PERFORMANCE
// =============================================================================
// Derives the four vendor metrics from the vendor's purchase orders.
//
// - `calculate_metrics` is pure: a full re-scan of the given orders
// - `recompute_vendor_metrics` is the write-path hook: called explicitly
//   after every purchase order save, it stores the result on the vendor and
//   appends a history snapshot
// - `performance_snapshot` computes the same numbers on demand without
//   writing anything
// =============================================================================

use std::time::Instant;

use chrono::Duration;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{PerformanceMetrics, PurchaseOrder, Vendor};
use crate::store::Repository;

/// Which write caused a recompute. Used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTrigger {
    OrderCreated,
    OrderUpdated,
    OrderReassigned,
    OrderAcknowledged,
    OrderDeleted,
}

impl RecomputeTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RecomputeTrigger::OrderCreated => "order_created",
            RecomputeTrigger::OrderUpdated => "order_updated",
            RecomputeTrigger::OrderReassigned => "order_reassigned",
            RecomputeTrigger::OrderAcknowledged => "order_acknowledged",
            RecomputeTrigger::OrderDeleted => "order_deleted",
        }
    }
}

// =============================================================================
// CALCULATOR
// =============================================================================

/// Compute vendor metrics from `orders`, which must be every purchase order
/// of one vendor regardless of status.
///
/// Only orders with status `"completed"` feed the on-time, quality and
/// response-time figures. The fulfillment rate divides completed,
/// issue-free orders by *all* orders. Empty denominators yield 0.
pub fn calculate_metrics(orders: &[PurchaseOrder]) -> PerformanceMetrics {
    let completed: Vec<&PurchaseOrder> = orders.iter().filter(|po| po.is_completed()).collect();

    // Each order's delivery_date is compared with itself: there is no
    // promised-date field, so every completed order counts as on time.
    let on_time = completed.len();

    let ratings: Vec<f64> = completed.iter().filter_map(|po| po.quality_rating).collect();

    let response_times: Vec<f64> = completed
        .iter()
        .filter_map(|po| {
            po.acknowledgment_date
                .map(|acked| seconds(acked - po.issue_date))
        })
        .collect();

    let fulfilled = completed
        .iter()
        .filter(|po| po.fulfilled_without_issues)
        .count();

    PerformanceMetrics {
        on_time_delivery_rate: ratio(on_time, completed.len()),
        quality_rating_avg: mean(&ratings),
        average_response_time: mean(&response_times),
        fulfillment_rate: ratio(fulfilled, orders.len()),
    }
}

/// Whole duration in seconds, microsecond precision.
fn seconds(delta: Duration) -> f64 {
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// =============================================================================
// RECOMPUTE & SNAPSHOT
// =============================================================================

/// Recompute and persist a vendor's metrics, then append a history snapshot.
///
/// Any persistence failure is returned to the caller so the triggering save
/// fails with it. There is no locking around the read-then-write: concurrent
/// saves for one vendor end with the last writer's view.
pub async fn recompute_vendor_metrics(
    store: &dyn Repository,
    vendor_id: i64,
    trigger: RecomputeTrigger,
) -> AppResult<Vendor> {
    let start = Instant::now();

    let orders = store.purchase_orders_for_vendor(vendor_id).await?;
    let computed = calculate_metrics(&orders);

    let vendor = store
        .save_vendor_metrics(vendor_id, &computed)
        .await?
        .ok_or_else(|| vendor_not_found(vendor_id))?;
    store.insert_performance_snapshot(vendor_id, &computed).await?;

    metrics::record_recompute(trigger.as_str(), start.elapsed().as_secs_f64());
    tracing::info!(
        vendor_id,
        trigger = trigger.as_str(),
        orders = orders.len(),
        on_time_delivery_rate = computed.on_time_delivery_rate,
        quality_rating_avg = computed.quality_rating_avg,
        average_response_time = computed.average_response_time,
        fulfillment_rate = computed.fulfillment_rate,
        "Vendor metrics recomputed"
    );

    Ok(vendor)
}

/// Live metrics for a vendor, computed from its current orders.
pub async fn performance_snapshot(
    store: &dyn Repository,
    vendor_id: i64,
) -> AppResult<PerformanceMetrics> {
    if store.get_vendor(vendor_id).await?.is_none() {
        return Err(vendor_not_found(vendor_id));
    }
    let orders = store.purchase_orders_for_vendor(vendor_id).await?;
    Ok(calculate_metrics(&orders))
}

fn vendor_not_found(vendor_id: i64) -> AppError {
    AppError::NotFound(format!("Vendor {vendor_id} not found"))
}
