// =============================================================================
// REPOSITORY PORT
// =============================================================================
// Everything the handlers and the recompute routine need from persistence.
// `db::Database` implements it on PostgreSQL; tests use an in-memory
// implementation.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{
    HistoricalPerformance, PerformanceMetrics, PurchaseOrder, PurchaseOrderInput, Vendor,
    VendorInput,
};

#[async_trait]
pub trait Repository: Send + Sync {
    // ----- Vendors -----

    async fn list_vendors(&self) -> AppResult<Vec<Vendor>>;

    async fn get_vendor(&self, id: i64) -> AppResult<Option<Vendor>>;

    /// Insert a vendor with all metrics at 0.
    async fn insert_vendor(&self, input: &VendorInput) -> AppResult<Vendor>;

    /// Overwrite the writable fields. Metrics are untouched.
    async fn update_vendor(&self, id: i64, input: &VendorInput) -> AppResult<Option<Vendor>>;

    /// Delete a vendor together with its purchase orders and history.
    /// Returns `false` if no such vendor exists.
    async fn delete_vendor(&self, id: i64) -> AppResult<bool>;

    /// Overwrite the four derived metric fields.
    async fn save_vendor_metrics(
        &self,
        id: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<Option<Vendor>>;

    // ----- Purchase orders -----

    async fn list_purchase_orders(&self, vendor: Option<i64>) -> AppResult<Vec<PurchaseOrder>>;

    async fn get_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>>;

    /// Insert an order; `order_date` and `issue_date` are set to now.
    async fn insert_purchase_order(&self, input: &PurchaseOrderInput) -> AppResult<PurchaseOrder>;

    async fn update_purchase_order(
        &self,
        id: i64,
        input: &PurchaseOrderInput,
    ) -> AppResult<Option<PurchaseOrder>>;

    /// Delete an order, returning the removed row.
    async fn delete_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>>;

    /// Set `acknowledgment_date` and nothing else.
    async fn acknowledge_purchase_order(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Option<PurchaseOrder>>;

    /// Every order of the vendor, any status.
    async fn purchase_orders_for_vendor(&self, vendor: i64) -> AppResult<Vec<PurchaseOrder>>;

    // ----- Performance history -----

    async fn insert_performance_snapshot(
        &self,
        vendor: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<HistoricalPerformance>;

    /// Snapshots for a vendor, oldest first.
    async fn list_performance_history(&self, vendor: i64) -> AppResult<Vec<HistoricalPerformance>>;

    // ----- Health -----

    async fn health_check(&self) -> bool;
}
