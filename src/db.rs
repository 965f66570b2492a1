// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL implementation of the `Repository` port.
//
// - One pooled connection set shared by all requests
// - Schema created idempotently at startup
// - Foreign keys cascade vendor deletes to orders and history
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

use crate::error::{AppError, AppResult};
use crate::models::{
    HistoricalPerformance, PerformanceMetrics, PurchaseOrder, PurchaseOrderInput, Vendor,
    VendorInput,
};
use crate::store::Repository;

const VENDOR_COLUMNS: &str = "id, name, contact_details, address, vendor_code, \
     on_time_delivery_rate, quality_rating_avg, average_response_time, fulfillment_rate";

const PURCHASE_ORDER_COLUMNS: &str = "id, po_number, vendor_id, order_date, delivery_date, \
     items, quantity, status, quality_rating, issue_date, acknowledgment_date, \
     fulfilled_without_issues";

const HISTORY_COLUMNS: &str = "id, vendor_id, date, on_time_delivery_rate, quality_rating_avg, \
     average_response_time, fulfillment_rate";

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    /// * `max_connections` - Upper bound on pooled connections
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create tables and indexes if they don't exist yet.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vendors (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                contact_details TEXT NOT NULL DEFAULT '',
                address TEXT NOT NULL DEFAULT '',
                vendor_code VARCHAR(50) NOT NULL,

                -- Derived by the recompute routine, never written by clients
                on_time_delivery_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
                quality_rating_avg DOUBLE PRECISION NOT NULL DEFAULT 0,
                average_response_time DOUBLE PRECISION NOT NULL DEFAULT 0,
                fulfillment_rate DOUBLE PRECISION NOT NULL DEFAULT 0,

                CONSTRAINT vendors_vendor_code_key UNIQUE (vendor_code)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create vendors table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchase_orders (
                id BIGSERIAL PRIMARY KEY,
                po_number VARCHAR(50) NOT NULL,
                vendor_id BIGINT NOT NULL REFERENCES vendors(id) ON DELETE CASCADE,
                order_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                delivery_date TIMESTAMPTZ NOT NULL,
                items JSONB NOT NULL,
                quantity INTEGER NOT NULL,
                status VARCHAR(50) NOT NULL,
                quality_rating DOUBLE PRECISION,
                issue_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                acknowledgment_date TIMESTAMPTZ,
                fulfilled_without_issues BOOLEAN NOT NULL DEFAULT FALSE,

                CONSTRAINT purchase_orders_po_number_key UNIQUE (po_number),
                CONSTRAINT positive_quantity CHECK (quantity >= 1),
                CONSTRAINT quality_rating_range CHECK (quality_rating BETWEEN 0 AND 5)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create purchase_orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS historical_performance (
                id BIGSERIAL PRIMARY KEY,
                vendor_id BIGINT NOT NULL REFERENCES vendors(id) ON DELETE CASCADE,
                date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                on_time_delivery_rate DOUBLE PRECISION NOT NULL,
                quality_rating_avg DOUBLE PRECISION NOT NULL,
                average_response_time DOUBLE PRECISION NOT NULL,
                fulfillment_rate DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create historical_performance table")?;

        // Foreign keys are the hot filter for recompute and listing
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_purchase_orders_vendor ON purchase_orders(vendor_id)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create purchase order vendor index")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_historical_performance_vendor \
             ON historical_performance(vendor_id, date)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create history vendor index")?;

        Ok(())
    }
}

/// Turn constraint violations into field-level validation errors.
fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("vendors_vendor_code_key") => {
                    return AppError::field(
                        "vendor_code",
                        "vendor with this vendor code already exists.",
                    )
                }
                Some("purchase_orders_po_number_key") => {
                    return AppError::field(
                        "po_number",
                        "purchase order with this po number already exists.",
                    )
                }
                _ => {}
            }
        }
        if db_err.is_foreign_key_violation() {
            return AppError::field("vendor", "Referenced vendor does not exist.");
        }
        if db_err.is_check_violation() {
            return AppError::BadRequest(db_err.message().to_string());
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl Repository for Database {
    // -------------------------------------------------------------------------
    // VENDORS
    // -------------------------------------------------------------------------

    async fn list_vendors(&self) -> AppResult<Vec<Vendor>> {
        let vendors = sqlx::query_as::<_, Vendor>(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(vendors)
    }

    async fn get_vendor(&self, id: i64) -> AppResult<Option<Vendor>> {
        let vendor = sqlx::query_as::<_, Vendor>(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(vendor)
    }

    async fn insert_vendor(&self, input: &VendorInput) -> AppResult<Vendor> {
        sqlx::query_as::<_, Vendor>(&format!(
            r#"
            INSERT INTO vendors (name, contact_details, address, vendor_code)
            VALUES ($1, $2, $3, $4)
            RETURNING {VENDOR_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(&input.contact_details)
        .bind(&input.address)
        .bind(&input.vendor_code)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn update_vendor(&self, id: i64, input: &VendorInput) -> AppResult<Option<Vendor>> {
        sqlx::query_as::<_, Vendor>(&format!(
            r#"
            UPDATE vendors
            SET name = $1, contact_details = $2, address = $3, vendor_code = $4
            WHERE id = $5
            RETURNING {VENDOR_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(&input.contact_details)
        .bind(&input.address)
        .bind(&input.vendor_code)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn delete_vendor(&self, id: i64) -> AppResult<bool> {
        // ON DELETE CASCADE removes orders and history
        let result = sqlx::query("DELETE FROM vendors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_vendor_metrics(
        &self,
        id: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<Option<Vendor>> {
        let vendor = sqlx::query_as::<_, Vendor>(&format!(
            r#"
            UPDATE vendors
            SET on_time_delivery_rate = $1,
                quality_rating_avg = $2,
                average_response_time = $3,
                fulfillment_rate = $4
            WHERE id = $5
            RETURNING {VENDOR_COLUMNS}
            "#
        ))
        .bind(metrics.on_time_delivery_rate)
        .bind(metrics.quality_rating_avg)
        .bind(metrics.average_response_time)
        .bind(metrics.fulfillment_rate)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(vendor)
    }

    // -------------------------------------------------------------------------
    // PURCHASE ORDERS
    // -------------------------------------------------------------------------

    async fn list_purchase_orders(&self, vendor: Option<i64>) -> AppResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            SELECT {PURCHASE_ORDER_COLUMNS}
            FROM purchase_orders
            WHERE $1::BIGINT IS NULL OR vendor_id = $1
            ORDER BY id ASC
            "#
        ))
        .bind(vendor)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn get_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {PURCHASE_ORDER_COLUMNS} FROM purchase_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn insert_purchase_order(&self, input: &PurchaseOrderInput) -> AppResult<PurchaseOrder> {
        sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            INSERT INTO purchase_orders (
                po_number, vendor_id, delivery_date, items, quantity, status,
                quality_rating, acknowledgment_date, fulfilled_without_issues
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PURCHASE_ORDER_COLUMNS}
            "#
        ))
        .bind(&input.po_number)
        .bind(input.vendor)
        .bind(input.delivery_date)
        .bind(Json(&input.items))
        .bind(input.quantity)
        .bind(&input.status)
        .bind(input.quality_rating)
        .bind(input.acknowledgment_date)
        .bind(input.fulfilled_without_issues)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn update_purchase_order(
        &self,
        id: i64,
        input: &PurchaseOrderInput,
    ) -> AppResult<Option<PurchaseOrder>> {
        // order_date and issue_date are immutable
        sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET po_number = $1,
                vendor_id = $2,
                delivery_date = $3,
                items = $4,
                quantity = $5,
                status = $6,
                quality_rating = $7,
                acknowledgment_date = $8,
                fulfilled_without_issues = $9
            WHERE id = $10
            RETURNING {PURCHASE_ORDER_COLUMNS}
            "#
        ))
        .bind(&input.po_number)
        .bind(input.vendor)
        .bind(input.delivery_date)
        .bind(Json(&input.items))
        .bind(input.quantity)
        .bind(&input.status)
        .bind(input.quality_rating)
        .bind(input.acknowledgment_date)
        .bind(input.fulfilled_without_issues)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn delete_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "DELETE FROM purchase_orders WHERE id = $1 RETURNING {PURCHASE_ORDER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn acknowledge_purchase_order(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Option<PurchaseOrder>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET acknowledgment_date = $1
            WHERE id = $2
            RETURNING {PURCHASE_ORDER_COLUMNS}
            "#
        ))
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn purchase_orders_for_vendor(&self, vendor: i64) -> AppResult<Vec<PurchaseOrder>> {
        self.list_purchase_orders(Some(vendor)).await
    }

    // -------------------------------------------------------------------------
    // PERFORMANCE HISTORY
    // -------------------------------------------------------------------------

    async fn insert_performance_snapshot(
        &self,
        vendor: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<HistoricalPerformance> {
        let snapshot = sqlx::query_as::<_, HistoricalPerformance>(&format!(
            r#"
            INSERT INTO historical_performance (
                vendor_id, on_time_delivery_rate, quality_rating_avg,
                average_response_time, fulfillment_rate
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(vendor)
        .bind(metrics.on_time_delivery_rate)
        .bind(metrics.quality_rating_avg)
        .bind(metrics.average_response_time)
        .bind(metrics.fulfillment_rate)
        .fetch_one(&self.pool)
        .await?;
        Ok(snapshot)
    }

    async fn list_performance_history(&self, vendor: i64) -> AppResult<Vec<HistoricalPerformance>> {
        let history = sqlx::query_as::<_, HistoricalPerformance>(&format!(
            r#"
            SELECT {HISTORY_COLUMNS}
            FROM historical_performance
            WHERE vendor_id = $1
            ORDER BY date ASC, id ASC
            "#
        ))
        .bind(vendor)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
