// =============================================================================
// IN-MEMORY REPOSITORY
// =============================================================================
// Repository backed by plain collections. Enforces the same uniqueness,
// foreign-key and cascade rules as the PostgreSQL schema.
// =============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{
    HistoricalPerformance, PerformanceMetrics, PurchaseOrder, PurchaseOrderInput, Vendor,
    VendorInput,
};
use crate::store::Repository;

#[derive(Default)]
struct Tables {
    vendors: BTreeMap<i64, Vendor>,
    purchase_orders: BTreeMap<i64, PurchaseOrder>,
    history: Vec<HistoricalPerformance>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_vendor_code(&self, code: &str, except: Option<i64>) -> AppResult<()> {
        let taken = self
            .vendors
            .values()
            .any(|v| v.vendor_code == code && Some(v.id) != except);
        if taken {
            return Err(AppError::field(
                "vendor_code",
                "vendor with this vendor code already exists.",
            ));
        }
        Ok(())
    }

    fn check_order(&self, input: &PurchaseOrderInput, except: Option<i64>) -> AppResult<()> {
        if !self.vendors.contains_key(&input.vendor) {
            return Err(AppError::field(
                "vendor",
                format!("Invalid pk \"{}\" - object does not exist.", input.vendor),
            ));
        }
        let taken = self
            .purchase_orders
            .values()
            .any(|po| po.po_number == input.po_number && Some(po.id) != except);
        if taken {
            return Err(AppError::field(
                "po_number",
                "purchase order with this po number already exists.",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn list_vendors(&self) -> AppResult<Vec<Vendor>> {
        Ok(self.tables.read().await.vendors.values().cloned().collect())
    }

    async fn get_vendor(&self, id: i64) -> AppResult<Option<Vendor>> {
        Ok(self.tables.read().await.vendors.get(&id).cloned())
    }

    async fn insert_vendor(&self, input: &VendorInput) -> AppResult<Vendor> {
        let mut tables = self.tables.write().await;
        tables.check_vendor_code(&input.vendor_code, None)?;

        let vendor = Vendor {
            id: tables.next_id(),
            name: input.name.clone(),
            contact_details: input.contact_details.clone(),
            address: input.address.clone(),
            vendor_code: input.vendor_code.clone(),
            on_time_delivery_rate: 0.0,
            quality_rating_avg: 0.0,
            average_response_time: 0.0,
            fulfillment_rate: 0.0,
        };
        tables.vendors.insert(vendor.id, vendor.clone());
        Ok(vendor)
    }

    async fn update_vendor(&self, id: i64, input: &VendorInput) -> AppResult<Option<Vendor>> {
        let mut tables = self.tables.write().await;
        if !tables.vendors.contains_key(&id) {
            return Ok(None);
        }
        tables.check_vendor_code(&input.vendor_code, Some(id))?;

        let vendor = tables.vendors.get_mut(&id).map(|vendor| {
            vendor.name = input.name.clone();
            vendor.contact_details = input.contact_details.clone();
            vendor.address = input.address.clone();
            vendor.vendor_code = input.vendor_code.clone();
            vendor.clone()
        });
        Ok(vendor)
    }

    async fn delete_vendor(&self, id: i64) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.vendors.remove(&id).is_none() {
            return Ok(false);
        }
        tables.purchase_orders.retain(|_, po| po.vendor != id);
        tables.history.retain(|h| h.vendor != id);
        Ok(true)
    }

    async fn save_vendor_metrics(
        &self,
        id: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<Option<Vendor>> {
        let mut tables = self.tables.write().await;
        Ok(tables.vendors.get_mut(&id).map(|vendor| {
            vendor.apply_metrics(metrics);
            vendor.clone()
        }))
    }

    async fn list_purchase_orders(&self, vendor: Option<i64>) -> AppResult<Vec<PurchaseOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .purchase_orders
            .values()
            .filter(|po| vendor.map_or(true, |id| po.vendor == id))
            .cloned()
            .collect())
    }

    async fn get_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>> {
        Ok(self.tables.read().await.purchase_orders.get(&id).cloned())
    }

    async fn insert_purchase_order(&self, input: &PurchaseOrderInput) -> AppResult<PurchaseOrder> {
        let mut tables = self.tables.write().await;
        tables.check_order(input, None)?;

        let now = Utc::now();
        let po = PurchaseOrder {
            id: tables.next_id(),
            po_number: input.po_number.clone(),
            vendor: input.vendor,
            order_date: now,
            delivery_date: input.delivery_date,
            items: input.items.clone(),
            quantity: input.quantity,
            status: input.status.clone(),
            quality_rating: input.quality_rating,
            issue_date: now,
            acknowledgment_date: input.acknowledgment_date,
            fulfilled_without_issues: input.fulfilled_without_issues,
        };
        tables.purchase_orders.insert(po.id, po.clone());
        Ok(po)
    }

    async fn update_purchase_order(
        &self,
        id: i64,
        input: &PurchaseOrderInput,
    ) -> AppResult<Option<PurchaseOrder>> {
        let mut tables = self.tables.write().await;
        if !tables.purchase_orders.contains_key(&id) {
            return Ok(None);
        }
        tables.check_order(input, Some(id))?;

        Ok(tables.purchase_orders.get_mut(&id).map(|po| {
            po.po_number = input.po_number.clone();
            po.vendor = input.vendor;
            po.delivery_date = input.delivery_date;
            po.items = input.items.clone();
            po.quantity = input.quantity;
            po.status = input.status.clone();
            po.quality_rating = input.quality_rating;
            po.acknowledgment_date = input.acknowledgment_date;
            po.fulfilled_without_issues = input.fulfilled_without_issues;
            po.clone()
        }))
    }

    async fn delete_purchase_order(&self, id: i64) -> AppResult<Option<PurchaseOrder>> {
        Ok(self.tables.write().await.purchase_orders.remove(&id))
    }

    async fn acknowledge_purchase_order(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Option<PurchaseOrder>> {
        let mut tables = self.tables.write().await;
        Ok(tables.purchase_orders.get_mut(&id).map(|po| {
            po.acknowledgment_date = Some(at);
            po.clone()
        }))
    }

    async fn purchase_orders_for_vendor(&self, vendor: i64) -> AppResult<Vec<PurchaseOrder>> {
        self.list_purchase_orders(Some(vendor)).await
    }

    async fn insert_performance_snapshot(
        &self,
        vendor: i64,
        metrics: &PerformanceMetrics,
    ) -> AppResult<HistoricalPerformance> {
        let mut tables = self.tables.write().await;
        if !tables.vendors.contains_key(&vendor) {
            return Err(AppError::NotFound(format!("Vendor {vendor} not found")));
        }

        let snapshot = HistoricalPerformance {
            id: tables.next_id(),
            vendor,
            date: Utc::now(),
            on_time_delivery_rate: metrics.on_time_delivery_rate,
            quality_rating_avg: metrics.quality_rating_avg,
            average_response_time: metrics.average_response_time,
            fulfillment_rate: metrics.fulfillment_rate,
        };
        tables.history.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn list_performance_history(&self, vendor: i64) -> AppResult<Vec<HistoricalPerformance>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| h.vendor == vendor)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
