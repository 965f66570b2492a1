// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer).
//
// Every purchase order write ends with an explicit call to
// `refresh_vendor`, which recomputes the owning vendor's metrics before the
// response is sent. A failure there fails the request.
// =============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::cache::CacheLookup;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::performance::{self, RecomputeTrigger};
use crate::AppState;

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "vendor-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: database, plus Redis when the cache is configured.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let db_healthy = state.store.health_check().await;
    let redis_healthy = match &state.cache {
        Some(cache) => Some(cache.ping().await),
        None => None,
    };

    let all_healthy = db_healthy && redis_healthy.unwrap_or(true);
    let response = ReadinessResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            database: db_healthy,
            redis: redis_healthy,
        },
    };

    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// VENDOR ENDPOINTS
// =============================================================================

/// GET /vendors/
pub async fn list_vendors(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Vendor>>> {
    Ok(Json(state.store.list_vendors().await?))
}

/// Create a vendor. Metrics start at 0.
///
/// POST /vendors/
///
/// # Request Body
/// ```json
/// {
///   "name": "Acme Supplies",
///   "contact_details": "orders@acme.test",
///   "address": "1 Industrial Way",
///   "vendor_code": "ACME-001"
/// }
/// ```
pub async fn create_vendor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Vendor>)> {
    let patch: VendorPatch = parse_body(payload?.0)?;
    let input = patch.into_new()?;

    let vendor = state.store.insert_vendor(&input).await?;
    tracing::info!(
        vendor_id = vendor.id,
        vendor_code = %vendor.vendor_code,
        actor = %user.subject,
        "Vendor created"
    );

    Ok((StatusCode::CREATED, Json(vendor)))
}

/// GET /vendors/:id/
///
/// Served from the Redis cache when configured.
pub async fn get_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vendor>> {
    let mut generation = None;
    if let Some(cache) = &state.cache {
        match cache.get(id).await {
            CacheLookup::Hit(vendor) => return Ok(Json(vendor)),
            CacheLookup::Miss {
                generation: current,
            } => generation = current,
        }
    }

    let vendor = load_vendor(&state, id).await?;
    // Tagged with the generation seen before the load, so an entry raced by
    // a concurrent invalidation is never served
    if let (Some(cache), Some(generation)) = (&state.cache, generation) {
        cache.put(&vendor, generation).await;
    }
    Ok(Json(vendor))
}

/// PUT /vendors/:id/
pub async fn replace_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<Vendor>> {
    let patch: VendorPatch = parse_body(payload?.0)?;
    let current = load_vendor(&state, id).await?;
    let input = patch.into_replacement(&current)?;
    save_vendor(&state, &user, id, &input).await.map(Json)
}

/// PATCH /vendors/:id/
pub async fn patch_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<Vendor>> {
    let patch: VendorPatch = parse_body(payload?.0)?;
    let current = load_vendor(&state, id).await?;
    let input = patch.merge(&current)?;
    save_vendor(&state, &user, id, &input).await.map(Json)
}

/// Delete a vendor with its purchase orders and history.
///
/// DELETE /vendors/:id/
pub async fn delete_vendor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !state.store.delete_vendor(id).await? {
        return Err(vendor_not_found(id));
    }
    invalidate_vendor(&state, id).await;

    tracing::info!(vendor_id = id, actor = %user.subject, "Vendor deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Live performance metrics, recomputed on every call.
///
/// GET /vendors/:id/performance/
///
/// # Response
/// ```json
/// {
///   "on_time_delivery_rate": 1.0,
///   "quality_rating_avg": 4.5,
///   "average_response_time": 3600.0,
///   "fulfillment_rate": 0.5
/// }
/// ```
pub async fn vendor_performance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<PerformanceMetrics>> {
    let metrics = performance::performance_snapshot(state.store.as_ref(), id).await?;
    Ok(Json(metrics))
}

/// Stored metric snapshots, oldest first.
///
/// GET /vendors/:id/performance/history/
pub async fn vendor_performance_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<HistoricalPerformance>>> {
    load_vendor(&state, id).await?;
    Ok(Json(state.store.list_performance_history(id).await?))
}

async fn load_vendor(state: &AppState, id: i64) -> AppResult<Vendor> {
    state
        .store
        .get_vendor(id)
        .await?
        .ok_or_else(|| vendor_not_found(id))
}

async fn save_vendor(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    input: &VendorInput,
) -> AppResult<Vendor> {
    let vendor = state
        .store
        .update_vendor(id, input)
        .await?
        .ok_or_else(|| vendor_not_found(id))?;
    invalidate_vendor(state, id).await;

    tracing::info!(vendor_id = id, actor = %user.subject, "Vendor updated");
    Ok(vendor)
}

async fn invalidate_vendor(state: &AppState, id: i64) {
    if let Some(cache) = &state.cache {
        cache.invalidate(id).await;
    }
}

fn vendor_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Vendor {id} not found"))
}

// =============================================================================
// PURCHASE ORDER ENDPOINTS
// =============================================================================

/// GET /purchase_orders/
/// GET /purchase_orders/?vendor=3
pub async fn list_purchase_orders(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> AppResult<Json<Vec<PurchaseOrder>>> {
    Ok(Json(state.store.list_purchase_orders(filter.vendor).await?))
}

/// Create a purchase order and recompute its vendor's metrics.
///
/// POST /purchase_orders/
///
/// # Request Body
/// ```json
/// {
///   "po_number": "PO-001",
///   "vendor": 1,
///   "delivery_date": "2024-06-30T00:00:00Z",
///   "items": [{"name": "Item 1", "quantity": 10}],
///   "quantity": 10,
///   "status": "pending"
/// }
/// ```
pub async fn create_purchase_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<(StatusCode, Json<PurchaseOrder>)> {
    let patch: PurchaseOrderPatch = parse_body(payload?.0)?;
    let input = patch.into_new()?;
    ensure_vendor_reference(&state, input.vendor).await?;

    let order = state.store.insert_purchase_order(&input).await?;
    tracing::info!(
        po_id = order.id,
        po_number = %order.po_number,
        vendor_id = order.vendor,
        actor = %user.subject,
        "Purchase order created"
    );

    refresh_vendor(&state, order.vendor, RecomputeTrigger::OrderCreated).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /purchase_orders/:id/
pub async fn get_purchase_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<PurchaseOrder>> {
    load_purchase_order(&state, id).await.map(Json)
}

/// PUT /purchase_orders/:id/
pub async fn replace_purchase_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<PurchaseOrder>> {
    let patch: PurchaseOrderPatch = parse_body(payload?.0)?;
    let current = load_purchase_order(&state, id).await?;
    let input = patch.into_replacement(&current)?;
    save_purchase_order(&state, &user, &current, &input).await.map(Json)
}

/// PATCH /purchase_orders/:id/
pub async fn patch_purchase_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<PurchaseOrder>> {
    let patch: PurchaseOrderPatch = parse_body(payload?.0)?;
    let current = load_purchase_order(&state, id).await?;
    let input = patch.merge(&current)?;
    save_purchase_order(&state, &user, &current, &input).await.map(Json)
}

/// DELETE /purchase_orders/:id/
pub async fn delete_purchase_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let order = state
        .store
        .delete_purchase_order(id)
        .await?
        .ok_or_else(|| purchase_order_not_found(id))?;
    tracing::info!(
        po_id = id,
        vendor_id = order.vendor,
        actor = %user.subject,
        "Purchase order deleted"
    );

    refresh_vendor(&state, order.vendor, RecomputeTrigger::OrderDeleted).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stamp the acknowledgment time. Repeated calls move the stamp forward.
///
/// POST /purchase_orders/:id/acknowledge/
pub async fn acknowledge_purchase_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let order = state
        .store
        .acknowledge_purchase_order(id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("PO not found.".to_string()))?;
    metrics::record_acknowledgment();
    tracing::info!(
        po_id = id,
        po_number = %order.po_number,
        actor = %user.subject,
        "Purchase order acknowledged"
    );

    refresh_vendor(&state, order.vendor, RecomputeTrigger::OrderAcknowledged).await?;
    Ok(Json(MessageResponse::new("PO acknowledged successfully.")))
}

async fn load_purchase_order(state: &AppState, id: i64) -> AppResult<PurchaseOrder> {
    state
        .store
        .get_purchase_order(id)
        .await?
        .ok_or_else(|| purchase_order_not_found(id))
}

async fn save_purchase_order(
    state: &AppState,
    user: &AuthUser,
    current: &PurchaseOrder,
    input: &PurchaseOrderInput,
) -> AppResult<PurchaseOrder> {
    ensure_vendor_reference(state, input.vendor).await?;

    let order = state
        .store
        .update_purchase_order(current.id, input)
        .await?
        .ok_or_else(|| purchase_order_not_found(current.id))?;
    tracing::info!(
        po_id = order.id,
        po_number = %order.po_number,
        actor = %user.subject,
        "Purchase order updated"
    );

    refresh_vendor(state, order.vendor, RecomputeTrigger::OrderUpdated).await?;
    if current.vendor != order.vendor {
        refresh_vendor(state, current.vendor, RecomputeTrigger::OrderReassigned).await?;
    }
    Ok(order)
}

/// Reject writes that point at a vendor that doesn't exist.
async fn ensure_vendor_reference(state: &AppState, vendor_id: i64) -> AppResult<()> {
    if state.store.get_vendor(vendor_id).await?.is_none() {
        return Err(AppError::field(
            "vendor",
            format!("Invalid pk \"{vendor_id}\" - object does not exist."),
        ));
    }
    Ok(())
}

/// Recompute trigger: refresh stored metrics and drop the cached vendor.
async fn refresh_vendor(
    state: &AppState,
    vendor_id: i64,
    trigger: RecomputeTrigger,
) -> AppResult<()> {
    performance::recompute_vendor_metrics(state.store.as_ref(), vendor_id, trigger).await?;
    invalidate_vendor(state, vendor_id).await;
    Ok(())
}

fn purchase_order_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Purchase order {id} not found"))
}
