// =============================================================================
// MODELS MODULE
// =============================================================================
// Records stored by the service and the request/response shapes around them.
//
// Request bodies arrive as all-optional *patch* types. Create and PUT check
// the required fields, PATCH merges over the stored record, and either way
// the result is a complete *input* that carries the validator rules.
// `parse_body` turns a raw JSON body into a patch, reporting type errors
// against the offending field.
// =============================================================================

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

use crate::error::{AppError, AppResult, FieldErrors};

/// Status value that marks a purchase order as done. No other status is
/// interpreted by the service.
pub const COMPLETED_STATUS: &str = "completed";

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const DATETIME_FORMAT: &str =
    "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";

// =============================================================================
// VENDOR
// =============================================================================
/// A supplier together with its derived performance metrics.
///
/// The four metric fields are owned by the recompute routine in
/// `performance.rs`; clients can read them but never write them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub contact_details: String,
    pub address: String,
    /// Globally unique vendor code
    pub vendor_code: String,
    pub on_time_delivery_rate: f64,
    pub quality_rating_avg: f64,
    /// Mean acknowledgment delay in seconds
    pub average_response_time: f64,
    pub fulfillment_rate: f64,
}

impl Vendor {
    pub fn apply_metrics(&mut self, metrics: &PerformanceMetrics) {
        self.on_time_delivery_rate = metrics.on_time_delivery_rate;
        self.quality_rating_avg = metrics.quality_rating_avg;
        self.average_response_time = metrics.average_response_time;
        self.fulfillment_rate = metrics.fulfillment_rate;
    }
}

/// Validated, writable vendor fields.
#[derive(Debug, Clone, Validate)]
pub struct VendorInput {
    #[validate(length(min = 1, max = 255, message = "Ensure this field has between 1 and 255 characters."))]
    pub name: String,
    pub contact_details: String,
    pub address: String,
    #[validate(length(min = 1, max = 50, message = "Ensure this field has between 1 and 50 characters."))]
    pub vendor_code: String,
}

/// Vendor request body. Metric fields are not accepted from clients, and
/// none of the accepted fields may be `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorPatch {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub contact_details: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub vendor_code: Option<String>,
}

impl VendorPatch {
    /// Build the input for a new vendor; `name` and `vendor_code` are required.
    pub fn into_new(self) -> AppResult<VendorInput> {
        let mut missing = FieldErrors::new();
        require(&mut missing, "name", self.name.is_some());
        require(&mut missing, "vendor_code", self.vendor_code.is_some());
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        let input = VendorInput {
            name: self.name.unwrap_or_default(),
            contact_details: self.contact_details.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            vendor_code: self.vendor_code.unwrap_or_default(),
        };
        input.validate()?;
        Ok(input)
    }

    /// Full replacement (PUT). Optional text fields keep their stored value
    /// when omitted.
    pub fn into_replacement(self, current: &Vendor) -> AppResult<VendorInput> {
        let mut missing = FieldErrors::new();
        require(&mut missing, "name", self.name.is_some());
        require(&mut missing, "vendor_code", self.vendor_code.is_some());
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }
        self.merge(current)
    }

    /// Partial update (PATCH) over the stored record.
    pub fn merge(self, current: &Vendor) -> AppResult<VendorInput> {
        let input = VendorInput {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            contact_details: self
                .contact_details
                .unwrap_or_else(|| current.contact_details.clone()),
            address: self.address.unwrap_or_else(|| current.address.clone()),
            vendor_code: self
                .vendor_code
                .unwrap_or_else(|| current.vendor_code.clone()),
        };
        input.validate()?;
        Ok(input)
    }
}

// =============================================================================
// PURCHASE ORDER
// =============================================================================

/// One line of a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrder {
    pub id: i64,
    pub po_number: String,
    /// Owning vendor id
    #[sqlx(rename = "vendor_id")]
    pub vendor: i64,
    /// Set when the order is created, never changed afterwards
    pub order_date: DateTime<Utc>,
    pub delivery_date: DateTime<Utc>,
    #[sqlx(json)]
    pub items: Vec<OrderItem>,
    pub quantity: i32,
    pub status: String,
    pub quality_rating: Option<f64>,
    /// Set when the order is created, never changed afterwards
    pub issue_date: DateTime<Utc>,
    pub acknowledgment_date: Option<DateTime<Utc>>,
    pub fulfilled_without_issues: bool,
}

impl PurchaseOrder {
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}

/// Validated, writable purchase order fields.
#[derive(Debug, Clone, Validate)]
pub struct PurchaseOrderInput {
    #[validate(length(min = 1, max = 50, message = "Ensure this field has between 1 and 50 characters."))]
    pub po_number: String,
    pub vendor: i64,
    pub delivery_date: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    #[validate(range(min = 1, message = "Ensure this value is greater than or equal to 1."))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 50, message = "Ensure this field has between 1 and 50 characters."))]
    pub status: String,
    #[validate(range(min = 0.0, max = 5.0, message = "Ensure this value is between 0 and 5."))]
    pub quality_rating: Option<f64>,
    pub acknowledgment_date: Option<DateTime<Utc>>,
    pub fulfilled_without_issues: bool,
}

/// Purchase order request body.
///
/// `quality_rating` and `acknowledgment_date` distinguish "absent" (outer
/// `None`) from an explicit `null` (`Some(None)`), so PATCH can clear them.
/// Every other field rejects `null`. Date-times without an offset are UTC.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseOrderPatch {
    #[serde(default, deserialize_with = "present")]
    pub po_number: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub vendor: Option<i64>,
    #[serde(default, deserialize_with = "datetime")]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "present")]
    pub items: Option<Vec<OrderItem>>,
    #[serde(default, deserialize_with = "present")]
    pub quantity: Option<i32>,
    #[serde(default, deserialize_with = "present")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub quality_rating: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable_datetime")]
    pub acknowledgment_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub fulfilled_without_issues: Option<bool>,
}

impl PurchaseOrderPatch {
    fn missing_required(&self, with_po_number: bool) -> FieldErrors {
        let mut missing = FieldErrors::new();
        if with_po_number {
            require(&mut missing, "po_number", self.po_number.is_some());
        }
        require(&mut missing, "vendor", self.vendor.is_some());
        require(&mut missing, "delivery_date", self.delivery_date.is_some());
        require(&mut missing, "items", self.items.is_some());
        require(&mut missing, "quantity", self.quantity.is_some());
        require(&mut missing, "status", self.status.is_some());
        missing
    }

    /// Build the input for a new order. `po_number`, `vendor`,
    /// `delivery_date`, `items`, `quantity` and `status` are required.
    pub fn into_new(self) -> AppResult<PurchaseOrderInput> {
        let missing = self.missing_required(true);
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        let input = PurchaseOrderInput {
            po_number: self.po_number.unwrap_or_default(),
            vendor: self.vendor.unwrap_or_default(),
            delivery_date: self.delivery_date.unwrap_or_else(Utc::now),
            items: self.items.unwrap_or_default(),
            quantity: self.quantity.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            quality_rating: self.quality_rating.flatten(),
            acknowledgment_date: self.acknowledgment_date.flatten(),
            fulfilled_without_issues: self.fulfilled_without_issues.unwrap_or(false),
        };
        input.validate()?;
        Ok(input)
    }

    /// Full replacement (PUT). `po_number` may be omitted and keeps its
    /// stored value, as do the other optional fields.
    pub fn into_replacement(self, current: &PurchaseOrder) -> AppResult<PurchaseOrderInput> {
        let missing = self.missing_required(false);
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }
        self.merge(current)
    }

    /// Partial update (PATCH) over the stored record.
    pub fn merge(self, current: &PurchaseOrder) -> AppResult<PurchaseOrderInput> {
        let input = PurchaseOrderInput {
            po_number: self.po_number.unwrap_or_else(|| current.po_number.clone()),
            vendor: self.vendor.unwrap_or(current.vendor),
            delivery_date: self.delivery_date.unwrap_or(current.delivery_date),
            items: self.items.unwrap_or_else(|| current.items.clone()),
            quantity: self.quantity.unwrap_or(current.quantity),
            status: self.status.unwrap_or_else(|| current.status.clone()),
            quality_rating: self.quality_rating.unwrap_or(current.quality_rating),
            acknowledgment_date: self
                .acknowledgment_date
                .unwrap_or(current.acknowledgment_date),
            fulfilled_without_issues: self
                .fulfilled_without_issues
                .unwrap_or(current.fulfilled_without_issues),
        };
        input.validate()?;
        Ok(input)
    }
}

fn require(errors: &mut FieldErrors, field: &str, present: bool) {
    if !present {
        errors.insert(field.to_string(), vec![REQUIRED.to_string()]);
    }
}

// =============================================================================
// REQUEST BODIES
// =============================================================================

/// Deserialize a JSON request body into a patch type.
///
/// Each field is tried on its own first so a malformed value is reported as
/// a validation error on that field. Unknown fields are ignored.
pub fn parse_body<T: DeserializeOwned>(body: Value) -> AppResult<T> {
    let fields = match body {
        Value::Object(fields) => fields,
        other => {
            return Err(AppError::field(
                "non_field_errors",
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type(&other)
                ),
            ))
        }
    };

    let mut errors = FieldErrors::new();
    for (name, value) in &fields {
        let single: Map<String, Value> = [(name.clone(), value.clone())].into_iter().collect();
        if let Err(e) = serde_json::from_value::<T>(Value::Object(single)) {
            let message = if value.is_null() {
                NOT_NULL.to_string()
            } else {
                e.to_string()
            };
            errors.insert(name.clone(), vec![message]);
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Absent stays `None` through `#[serde(default)]`; `null` is an error.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Present-but-null becomes `Some(None)`; `#[serde(default)]` covers absent.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_datetime(&raw)
        .map(Some)
        .ok_or_else(|| de::Error::custom(DATETIME_FORMAT))
}

fn nullable_datetime<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(Some(None)),
        Some(raw) => parse_datetime(&raw)
            .map(|at| Some(Some(at)))
            .ok_or_else(|| de::Error::custom(DATETIME_FORMAT)),
    }
}

/// RFC 3339, or an ISO 8601 local date-time read as UTC.
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// =============================================================================
// PERFORMANCE
// =============================================================================

/// The four derived vendor metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub on_time_delivery_rate: f64,
    pub quality_rating_avg: f64,
    pub average_response_time: f64,
    pub fulfillment_rate: f64,
}

/// Append-only snapshot of a vendor's metrics, written on every recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoricalPerformance {
    pub id: i64,
    #[sqlx(rename = "vendor_id")]
    pub vendor: i64,
    pub date: DateTime<Utc>,
    pub on_time_delivery_rate: f64,
    pub quality_rating_avg: f64,
    pub average_response_time: f64,
    pub fulfillment_rate: f64,
}

// =============================================================================
// QUERY PARAMETERS & SMALL RESPONSES
// =============================================================================

/// Query parameters for `GET /purchase_orders/`
///
/// # Example
/// GET /purchase_orders/?vendor=3
#[derive(Debug, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub vendor: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks. `redis` is omitted when the cache
/// is not configured.
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<bool>,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Field-level problems for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
