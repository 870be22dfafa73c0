//! Domain library for the Factory Control Tower API.
//!
//! This crate only depends on `serde` and `chrono` and holds the row types
//! served to the dashboard, the repository port (trait), and error
//! definitions. Keep adapters and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// Status of a DC request still awaiting a planning decision.
pub const STATUS_PENDING: &str = "PENDING";
/// Status of a DC request that planning has accepted.
pub const STATUS_APPROVED: &str = "APPROVED";

/// A scheduled production run joined with its line, product and line rate.
#[derive(Clone, Debug, PartialEq)]
pub struct GanttRow {
    pub line_id: String,
    pub line_name: String,
    pub production_date: NaiveDate,
    pub product_id: String,
    pub product_name: String,
    pub planned_qty_cases: i64,
    pub is_firm: bool,
    pub rate_cases_per_hour: i64,
    /// Planned cases divided by the line's rate for this product.
    pub hours_needed: f64,
}

/// Planned volume of one line on one day against its daily capacity.
#[derive(Clone, Debug, PartialEq)]
pub struct LineUtilization {
    pub line_id: String,
    pub line_name: String,
    pub date: NaiveDate,
    pub total_cases: i64,
    pub daily_capacity_cases: i64,
    pub utilization_pct: f64,
    /// Negative when the line is planned over capacity.
    pub headroom_cases: i64,
}

/// A material with its current on-hand quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct InventoryRow {
    pub material_id: String,
    pub material_name: String,
    pub uom: String,
    pub supplier_lead_time_days: Option<i64>,
    pub on_hand_qty: f64,
}

/// A distribution-center production request joined with its product name.
#[derive(Clone, Debug, PartialEq)]
pub struct DcRequestRow {
    pub request_id: String,
    pub dc_id: String,
    pub request_datetime: NaiveDateTime,
    pub product_id: String,
    pub product_name: String,
    pub requested_qty_cases: i64,
    pub requested_due_date: NaiveDate,
    pub promo_reason: Option<String>,
    pub status: String,
}

/// One row of the production schedule.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ScheduleEntry {
    pub line_id: String,
    pub production_date: NaiveDate,
    pub product_id: String,
    pub planned_qty_cases: i64,
    pub is_firm: bool,
}

/// A production line and how many cases it can make per day.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProductionLine {
    pub line_id: String,
    pub line_name: String,
    pub daily_capacity_cases: i64,
}

/// A product a line is able to run, at a given rate.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LineCapability {
    pub line_id: String,
    pub product_id: String,
    pub rate_cases_per_hour: i64,
}

/// A bill-of-materials line joined with the material's name and lead time.
#[derive(Clone, Debug, PartialEq)]
pub struct BomLine {
    pub product_id: String,
    pub material_id: String,
    pub qty_per_case: f64,
    pub material_name: String,
    pub supplier_lead_time_days: Option<i64>,
}

/// On-hand quantity of one material.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MaterialStock {
    pub material_id: String,
    pub on_hand_qty: f64,
}

/// Everything the scenario simulator reads, loaded in one go.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MasterData {
    pub schedule: Vec<ScheduleEntry>,
    pub lines: Vec<ProductionLine>,
    pub capability: Vec<LineCapability>,
    pub bom: Vec<BomLine>,
    pub inventory: Vec<MaterialStock>,
}

/// Repository port for the dashboard's read queries.
///
/// Every method is read-only; calling any of them repeatedly returns the same
/// result as long as the underlying data does not change.
pub trait DashboardRepository: Send + Sync {
    /// Schedule rows ordered by production date, then line.
    fn gantt(&self) -> impl Future<Output = Result<Vec<GanttRow>, CoreError>> + Send;
    /// Per line and day utilization ordered by date, then line.
    fn line_utilization(
        &self,
    ) -> impl Future<Output = Result<Vec<LineUtilization>, CoreError>> + Send;
    /// Number of schedule rows that are not firm.
    fn flexible_slot_count(&self) -> impl Future<Output = Result<i64, CoreError>> + Send;
    /// Number of DC requests with status `PENDING`.
    fn pending_dc_request_count(&self) -> impl Future<Output = Result<i64, CoreError>> + Send;
    /// All stocked materials ordered by material id.
    fn inventory(&self) -> impl Future<Output = Result<Vec<InventoryRow>, CoreError>> + Send;
    /// Materials with the longest supplier lead time first (unknown last).
    fn inventory_by_lead_time(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<InventoryRow>, CoreError>> + Send;
    /// Most recent DC requests first.
    fn recent_dc_requests(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DcRequestRow>, CoreError>> + Send;
    /// Most recent `PENDING` or `APPROVED` DC requests first.
    fn recent_open_dc_requests(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DcRequestRow>, CoreError>> + Send;
    /// Schedule, lines, capability, BOM and inventory for simulation.
    fn master_data(&self) -> impl Future<Output = Result<MasterData, CoreError>> + Send;
}

/// Core domain errors (no external error crates to keep deps minimal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The data source could not be reached.
    Unavailable(String),
    /// The data source was reached but the query failed.
    Repository(String),
    /// Stored data cannot produce a result (e.g. a zero rate divisor).
    InvalidData(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Unavailable(msg) => write!(f, "data source unavailable: {}", msg),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
            CoreError::InvalidData(msg) => write!(f, "invalid data: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod kpi;
pub mod service;
pub mod simulate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_display_includes_detail() {
        let err = CoreError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "data source unavailable: connection refused");

        let err = CoreError::InvalidData("rate is zero".into());
        assert_eq!(err.to_string(), "invalid data: rate is zero");
    }

    #[test]
    fn master_data_defaults_to_empty() {
        let data = MasterData::default();
        assert!(data.schedule.is_empty());
        assert!(data.bom.is_empty());
    }
}
