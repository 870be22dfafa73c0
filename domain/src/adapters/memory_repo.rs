use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::{
    BomLine, CoreError, DashboardRepository, DcRequestRow, GanttRow, InventoryRow,
    LineCapability, LineUtilization, MasterData, MaterialStock, ProductionLine, ScheduleEntry,
    STATUS_APPROVED, STATUS_PENDING,
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Material {
    pub material_id: String,
    pub material_name: String,
    pub uom: String,
    #[serde(default)]
    pub supplier_lead_time_days: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BomEntry {
    pub product_id: String,
    pub material_id: String,
    pub qty_per_case: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DcRequest {
    pub request_id: String,
    pub dc_id: String,
    pub request_datetime: NaiveDateTime,
    pub product_id: String,
    pub requested_qty_cases: i64,
    pub requested_due_date: NaiveDate,
    #[serde(default)]
    pub promo_reason: Option<String>,
    pub status: String,
}

/// Table contents the in-memory repository answers queries from.
///
/// Field names match the Postgres tables so a JSON export of the database can
/// be loaded directly.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub lines: Vec<ProductionLine>,
    pub products: Vec<Product>,
    pub line_capability: Vec<LineCapability>,
    pub schedule: Vec<ScheduleEntry>,
    pub materials: Vec<Material>,
    pub inventory_materials: Vec<MaterialStock>,
    pub bill_of_materials: Vec<BomEntry>,
    pub dc_requests: Vec<DcRequest>,
}

/// Read-only repository over a fixed [`Dataset`].
///
/// Joins behave like SQL inner joins: rows without a matching partner are
/// left out.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRepo {
    data: Dataset,
}

impl InMemoryRepo {
    pub fn new(data: Dataset) -> Self {
        Self { data }
    }

    fn line(&self, line_id: &str) -> Option<&ProductionLine> {
        self.data.lines.iter().find(|l| l.line_id == line_id)
    }

    fn product(&self, product_id: &str) -> Option<&Product> {
        self.data.products.iter().find(|p| p.product_id == product_id)
    }

    fn material(&self, material_id: &str) -> Option<&Material> {
        self.data.materials.iter().find(|m| m.material_id == material_id)
    }

    fn inventory_rows(&self) -> Vec<InventoryRow> {
        let mut rows: Vec<InventoryRow> = self
            .data
            .inventory_materials
            .iter()
            .filter_map(|stock| {
                let m = self.material(&stock.material_id)?;
                Some(InventoryRow {
                    material_id: m.material_id.clone(),
                    material_name: m.material_name.clone(),
                    uom: m.uom.clone(),
                    supplier_lead_time_days: m.supplier_lead_time_days,
                    on_hand_qty: stock.on_hand_qty,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.material_id.cmp(&b.material_id));
        rows
    }

    fn dc_rows<F>(&self, keep: F, limit: usize) -> Vec<DcRequestRow>
    where
        F: Fn(&DcRequest) -> bool,
    {
        let mut rows: Vec<DcRequestRow> = self
            .data
            .dc_requests
            .iter()
            .filter(|r| keep(r))
            .filter_map(|r| {
                let p = self.product(&r.product_id)?;
                Some(DcRequestRow {
                    request_id: r.request_id.clone(),
                    dc_id: r.dc_id.clone(),
                    request_datetime: r.request_datetime,
                    product_id: r.product_id.clone(),
                    product_name: p.product_name.clone(),
                    requested_qty_cases: r.requested_qty_cases,
                    requested_due_date: r.requested_due_date,
                    promo_reason: r.promo_reason.clone(),
                    status: r.status.clone(),
                })
            })
            .collect();
        rows.sort_by_key(|r| Reverse(r.request_datetime));
        rows.truncate(limit);
        rows
    }
}

impl DashboardRepository for InMemoryRepo {
    async fn gantt(&self) -> Result<Vec<GanttRow>, CoreError> {
        let mut rows = Vec::with_capacity(self.data.schedule.len());
        for s in &self.data.schedule {
            let (Some(product), Some(line)) = (self.product(&s.product_id), self.line(&s.line_id))
            else {
                continue;
            };
            let Some(cap) = self
                .data
                .line_capability
                .iter()
                .find(|c| c.line_id == s.line_id && c.product_id == s.product_id)
            else {
                continue;
            };
            if cap.rate_cases_per_hour == 0 {
                return Err(CoreError::InvalidData(format!(
                    "rate_cases_per_hour is zero for line {} product {}",
                    cap.line_id, cap.product_id
                )));
            }
            rows.push(GanttRow {
                line_id: s.line_id.clone(),
                line_name: line.line_name.clone(),
                production_date: s.production_date,
                product_id: s.product_id.clone(),
                product_name: product.product_name.clone(),
                planned_qty_cases: s.planned_qty_cases,
                is_firm: s.is_firm,
                rate_cases_per_hour: cap.rate_cases_per_hour,
                hours_needed: s.planned_qty_cases as f64 / cap.rate_cases_per_hour as f64,
            });
        }
        rows.sort_by(|a, b| {
            (a.production_date, &a.line_id).cmp(&(b.production_date, &b.line_id))
        });
        Ok(rows)
    }

    async fn line_utilization(&self) -> Result<Vec<LineUtilization>, CoreError> {
        // keyed by (date, line) so iteration order is the required sort order
        let mut totals: BTreeMap<(NaiveDate, &str), i64> = BTreeMap::new();
        for s in &self.data.schedule {
            if self.line(&s.line_id).is_none() {
                continue;
            }
            *totals
                .entry((s.production_date, s.line_id.as_str()))
                .or_insert(0) += s.planned_qty_cases;
        }

        let mut rows = Vec::with_capacity(totals.len());
        for ((date, line_id), total_cases) in totals {
            let Some(line) = self.line(line_id) else {
                continue;
            };
            if line.daily_capacity_cases == 0 {
                return Err(CoreError::InvalidData(format!(
                    "daily_capacity_cases is zero for line {}",
                    line.line_id
                )));
            }
            rows.push(LineUtilization {
                line_id: line.line_id.clone(),
                line_name: line.line_name.clone(),
                date,
                total_cases,
                daily_capacity_cases: line.daily_capacity_cases,
                utilization_pct: total_cases as f64 / line.daily_capacity_cases as f64 * 100.0,
                headroom_cases: line.daily_capacity_cases - total_cases,
            });
        }
        Ok(rows)
    }

    async fn flexible_slot_count(&self) -> Result<i64, CoreError> {
        Ok(self.data.schedule.iter().filter(|s| !s.is_firm).count() as i64)
    }

    async fn pending_dc_request_count(&self) -> Result<i64, CoreError> {
        Ok(self
            .data
            .dc_requests
            .iter()
            .filter(|r| r.status == STATUS_PENDING)
            .count() as i64)
    }

    async fn inventory(&self) -> Result<Vec<InventoryRow>, CoreError> {
        Ok(self.inventory_rows())
    }

    async fn inventory_by_lead_time(&self, limit: usize) -> Result<Vec<InventoryRow>, CoreError> {
        let mut rows = self.inventory_rows();
        // Reverse(None) sorts after every Reverse(Some(_)): unknown lead times go last
        rows.sort_by_key(|r| Reverse(r.supplier_lead_time_days));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        Ok(self.dc_rows(|_| true, limit))
    }

    async fn recent_open_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        Ok(self.dc_rows(
            |r| r.status == STATUS_PENDING || r.status == STATUS_APPROVED,
            limit,
        ))
    }

    async fn master_data(&self) -> Result<MasterData, CoreError> {
        let bom = self
            .data
            .bill_of_materials
            .iter()
            .filter_map(|b| {
                let m = self.material(&b.material_id)?;
                Some(BomLine {
                    product_id: b.product_id.clone(),
                    material_id: b.material_id.clone(),
                    qty_per_case: b.qty_per_case,
                    material_name: m.material_name.clone(),
                    supplier_lead_time_days: m.supplier_lead_time_days,
                })
            })
            .collect();
        Ok(MasterData {
            schedule: self.data.schedule.clone(),
            lines: self.data.lines.clone(),
            capability: self.data.line_capability.clone(),
            bom,
            inventory: self.data.inventory_materials.clone(),
        })
    }
}
