//! What-if simulator for an extra DC request.
//!
//! Tries to fit `extra_cases` of a product onto capable lines on or before a
//! due date, first into unused daily headroom and then by bumping flexible
//! (non-firm) runs. Firm runs are never bumped. The allocated volume is then
//! checked against the product's bill of materials and on-hand inventory.
//!
//! Nothing here writes anywhere; the outcome is advisory.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::{BomLine, LineCapability, MasterData, MaterialStock, ScheduleEntry};

/// Input for a single simulation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioRequest {
    pub product_id: String,
    pub extra_cases: i64,
    pub due_date: NaiveDate,
}

/// Volume placed on one line on one day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanRow {
    pub line_id: String,
    pub production_date: NaiveDate,
    pub allocated_cases: i64,
    pub used_headroom: i64,
    pub bumped_flexible: i64,
}

/// Result of [`simulate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub can_fulfill: bool,
    pub allocated_total: i64,
    pub remaining: i64,
    pub plan_rows: Vec<PlanRow>,
    pub material_blockers: Vec<String>,
    pub capacity_blockers: Vec<String>,
    pub message: String,
}

/// Run the allocation and material check for `request` against `data`.
pub fn simulate(request: &ScenarioRequest, data: &MasterData) -> ScenarioOutcome {
    let capable_lines = capable_lines(&data.capability, &request.product_id);
    if capable_lines.is_empty() {
        return ScenarioOutcome {
            can_fulfill: false,
            allocated_total: 0,
            remaining: request.extra_cases,
            plan_rows: Vec::new(),
            material_blockers: vec!["No line can run this product".into()],
            capacity_blockers: vec!["No capable line found".into()],
            message: "No line can produce this SKU.".into(),
        };
    }

    let window: Vec<&ScheduleEntry> = data
        .schedule
        .iter()
        .filter(|s| s.production_date <= request.due_date)
        .collect();
    let dates: BTreeSet<NaiveDate> = window.iter().map(|s| s.production_date).collect();

    let mut remaining = request.extra_cases;
    let mut plan_rows = Vec::new();

    'dates: for date in dates {
        for line_id in &capable_lines {
            if remaining <= 0 {
                break 'dates;
            }
            let Some(line) = data.lines.iter().find(|l| &l.line_id == line_id) else {
                continue;
            };

            let (planned, flexible) = window
                .iter()
                .filter(|s| &s.line_id == line_id && s.production_date == date)
                .fold((0i64, 0i64), |(planned, flexible), s| {
                    let flexible = if s.is_firm {
                        flexible
                    } else {
                        flexible + s.planned_qty_cases
                    };
                    (planned + s.planned_qty_cases, flexible)
                });
            let headroom = (line.daily_capacity_cases - planned).max(0);

            let possible_today = headroom + flexible;
            if possible_today <= 0 {
                continue;
            }

            let allocate_now = possible_today.min(remaining);
            plan_rows.push(PlanRow {
                line_id: line_id.clone(),
                production_date: date,
                allocated_cases: allocate_now,
                used_headroom: headroom.min(allocate_now),
                bumped_flexible: (allocate_now - headroom).max(0),
            });
            remaining -= allocate_now;
        }
    }

    let allocated_total = request.extra_cases - remaining;
    let material_blockers = material_blockers(
        &data.bom,
        &data.inventory,
        &request.product_id,
        allocated_total,
    );

    let mut capacity_blockers = Vec::new();
    if remaining > 0 {
        capacity_blockers.push(format!(
            "Short {} cases before {}",
            remaining, request.due_date
        ));
    }

    let can_fulfill = remaining <= 0 && material_blockers.is_empty();
    let message = if can_fulfill {
        format!(
            "We can produce all {} cases by {} without impacting firm orders. Approved.",
            group_thousands(request.extra_cases),
            request.due_date
        )
    } else {
        let mut bits = Vec::new();
        if allocated_total > 0 {
            bits.push(format!(
                "We can cover {} cases by {}.",
                group_thousands(allocated_total),
                request.due_date
            ));
        }
        if remaining > 0 {
            bits.push(format!(
                "Remaining {} cases need later dates or bumping firm slots.",
                group_thousands(remaining)
            ));
        }
        if !material_blockers.is_empty() {
            bits.push(format!(
                "Material constraints: {}",
                material_blockers.join("; ")
            ));
        }
        bits.join(" ")
    };

    ScenarioOutcome {
        can_fulfill,
        allocated_total,
        remaining,
        plan_rows,
        material_blockers,
        capacity_blockers,
        message,
    }
}

// Distinct lines able to run the product, in first-seen order.
fn capable_lines(capability: &[LineCapability], product_id: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for cap in capability.iter().filter(|c| c.product_id == product_id) {
        if !lines.contains(&cap.line_id) {
            lines.push(cap.line_id.clone());
        }
    }
    lines
}

fn material_blockers(
    bom: &[BomLine],
    inventory: &[MaterialStock],
    product_id: &str,
    allocated_total: i64,
) -> Vec<String> {
    let sku_bom: Vec<&BomLine> = bom.iter().filter(|b| b.product_id == product_id).collect();
    if sku_bom.is_empty() {
        return vec!["No BOM for this SKU.".into()];
    }

    let mut blockers = Vec::new();
    for line in sku_bom {
        let need = line.qty_per_case * allocated_total as f64;
        let have = inventory
            .iter()
            .find(|i| i.material_id == line.material_id)
            .map(|i| i.on_hand_qty)
            .unwrap_or(0.0);
        if need > have {
            let shortage = (need - have).round_ties_even() as i64;
            let lead = match line.supplier_lead_time_days {
                Some(days) => format!("lead {days}d"),
                None => "lead unknown".to_string(),
            };
            blockers.push(format!(
                "{} short by {} ({})",
                line.material_name,
                group_thousands(shortage),
                lead
            ));
        }
    }
    blockers
}

/// Format an integer with `,` between groups of three digits.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
