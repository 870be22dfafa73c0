//! Headline KPIs derived from per-line utilization and two counters.

use std::collections::BTreeSet;

use crate::LineUtilization;

/// The `/api/kpis` payload before serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct KpiSummary {
    pub line_utilization: Vec<LineUtilization>,
    pub flexible_slots_count: i64,
    pub pending_dc_requests: i64,
    /// Distinct lines with at least one scheduled day.
    pub active_lines: usize,
    /// Mean of `utilization_pct` over all line days, 0 when there are none.
    pub avg_utilization_pct: f64,
}

impl KpiSummary {
    pub fn new(
        line_utilization: Vec<LineUtilization>,
        flexible_slots_count: i64,
        pending_dc_requests: i64,
    ) -> Self {
        let active_lines = line_utilization
            .iter()
            .map(|u| u.line_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let avg_utilization_pct = if line_utilization.is_empty() {
            0.0
        } else {
            let total: f64 = line_utilization.iter().map(|u| u.utilization_pct).sum();
            total / line_utilization.len() as f64
        };
        Self {
            line_utilization,
            flexible_slots_count,
            pending_dc_requests,
            active_lines,
            avg_utilization_pct,
        }
    }
}
