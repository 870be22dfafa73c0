use crate::kpi::KpiSummary;
use crate::simulate::{simulate, ScenarioOutcome, ScenarioRequest};
use crate::{CoreError, DashboardRepository, DcRequestRow, GanttRow, InventoryRow};

/// How many DC requests the request feed shows.
pub const RECENT_DC_REQUESTS_LIMIT: usize = 20;
/// How many rows the compact summary cards show.
pub const SUMMARY_LIMIT: usize = 3;

/// Application service answering the dashboard's queries.
///
/// It stays generic over the repository so the same code runs against
/// Postgres in production and the in-memory adapter in tests. Every operation
/// is read-only.
pub struct DashboardService<R: DashboardRepository> {
    repo: R,
}

impl<R: DashboardRepository> DashboardService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Schedule rows for the Gantt chart.
    pub async fn gantt(&self) -> Result<Vec<GanttRow>, CoreError> {
        self.repo.gantt().await
    }

    /// Line utilization plus headline counters.
    pub async fn kpis(&self) -> Result<KpiSummary, CoreError> {
        let utilization = self.repo.line_utilization().await?;
        let flexible = self.repo.flexible_slot_count().await?;
        let pending = self.repo.pending_dc_request_count().await?;
        Ok(KpiSummary::new(utilization, flexible, pending))
    }

    pub async fn inventory(&self) -> Result<Vec<InventoryRow>, CoreError> {
        self.repo.inventory().await
    }

    /// Materials with the longest supplier lead times.
    pub async fn inventory_summary(&self) -> Result<Vec<InventoryRow>, CoreError> {
        self.repo.inventory_by_lead_time(SUMMARY_LIMIT).await
    }

    pub async fn dc_requests(&self) -> Result<Vec<DcRequestRow>, CoreError> {
        self.repo.recent_dc_requests(RECENT_DC_REQUESTS_LIMIT).await
    }

    /// Latest requests that are still pending or already approved.
    pub async fn dc_requests_summary(&self) -> Result<Vec<DcRequestRow>, CoreError> {
        self.repo.recent_open_dc_requests(SUMMARY_LIMIT).await
    }

    /// Load master data and run the what-if simulator on it.
    pub async fn simulate(&self, request: &ScenarioRequest) -> Result<ScenarioOutcome, CoreError> {
        let data = self.repo.master_data().await?;
        Ok(simulate(request, &data))
    }
}
