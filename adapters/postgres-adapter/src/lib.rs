//! postgres-adapter — Postgres implementation of the DashboardRepository port.
//!
//! Purpose
//! - Run the dashboard's read queries against the managed Postgres instance
//!   (RDS) that owns the factory schema.
//! - Implements the `DashboardRepository` trait from the `domain` crate.
//! - Provides `DbConfig::from_env()` wiring using `DB_HOST`, `DB_PORT`,
//!   `DB_NAME`, `DB_USER`, `DB_PASS` and optional `DB_SSLMODE`.
//!
//! Notes
//! - Uses `sqlx` with a lazily connected `PgPool`: the process starts even
//!   when the database is down, and each request fails with
//!   `CoreError::Unavailable` until it is reachable again.
//! - Identifiers are cast to `text` and quantities to `bigint`/`float8` in
//!   SQL so decoding does not depend on the exact column types.
//! - Only `SELECT` statements are issued.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use domain::{
    BomLine, CoreError, DashboardRepository, DcRequestRow, GanttRow, InventoryRow,
    LineCapability, LineUtilization, MasterData, MaterialStock, ProductionLine, ScheduleEntry,
    STATUS_APPROVED, STATUS_PENDING,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, warn};

mod queries;

/// How long a request waits for a pooled connection before the database is
/// reported unavailable.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the dashboard database.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: PgSslMode,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Invalid or missing database configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DbConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{field} has invalid value '{value}'")]
    Invalid { field: &'static str, value: String },
}

impl DbConfigError {
    /// The environment variable at fault.
    pub fn field(&self) -> &'static str {
        match self {
            DbConfigError::Missing(field) => field,
            DbConfigError::Invalid { field, .. } => field,
        }
    }
}

impl DbConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, DbConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(DbConfigError::Missing(key));

        let host = required("DB_HOST")?;
        let port = match get("DB_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| DbConfigError::Invalid {
                field: "DB_PORT",
                value: raw.clone(),
            })?,
            None => 5432,
        };
        let database = required("DB_NAME")?;
        let user = required("DB_USER")?;
        let password = required("DB_PASS")?;
        let ssl_mode = match get("DB_SSLMODE") {
            Some(raw) => raw.trim().parse().map_err(|_| DbConfigError::Invalid {
                field: "DB_SSLMODE",
                value: raw.clone(),
            })?,
            None => PgSslMode::Prefer,
        };

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
            ssl_mode,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(self.ssl_mode)
            .application_name("control-tower-api")
    }
}

/// Postgres-backed dashboard repository.
#[derive(Clone, Debug)]
pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a lazily connected pool. No connection is opened until the
    /// first query. Must be called from within a Tokio runtime.
    pub fn connect_lazy(config: &DbConfig) -> Self {
        debug!(host = %config.host, port = config.port, db = %config.database, "creating lazy pg pool");
        let pool = PgPoolOptions::new()
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(config.connect_options());
        Self { pool }
    }

    /// Construct from `DB_*` environment variables.
    pub fn from_env() -> Result<Self, DbConfigError> {
        Ok(Self::connect_lazy(&DbConfig::from_env()?))
    }

    /// Run a trivial query to check the database is reachable.
    pub async fn ping(&self) -> Result<(), CoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_err)
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// SQLSTATE classes meaning "connected, but this database cannot be used":
// 28 invalid authorization, 3D invalid catalog name, 57P0x operator intervention.
fn is_unavailable_state(code: &str) -> bool {
    code.starts_with("28") || code.starts_with("3D") || code.starts_with("57P0")
}

fn map_sqlx_err(e: sqlx::Error) -> CoreError {
    match &e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => {
            warn!(err = %e, "postgres unreachable");
            CoreError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(db) => match db.code() {
            Some(code) if code == "22012" => CoreError::InvalidData(db.message().to_string()),
            Some(code) if is_unavailable_state(&code) => {
                warn!(err = %e, "postgres rejected connection");
                CoreError::Unavailable(e.to_string())
            }
            _ => CoreError::Repository(format!("postgres error: {e}")),
        },
        _ => CoreError::Repository(format!("postgres error: {e}")),
    }
}

#[derive(sqlx::FromRow)]
struct GanttRecord {
    line_id: String,
    line_name: String,
    production_date: NaiveDate,
    product_id: String,
    product_name: String,
    planned_qty_cases: i64,
    is_firm: bool,
    rate_cases_per_hour: i64,
    hours_needed: f64,
}

impl From<GanttRecord> for GanttRow {
    fn from(r: GanttRecord) -> Self {
        GanttRow {
            line_id: r.line_id,
            line_name: r.line_name,
            production_date: r.production_date,
            product_id: r.product_id,
            product_name: r.product_name,
            planned_qty_cases: r.planned_qty_cases,
            is_firm: r.is_firm,
            rate_cases_per_hour: r.rate_cases_per_hour,
            hours_needed: r.hours_needed,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UtilizationRecord {
    line_id: String,
    line_name: String,
    production_date: NaiveDate,
    total_cases: i64,
    daily_capacity_cases: i64,
    utilization_pct: f64,
    headroom_cases: i64,
}

impl From<UtilizationRecord> for LineUtilization {
    fn from(r: UtilizationRecord) -> Self {
        LineUtilization {
            line_id: r.line_id,
            line_name: r.line_name,
            date: r.production_date,
            total_cases: r.total_cases,
            daily_capacity_cases: r.daily_capacity_cases,
            utilization_pct: r.utilization_pct,
            headroom_cases: r.headroom_cases,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRecord {
    material_id: String,
    material_name: String,
    uom: String,
    supplier_lead_time_days: Option<i64>,
    on_hand_qty: f64,
}

impl From<InventoryRecord> for InventoryRow {
    fn from(r: InventoryRecord) -> Self {
        InventoryRow {
            material_id: r.material_id,
            material_name: r.material_name,
            uom: r.uom,
            supplier_lead_time_days: r.supplier_lead_time_days,
            on_hand_qty: r.on_hand_qty,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DcRequestRecord {
    request_id: String,
    dc_id: String,
    request_datetime: NaiveDateTime,
    product_id: String,
    product_name: String,
    requested_qty_cases: i64,
    requested_due_date: NaiveDate,
    promo_reason: Option<String>,
    status: String,
}

impl From<DcRequestRecord> for DcRequestRow {
    fn from(r: DcRequestRecord) -> Self {
        DcRequestRow {
            request_id: r.request_id,
            dc_id: r.dc_id,
            request_datetime: r.request_datetime,
            product_id: r.product_id,
            product_name: r.product_name,
            requested_qty_cases: r.requested_qty_cases,
            requested_due_date: r.requested_due_date,
            promo_reason: r.promo_reason,
            status: r.status,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRecord {
    line_id: String,
    production_date: NaiveDate,
    product_id: String,
    planned_qty_cases: i64,
    is_firm: bool,
}

#[derive(sqlx::FromRow)]
struct LineRecord {
    line_id: String,
    line_name: String,
    daily_capacity_cases: i64,
}

#[derive(sqlx::FromRow)]
struct CapabilityRecord {
    line_id: String,
    product_id: String,
    rate_cases_per_hour: i64,
}

#[derive(sqlx::FromRow)]
struct BomRecord {
    product_id: String,
    material_id: String,
    qty_per_case: f64,
    material_name: String,
    supplier_lead_time_days: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct StockRecord {
    material_id: String,
    on_hand_qty: f64,
}

fn collect<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(T::from).collect()
}

impl DashboardRepository for PgRepo {
    async fn gantt(&self) -> Result<Vec<GanttRow>, CoreError> {
        let rows: Vec<GanttRecord> = sqlx::query_as(queries::GANTT)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn line_utilization(&self) -> Result<Vec<LineUtilization>, CoreError> {
        let rows: Vec<UtilizationRecord> = sqlx::query_as(queries::LINE_UTILIZATION)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn flexible_slot_count(&self) -> Result<i64, CoreError> {
        sqlx::query_scalar(queries::FLEXIBLE_SLOT_COUNT)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn pending_dc_request_count(&self) -> Result<i64, CoreError> {
        sqlx::query_scalar(queries::DC_REQUEST_COUNT_BY_STATUS)
            .bind(STATUS_PENDING)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn inventory(&self) -> Result<Vec<InventoryRow>, CoreError> {
        let rows: Vec<InventoryRecord> = sqlx::query_as(queries::INVENTORY)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn inventory_by_lead_time(&self, limit: usize) -> Result<Vec<InventoryRow>, CoreError> {
        let rows: Vec<InventoryRecord> = sqlx::query_as(queries::INVENTORY_BY_LEAD_TIME)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn recent_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        let rows: Vec<DcRequestRecord> = sqlx::query_as(queries::RECENT_DC_REQUESTS)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn recent_open_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        let rows: Vec<DcRequestRecord> = sqlx::query_as(queries::RECENT_DC_REQUESTS_WITH_STATUS)
            .bind(STATUS_PENDING)
            .bind(STATUS_APPROVED)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(collect(rows))
    }

    async fn master_data(&self) -> Result<MasterData, CoreError> {
        // one connection for all five reads
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_err)?;

        let schedule: Vec<ScheduleRecord> = sqlx::query_as(queries::MASTER_SCHEDULE)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;
        let lines: Vec<LineRecord> = sqlx::query_as(queries::MASTER_LINES)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;
        let capability: Vec<CapabilityRecord> = sqlx::query_as(queries::MASTER_CAPABILITY)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;
        let bom: Vec<BomRecord> = sqlx::query_as(queries::MASTER_BOM)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;
        let inventory: Vec<StockRecord> = sqlx::query_as(queries::MASTER_INVENTORY)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;

        Ok(MasterData {
            schedule: schedule
                .into_iter()
                .map(|r| ScheduleEntry {
                    line_id: r.line_id,
                    production_date: r.production_date,
                    product_id: r.product_id,
                    planned_qty_cases: r.planned_qty_cases,
                    is_firm: r.is_firm,
                })
                .collect(),
            lines: lines
                .into_iter()
                .map(|r| ProductionLine {
                    line_id: r.line_id,
                    line_name: r.line_name,
                    daily_capacity_cases: r.daily_capacity_cases,
                })
                .collect(),
            capability: capability
                .into_iter()
                .map(|r| LineCapability {
                    line_id: r.line_id,
                    product_id: r.product_id,
                    rate_cases_per_hour: r.rate_cases_per_hour,
                })
                .collect(),
            bom: bom
                .into_iter()
                .map(|r| BomLine {
                    product_id: r.product_id,
                    material_id: r.material_id,
                    qty_per_case: r.qty_per_case,
                    material_name: r.material_name,
                    supplier_lead_time_days: r.supplier_lead_time_days,
                })
                .collect(),
            inventory: inventory
                .into_iter()
                .map(|r| MaterialStock {
                    material_id: r.material_id,
                    on_hand_qty: r.on_hand_qty,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("DB_HOST", "db.example.internal"),
        ("DB_NAME", "factory"),
        ("DB_USER", "dashboard"),
        ("DB_PASS", "s3cret"),
    ];

    #[test]
    fn config_defaults_port_and_sslmode() {
        let cfg = DbConfig::from_lookup(lookup(FULL)).unwrap();
        assert_eq!(cfg.host, "db.example.internal");
        assert_eq!(cfg.port, 5432);
        assert!(matches!(cfg.ssl_mode, PgSslMode::Prefer));
    }

    #[test]
    fn config_reports_first_missing_variable() {
        let err = DbConfig::from_lookup(lookup(&[("DB_HOST", "h"), ("DB_NAME", "n")])).unwrap_err();
        assert_eq!(err, DbConfigError::Missing("DB_USER"));
        assert_eq!(err.field(), "DB_USER");
        assert_eq!(err.to_string(), "DB_USER is not set");
    }

    #[test]
    fn config_treats_blank_as_missing() {
        let mut pairs = FULL.to_vec();
        pairs.push(("DB_HOST", "  "));
        let err = DbConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, DbConfigError::Missing("DB_HOST"));
    }

    #[test]
    fn config_rejects_bad_port_and_sslmode() {
        let mut pairs = FULL.to_vec();
        pairs.push(("DB_PORT", "eighty"));
        let err = DbConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(
            err,
            DbConfigError::Invalid {
                field: "DB_PORT",
                value: "eighty".into()
            }
        );

        let mut pairs = FULL.to_vec();
        pairs.push(("DB_SSLMODE", "sometimes"));
        let err = DbConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err.field(), "DB_SSLMODE");
    }

    #[test]
    fn config_parses_port_and_sslmode() {
        let mut pairs = FULL.to_vec();
        pairs.push(("DB_PORT", "6543"));
        pairs.push(("DB_SSLMODE", "require"));
        let cfg = DbConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.port, 6543);
        assert!(matches!(cfg.ssl_mode, PgSslMode::Require));
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = DbConfig::from_lookup(lookup(FULL)).unwrap();
        let printed = format!("{cfg:?}");
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn connection_failures_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_err(sqlx::Error::PoolTimedOut),
            CoreError::Unavailable(_)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            map_sqlx_err(sqlx::Error::Io(io)),
            CoreError::Unavailable(_)
        ));
    }

    #[test]
    fn other_failures_map_to_repository() {
        assert!(matches!(
            map_sqlx_err(sqlx::Error::RowNotFound),
            CoreError::Repository(_)
        ));
    }

    #[test]
    fn sqlstate_classes() {
        assert!(is_unavailable_state("28P01"));
        assert!(is_unavailable_state("3D000"));
        assert!(is_unavailable_state("57P03"));
        assert!(!is_unavailable_state("42P01"));
        assert!(!is_unavailable_state("22012"));
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let opts = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .database("factory")
            .username("nobody")
            .password("nothing")
            .ssl_mode(PgSslMode::Disable);
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy_with(opts);
        let repo = PgRepo::new(pool);

        assert!(matches!(repo.ping().await, Err(CoreError::Unavailable(_))));
        assert!(matches!(repo.gantt().await, Err(CoreError::Unavailable(_))));
        assert!(matches!(
            repo.master_data().await,
            Err(CoreError::Unavailable(_))
        ));
    }
}
