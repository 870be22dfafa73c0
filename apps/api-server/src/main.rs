//! api-server — Read-only HTTP API for the Factory Control Tower dashboard.
//!
//! Serves production schedule, KPI, inventory and DC request data as JSON:
//! - Storage: Postgres (default, `DB_*` variables) or a static JSON dataset
//!   held in memory (`STORAGE_PROVIDER=memory`).
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string), open by default.
//! - Reload: `--reload` re-reads `.env` and rebuilds the server when the file
//!   changes or on SIGHUP.
//!
//! Run:
//! ```bash
//! # against the factory database; pretty logs (default)
//! DB_HOST=... DB_NAME=... DB_USER=... DB_PASS=... cargo run -p api-server
//!
//! # against the bundled demo dataset
//! STORAGE_PROVIDER=memory \
//! MEMORY_DATASET_PATH=apps/api-server/fixtures/sample_dataset.json \
//!   cargo run -p api-server -- --port 8000 --reload
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;
mod lifecycle;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::http::{HeaderName, HeaderValue};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use clap::Parser;
use config::{Config, ConfigError, LogFormat, Storage};
use domain::adapters::memory_repo::{Dataset, InMemoryRepo};
use domain::kpi::KpiSummary;
use domain::service::DashboardService;
use domain::simulate::{PlanRow, ScenarioOutcome, ScenarioRequest};
use domain::{
    CoreError, DashboardRepository, DcRequestRow, GanttRow, InventoryRow, LineUtilization,
    MasterData,
};
use lifecycle::Restart;
use postgres_adapter::PgRepo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Read-only HTTP API serving factory planning data to the control tower dashboard.
#[derive(Debug, Parser)]
#[command(name = "api-server", version)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
    /// Reload configuration when the .env file changes or on SIGHUP
    #[arg(long)]
    reload: bool,
}

impl Cli {
    fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// Storage selected at startup: postgres or an in-memory dataset.
#[derive(Clone)]
enum AnyRepo {
    Memory(Arc<InMemoryRepo>),
    Postgres(PgRepo),
}

impl AnyRepo {
    fn build(storage: &Storage) -> Result<Self, ConfigError> {
        match storage {
            Storage::Postgres(db) => Ok(Self::Postgres(PgRepo::connect_lazy(db))),
            Storage::Memory { dataset_path } => {
                let dataset = match dataset_path {
                    Some(path) => load_dataset(path)?,
                    None => {
                        warn!("MEMORY_DATASET_PATH not set: serving an empty dataset");
                        Dataset::default()
                    }
                };
                Ok(Self::Memory(Arc::new(InMemoryRepo::new(dataset))))
            }
        }
    }

    // Logs whether the database answers; never blocks startup.
    fn check_connection(&self) {
        if let AnyRepo::Postgres(pg) = self {
            let pg = pg.clone();
            tokio::spawn(async move {
                match pg.ping().await {
                    Ok(()) => info!("database reachable"),
                    Err(e) => warn!(
                        err = %e,
                        "database not reachable yet; requests return 503 until it is"
                    ),
                }
            });
        }
    }

    async fn close(&self) {
        if let AnyRepo::Postgres(pg) = self {
            pg.close().await;
        }
    }
}

impl DashboardRepository for AnyRepo {
    async fn gantt(&self) -> Result<Vec<GanttRow>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.gantt().await,
            AnyRepo::Postgres(r) => r.gantt().await,
        }
    }

    async fn line_utilization(&self) -> Result<Vec<LineUtilization>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.line_utilization().await,
            AnyRepo::Postgres(r) => r.line_utilization().await,
        }
    }

    async fn flexible_slot_count(&self) -> Result<i64, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.flexible_slot_count().await,
            AnyRepo::Postgres(r) => r.flexible_slot_count().await,
        }
    }

    async fn pending_dc_request_count(&self) -> Result<i64, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.pending_dc_request_count().await,
            AnyRepo::Postgres(r) => r.pending_dc_request_count().await,
        }
    }

    async fn inventory(&self) -> Result<Vec<InventoryRow>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.inventory().await,
            AnyRepo::Postgres(r) => r.inventory().await,
        }
    }

    async fn inventory_by_lead_time(&self, limit: usize) -> Result<Vec<InventoryRow>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.inventory_by_lead_time(limit).await,
            AnyRepo::Postgres(r) => r.inventory_by_lead_time(limit).await,
        }
    }

    async fn recent_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.recent_dc_requests(limit).await,
            AnyRepo::Postgres(r) => r.recent_dc_requests(limit).await,
        }
    }

    async fn recent_open_dc_requests(&self, limit: usize) -> Result<Vec<DcRequestRow>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.recent_open_dc_requests(limit).await,
            AnyRepo::Postgres(r) => r.recent_open_dc_requests(limit).await,
        }
    }

    async fn master_data(&self) -> Result<MasterData, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.master_data().await,
            AnyRepo::Postgres(r) => r.master_data().await,
        }
    }
}

fn load_dataset(path: &Path) -> Result<Dataset, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError {
        field: "MEMORY_DATASET_PATH",
        message: format!("Cannot read '{}': {}", path.display(), e),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError {
        field: "MEMORY_DATASET_PATH",
        message: format!("Invalid dataset '{}': {}", path.display(), e),
    })
}

#[derive(Clone)]
struct AppState {
    service: Arc<DashboardService<AnyRepo>>,
}

impl AppState {
    fn new(repo: AnyRepo) -> Self {
        Self {
            service: Arc::new(DashboardService::new(repo)),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env first so clap's env fallbacks and Config see its values
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(cfg.log_format);
    cfg.warn_if_insecure();
    if let Some(path) = &env_file {
        info!(path = %path.display(), "loaded env file");
    }

    if let Err(e) = run(cli, cfg, env_file).await {
        error!(err = %e, "api-server failed");
        std::process::exit(1);
    }
}

async fn run(
    cli: Cli,
    mut cfg: Config,
    env_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let _signals = lifecycle::spawn_signal_listener(tx.clone(), cli.reload)?;
    if cli.reload {
        match &env_file {
            Some(path) => {
                let _ = lifecycle::spawn_env_watcher(
                    path.clone(),
                    lifecycle::ENV_POLL_INTERVAL,
                    tx.clone(),
                );
            }
            None => warn!("--reload without a .env file: only SIGHUP triggers a reload"),
        }
    }
    drop(tx);

    let mut repo = AnyRepo::build(&cfg.storage)?;
    repo.check_connection();

    let mut addr = cli.socket_addr();
    loop {
        let listener = TcpListener::bind(addr).await?;
        addr = listener.local_addr()?;
        info!(%addr, storage = cfg.storage.name(), reload = cli.reload, "api-server listening");

        let app = build_router(
            AppState::new(repo.clone()),
            cors_layer(&cfg.cors_allow_origin),
        );
        match lifecycle::serve_until_restart(listener, app, &mut events).await? {
            Restart::Stop => break,
            Restart::Reload => match reload(env_file.as_deref()) {
                Ok((new_cfg, new_repo)) => {
                    if new_cfg.log_format != cfg.log_format {
                        warn!("LOG_FORMAT changes take effect on the next start");
                    }
                    new_cfg.warn_if_insecure();
                    repo.close().await;
                    new_repo.check_connection();
                    cfg = new_cfg;
                    repo = new_repo;
                    info!(storage = cfg.storage.name(), "configuration reloaded");
                }
                Err(e) => error!(err = %e, "reload failed; keeping previous configuration"),
            },
        }
    }

    repo.close().await;
    info!("api-server stopped");
    Ok(())
}

// Re-read the env file (overriding earlier values) and rebuild config and storage.
fn reload(env_file: Option<&Path>) -> Result<(Config, AnyRepo), ConfigError> {
    if let Some(path) = env_file {
        dotenvy::from_path_override(path).map_err(|e| ConfigError {
            field: "DOTENV",
            message: format!("Cannot load '{}': {}", path.display(), e),
        })?;
    }
    let cfg = Config::from_env()?;
    let repo = AnyRepo::build(&cfg.storage)?;
    Ok((cfg, repo))
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

fn cors_layer(origin: &HeaderValue) -> CorsLayer {
    if origin.as_bytes() == b"*" {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin.clone()]))
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    }
}

fn build_router(state: AppState, cors: CorsLayer) -> Router {
    // Request ID header name
    let x_request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/api/gantt", get(get_gantt))
        .route("/api/kpis", get(get_kpis))
        .route("/api/inventory", get(get_inventory))
        .route("/api/inventory/summary", get(get_inventory_summary))
        .route("/api/dc_requests", get(get_dc_requests))
        .route("/api/dc_requests/summary", get(get_dc_requests_summary))
        .route("/api/simulate", get(get_simulate))
        .fallback(not_found)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Serialize)]
struct GanttOut {
    line_id: String,
    line_name: String,
    production_date: String,
    product_id: String,
    product_name: String,
    planned_qty_cases: i64,
    is_firm: bool,
    rate_cases_per_hour: i64,
    hours_needed: f64,
}

impl From<GanttRow> for GanttOut {
    fn from(r: GanttRow) -> Self {
        Self {
            line_id: r.line_id,
            line_name: r.line_name,
            production_date: http_common::date_to_iso(r.production_date),
            product_id: r.product_id,
            product_name: r.product_name,
            planned_qty_cases: r.planned_qty_cases,
            is_firm: r.is_firm,
            rate_cases_per_hour: r.rate_cases_per_hour,
            hours_needed: r.hours_needed,
        }
    }
}

#[derive(Serialize)]
struct LineUtilizationOut {
    line_id: String,
    line_name: String,
    date: String,
    total_cases: i64,
    daily_capacity_cases: i64,
    utilization_pct: f64,
    headroom_cases: i64,
}

impl From<LineUtilization> for LineUtilizationOut {
    fn from(u: LineUtilization) -> Self {
        Self {
            line_id: u.line_id,
            line_name: u.line_name,
            date: http_common::date_to_iso(u.date),
            total_cases: u.total_cases,
            daily_capacity_cases: u.daily_capacity_cases,
            utilization_pct: u.utilization_pct,
            headroom_cases: u.headroom_cases,
        }
    }
}

#[derive(Serialize)]
struct KpisOut {
    line_utilization: Vec<LineUtilizationOut>,
    flexible_slots_count: i64,
    pending_dc_requests: i64,
    active_lines: usize,
    avg_utilization_pct: f64,
}

impl From<KpiSummary> for KpisOut {
    fn from(k: KpiSummary) -> Self {
        Self {
            line_utilization: k.line_utilization.into_iter().map(Into::into).collect(),
            flexible_slots_count: k.flexible_slots_count,
            pending_dc_requests: k.pending_dc_requests,
            active_lines: k.active_lines,
            avg_utilization_pct: k.avg_utilization_pct,
        }
    }
}

#[derive(Serialize)]
struct InventoryOut {
    material_id: String,
    material_name: String,
    uom: String,
    supplier_lead_time_days: Option<i64>,
    on_hand_qty: f64,
}

impl From<InventoryRow> for InventoryOut {
    fn from(r: InventoryRow) -> Self {
        Self {
            material_id: r.material_id,
            material_name: r.material_name,
            uom: r.uom,
            supplier_lead_time_days: r.supplier_lead_time_days,
            on_hand_qty: r.on_hand_qty,
        }
    }
}

#[derive(Serialize)]
struct DcRequestOut {
    request_id: String,
    dc_id: String,
    request_datetime: String,
    product_id: String,
    product_name: String,
    requested_qty_cases: i64,
    requested_due_date: String,
    promo_reason: Option<String>,
    status: String,
}

impl From<DcRequestRow> for DcRequestOut {
    fn from(r: DcRequestRow) -> Self {
        Self {
            request_id: r.request_id,
            dc_id: r.dc_id,
            request_datetime: http_common::datetime_to_iso(r.request_datetime),
            product_id: r.product_id,
            product_name: r.product_name,
            requested_qty_cases: r.requested_qty_cases,
            requested_due_date: http_common::date_to_iso(r.requested_due_date),
            promo_reason: r.promo_reason,
            status: r.status,
        }
    }
}

#[derive(Serialize)]
struct PlanRowOut {
    line_id: String,
    production_date: String,
    allocated_cases: i64,
    used_headroom: i64,
    bumped_flexible: i64,
}

impl From<PlanRow> for PlanRowOut {
    fn from(p: PlanRow) -> Self {
        Self {
            line_id: p.line_id,
            production_date: http_common::date_to_iso(p.production_date),
            allocated_cases: p.allocated_cases,
            used_headroom: p.used_headroom,
            bumped_flexible: p.bumped_flexible,
        }
    }
}

#[derive(Serialize)]
struct ScenarioOut {
    can_fulfill: bool,
    allocated_total: i64,
    remaining: i64,
    plan_rows: Vec<PlanRowOut>,
    material_blockers: Vec<String>,
    capacity_blockers: Vec<String>,
    message: String,
}

impl From<ScenarioOutcome> for ScenarioOut {
    fn from(o: ScenarioOutcome) -> Self {
        Self {
            can_fulfill: o.can_fulfill,
            allocated_total: o.allocated_total,
            remaining: o.remaining,
            plan_rows: o.plan_rows.into_iter().map(Into::into).collect(),
            material_blockers: o.material_blockers,
            capacity_blockers: o.capacity_blockers,
            message: o.message,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn rows_json<R, O: Serialize + From<R>>(rows: Vec<R>) -> Response {
    Json(rows.into_iter().map(O::from).collect::<Vec<O>>()).into_response()
}

fn core_error_response(op: &'static str, e: CoreError) -> Response {
    match e {
        CoreError::Unavailable(msg) => {
            warn!(op, err = %msg, "data source unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(http_common::json_err("db_unavailable")),
            )
                .into_response()
        }
        other => {
            error!(op, err = ?other, "query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_err("internal")),
            )
                .into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(http_common::json_error_with_message("bad_request", message)),
    )
        .into_response()
}

async fn get_gantt(State(state): State<AppState>) -> Response {
    match state.service.gantt().await {
        Ok(rows) => rows_json::<_, GanttOut>(rows),
        Err(e) => core_error_response("gantt", e),
    }
}

async fn get_kpis(State(state): State<AppState>) -> Response {
    match state.service.kpis().await {
        Ok(kpis) => Json(KpisOut::from(kpis)).into_response(),
        Err(e) => core_error_response("kpis", e),
    }
}

async fn get_inventory(State(state): State<AppState>) -> Response {
    match state.service.inventory().await {
        Ok(rows) => rows_json::<_, InventoryOut>(rows),
        Err(e) => core_error_response("inventory", e),
    }
}

async fn get_inventory_summary(State(state): State<AppState>) -> Response {
    match state.service.inventory_summary().await {
        Ok(rows) => rows_json::<_, InventoryOut>(rows),
        Err(e) => core_error_response("inventory_summary", e),
    }
}

async fn get_dc_requests(State(state): State<AppState>) -> Response {
    match state.service.dc_requests().await {
        Ok(rows) => rows_json::<_, DcRequestOut>(rows),
        Err(e) => core_error_response("dc_requests", e),
    }
}

async fn get_dc_requests_summary(State(state): State<AppState>) -> Response {
    match state.service.dc_requests_summary().await {
        Ok(rows) => rows_json::<_, DcRequestOut>(rows),
        Err(e) => core_error_response("dc_requests_summary", e),
    }
}

#[derive(Debug, Deserialize)]
struct SimulateQuery {
    product_id: String,
    extra_cases: u32,
    due_date: NaiveDate,
}

async fn get_simulate(
    State(state): State<AppState>,
    query: Result<Query<SimulateQuery>, QueryRejection>,
) -> Response {
    let q = match query {
        Ok(Query(q)) => q,
        Err(rejection) => {
            let text = rejection.body_text();
            warn!(err = %text, "bad simulate query");
            return bad_request(&text);
        }
    };
    if q.product_id.trim().is_empty() {
        warn!("simulate without product_id");
        return bad_request("product_id must not be empty");
    }

    let request = ScenarioRequest {
        product_id: q.product_id,
        extra_cases: i64::from(q.extra_cases),
        due_date: q.due_date,
    };
    match state.service.simulate(&request).await {
        Ok(outcome) => {
            info!(
                product_id = %request.product_id,
                extra_cases = request.extra_cases,
                due_date = %request.due_date,
                can_fulfill = outcome.can_fulfill,
                "scenario simulated"
            );
            Json(ScenarioOut::from(outcome)).into_response()
        }
        Err(e) => core_error_response("simulate", e),
    }
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(http_common::json_err("not_found")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use clap::CommandFactory;
    use serde_json::Value;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
    use std::io::Write;
    use std::time::Duration;
    use tower::util::ServiceExt;

    const FIXTURE: &str = include_str!("../fixtures/sample_dataset.json");

    const ENDPOINTS: [&str; 6] = [
        "/api/gantt",
        "/api/kpis",
        "/api/inventory",
        "/api/inventory/summary",
        "/api/dc_requests",
        "/api/dc_requests/summary",
    ];

    fn memory_app() -> Router {
        let dataset: Dataset = serde_json::from_str(FIXTURE).unwrap();
        let repo = AnyRepo::Memory(Arc::new(InMemoryRepo::new(dataset)));
        build_router(AppState::new(repo), CorsLayer::permissive())
    }

    fn unreachable_app() -> Router {
        let opts = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .database("factory")
            .username("nobody")
            .password("nothing")
            .ssl_mode(PgSslMode::Disable);
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(300))
            .connect_lazy_with(opts);
        let repo = AnyRepo::Postgres(PgRepo::new(pool));
        build_router(AppState::new(repo), CorsLayer::permissive())
    }

    async fn fetch(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn endpoints_answer_from_memory_storage() {
        let app = memory_app();

        let (status, gantt) = fetch(&app, "/api/gantt").await;
        assert_eq!(status, StatusCode::OK);
        let gantt = gantt.as_array().unwrap();
        assert_eq!(gantt.len(), 8);
        assert_eq!(gantt[0]["line_id"], "L1");
        assert_eq!(gantt[0]["production_date"], "2025-03-03");
        assert_eq!(gantt[0]["product_name"], "Cola 12x330ml");
        assert_eq!(gantt[0]["is_firm"], true);
        assert_eq!(gantt[0]["hours_needed"], 11.25);

        let (status, kpis) = fetch(&app, "/api/kpis").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kpis["line_utilization"].as_array().unwrap().len(), 7);
        assert_eq!(kpis["line_utilization"][0]["date"], "2025-03-03");
        assert_eq!(kpis["line_utilization"][0]["total_cases"], 11000);
        assert_eq!(kpis["line_utilization"][0]["headroom_cases"], 1000);
        assert_eq!(kpis["flexible_slots_count"], 3);
        assert_eq!(kpis["pending_dc_requests"], 3);
        assert_eq!(kpis["active_lines"], 3);

        let (status, inventory) = fetch(&app, "/api/inventory").await;
        assert_eq!(status, StatusCode::OK);
        let inventory = inventory.as_array().unwrap();
        assert_eq!(inventory.len(), 4);
        assert_eq!(inventory[0]["material_id"], "MAT-CAN");
        assert_eq!(inventory[3]["supplier_lead_time_days"], Value::Null);
        assert_eq!(inventory[3]["on_hand_qty"], 1850.5);

        let (status, requests) = fetch(&app, "/api/dc_requests").await;
        assert_eq!(status, StatusCode::OK);
        let requests = requests.as_array().unwrap();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0]["request_id"], "1005");
        assert_eq!(requests[0]["request_datetime"], "2025-02-28T16:45:00.250000");
        assert_eq!(requests[0]["requested_due_date"], "2025-03-06");
        assert_eq!(requests[0]["promo_reason"], Value::Null);
        assert_eq!(requests[1]["promo_reason"], "Football final");
        assert_eq!(requests[4]["request_datetime"], "2025-02-24T08:15:00");
    }

    #[tokio::test]
    async fn summaries_pick_top_three() {
        let app = memory_app();

        let (status, inventory) = fetch(&app, "/api/inventory/summary").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = inventory
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["material_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["MAT-CAN", "MAT-PET", "MAT-LBL"]);

        let (status, requests) = fetch(&app, "/api/dc_requests/summary").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = requests
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["request_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["1005", "1004", "1002"]);
    }

    #[tokio::test]
    async fn repeated_calls_return_identical_bodies() {
        let app = memory_app();
        for uri in ENDPOINTS {
            let first = fetch(&app, uri).await;
            let second = fetch(&app, uri).await;
            assert_eq!(first, second, "{uri} changed between calls");
        }
    }

    #[tokio::test]
    async fn unreachable_database_returns_503() {
        let app = unreachable_app();
        for uri in ENDPOINTS {
            let (status, body) = fetch(&app, uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(body["error"]["code"], "db_unavailable");
        }
        let (status, _) = fetch(
            &app,
            "/api/simulate?product_id=SKU-100&extra_cases=10&due_date=2025-03-04",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn simulate_allocates_headroom_then_flexible_runs() {
        let app = memory_app();
        let (status, body) = fetch(
            &app,
            "/api/simulate?product_id=SKU-100&extra_cases=4000&due_date=2025-03-04",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["can_fulfill"], true);
        assert_eq!(body["allocated_total"], 4000);
        assert_eq!(body["remaining"], 0);
        let plan = body["plan_rows"].as_array().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0]["line_id"], "L1");
        assert_eq!(plan[0]["production_date"], "2025-03-03");
        assert_eq!(plan[0]["used_headroom"], 1000);
        assert_eq!(plan[0]["bumped_flexible"], 2000);
        assert_eq!(plan[1]["line_id"], "L3");
        assert_eq!(plan[1]["allocated_cases"], 1000);
        assert_eq!(
            body["message"],
            "We can produce all 4,000 cases by 2025-03-04 without impacting firm orders. Approved."
        );
    }

    #[tokio::test]
    async fn simulate_unknown_product_is_rejected_in_body() {
        let app = memory_app();
        let (status, body) = fetch(
            &app,
            "/api/simulate?product_id=SKU-999&extra_cases=10&due_date=2025-03-04",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["can_fulfill"], false);
        assert_eq!(body["message"], "No line can produce this SKU.");
    }

    #[tokio::test]
    async fn simulate_rejects_malformed_queries() {
        let app = memory_app();
        for uri in [
            "/api/simulate",
            "/api/simulate?product_id=SKU-100&extra_cases=10",
            "/api/simulate?product_id=SKU-100&extra_cases=-5&due_date=2025-03-04",
            "/api/simulate?product_id=SKU-100&extra_cases=10&due_date=03/04/2025",
            "/api/simulate?product_id=&extra_cases=10&due_date=2025-03-04",
        ] {
            let (status, body) = fetch(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"]["code"], "bad_request");
        }
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, body) = fetch(&memory_app(), "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let resp = memory_app()
            .oneshot(
                Request::builder()
                    .uri("/api/inventory")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn configured_origin_is_allowed() {
        let dataset: Dataset = serde_json::from_str(FIXTURE).unwrap();
        let repo = AnyRepo::Memory(Arc::new(InMemoryRepo::new(dataset)));
        let app = build_router(
            AppState::new(repo),
            cors_layer(&HeaderValue::from_static("https://dash.example.com")),
        );
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/kpis")
                    .header(header::ORIGIN, "https://dash.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://dash.example.com"
        );
    }

    #[tokio::test]
    async fn memory_storage_without_dataset_is_empty() {
        let repo = AnyRepo::build(&Storage::Memory { dataset_path: None }).unwrap();
        let app = build_router(AppState::new(repo), CorsLayer::permissive());
        let (status, body) = fetch(&app, "/api/gantt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Array(vec![]));
    }

    #[test]
    fn dataset_file_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let dataset = load_dataset(file.path()).unwrap();
        assert_eq!(dataset.lines.len(), 3);
        assert_eq!(dataset.dc_requests.len(), 5);
    }

    #[test]
    fn bad_dataset_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"lines\": 42}").unwrap();
        let err = load_dataset(file.path()).unwrap_err();
        assert_eq!(err.field, "MEMORY_DATASET_PATH");

        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.message.contains("Cannot read"));
    }

    // One test: the env file is applied to the process environment.
    #[test]
    fn reload_reads_env_file() {
        let dir = tempfile::tempdir().unwrap();

        let bogus = dir.path().join("bogus.env");
        std::fs::write(&bogus, "STORAGE_PROVIDER=bogus\n").unwrap();
        let err = reload(Some(&bogus)).err().expect("unknown provider accepted");
        assert_eq!(err.field, "STORAGE_PROVIDER");

        let dataset = dir.path().join("dataset.json");
        std::fs::write(&dataset, FIXTURE).unwrap();
        let memory = dir.path().join("memory.env");
        std::fs::write(
            &memory,
            format!(
                "STORAGE_PROVIDER=memory\nMEMORY_DATASET_PATH={}\n",
                dataset.display()
            ),
        )
        .unwrap();
        let (cfg, repo) = reload(Some(&memory)).unwrap();
        assert_eq!(cfg.storage.name(), "memory");
        assert!(matches!(repo, AnyRepo::Memory(_)));

        let err = reload(Some(&dir.path().join("missing.env")))
            .err()
            .expect("missing env file accepted");
        assert_eq!(err.field, "DOTENV");
    }

    #[test]
    fn cli_parses_bind_address_and_reload() {
        Cli::command().debug_assert();
        let cli =
            Cli::try_parse_from(["api-server", "--host", "127.0.0.1", "--port", "9000", "--reload"])
                .unwrap();
        assert_eq!(cli.socket_addr(), "127.0.0.1:9000".parse().unwrap());
        assert!(cli.reload);

        assert!(Cli::try_parse_from(["api-server", "--port", "not-a-port"]).is_err());
    }
}
