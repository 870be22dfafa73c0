//! SQL text for the dashboard reads.

pub const GANTT: &str = r#"
SELECT
    s.line_id::text AS line_id,
    l.line_name::text AS line_name,
    s.production_date::date AS production_date,
    s.product_id::text AS product_id,
    p.product_name::text AS product_name,
    s.planned_qty_cases::bigint AS planned_qty_cases,
    COALESCE(s.is_firm, false) AS is_firm,
    lc.rate_cases_per_hour::bigint AS rate_cases_per_hour,
    (s.planned_qty_cases::decimal / lc.rate_cases_per_hour::decimal)::float8 AS hours_needed
FROM schedule s
JOIN products p ON p.product_id = s.product_id
JOIN lines l ON l.line_id = s.line_id
JOIN line_capability lc
  ON lc.line_id = s.line_id
 AND lc.product_id = s.product_id
ORDER BY s.production_date, s.line_id
"#;

pub const LINE_UTILIZATION: &str = r#"
SELECT
    s.line_id::text AS line_id,
    l.line_name::text AS line_name,
    s.production_date::date AS production_date,
    SUM(s.planned_qty_cases)::bigint AS total_cases,
    l.daily_capacity_cases::bigint AS daily_capacity_cases,
    ((SUM(s.planned_qty_cases)::decimal / l.daily_capacity_cases::decimal) * 100)::float8 AS utilization_pct,
    (l.daily_capacity_cases - SUM(s.planned_qty_cases))::bigint AS headroom_cases
FROM schedule s
JOIN lines l ON l.line_id = s.line_id
GROUP BY s.line_id, l.line_name, s.production_date, l.daily_capacity_cases
ORDER BY s.production_date, s.line_id
"#;

pub const FLEXIBLE_SLOT_COUNT: &str = "SELECT COUNT(*) FROM schedule WHERE is_firm = false";

pub const DC_REQUEST_COUNT_BY_STATUS: &str = "SELECT COUNT(*) FROM dc_requests WHERE status = $1";

pub const INVENTORY: &str = r#"
SELECT
    m.material_id::text AS material_id,
    m.material_name::text AS material_name,
    m.uom::text AS uom,
    m.supplier_lead_time_days::bigint AS supplier_lead_time_days,
    i.on_hand_qty::float8 AS on_hand_qty
FROM materials m
JOIN inventory_materials i
  ON i.material_id = m.material_id
ORDER BY m.material_id
"#;

pub const INVENTORY_BY_LEAD_TIME: &str = r#"
SELECT
    m.material_id::text AS material_id,
    m.material_name::text AS material_name,
    m.uom::text AS uom,
    m.supplier_lead_time_days::bigint AS supplier_lead_time_days,
    i.on_hand_qty::float8 AS on_hand_qty
FROM materials m
JOIN inventory_materials i
  ON i.material_id = m.material_id
ORDER BY m.supplier_lead_time_days DESC NULLS LAST
LIMIT $1
"#;

pub const RECENT_DC_REQUESTS: &str = r#"
SELECT
    r.request_id::text AS request_id,
    r.dc_id::text AS dc_id,
    r.request_datetime::timestamp AS request_datetime,
    r.product_id::text AS product_id,
    p.product_name::text AS product_name,
    r.requested_qty_cases::bigint AS requested_qty_cases,
    r.requested_due_date::date AS requested_due_date,
    r.promo_reason::text AS promo_reason,
    r.status::text AS status
FROM dc_requests r
JOIN products p ON p.product_id = r.product_id
ORDER BY r.request_datetime DESC
LIMIT $1
"#;

pub const RECENT_DC_REQUESTS_WITH_STATUS: &str = r#"
SELECT
    r.request_id::text AS request_id,
    r.dc_id::text AS dc_id,
    r.request_datetime::timestamp AS request_datetime,
    r.product_id::text AS product_id,
    p.product_name::text AS product_name,
    r.requested_qty_cases::bigint AS requested_qty_cases,
    r.requested_due_date::date AS requested_due_date,
    r.promo_reason::text AS promo_reason,
    r.status::text AS status
FROM dc_requests r
JOIN products p ON p.product_id = r.product_id
WHERE r.status IN ($1, $2)
ORDER BY r.request_datetime DESC
LIMIT $3
"#;

pub const MASTER_SCHEDULE: &str = r#"
SELECT
    s.line_id::text AS line_id,
    s.production_date::date AS production_date,
    s.product_id::text AS product_id,
    s.planned_qty_cases::bigint AS planned_qty_cases,
    COALESCE(s.is_firm, false) AS is_firm
FROM schedule s
"#;

pub const MASTER_LINES: &str = r#"
SELECT
    line_id::text AS line_id,
    line_name::text AS line_name,
    daily_capacity_cases::bigint AS daily_capacity_cases
FROM lines
"#;

pub const MASTER_CAPABILITY: &str = r#"
SELECT
    line_id::text AS line_id,
    product_id::text AS product_id,
    rate_cases_per_hour::bigint AS rate_cases_per_hour
FROM line_capability
"#;

pub const MASTER_BOM: &str = r#"
SELECT
    b.product_id::text AS product_id,
    b.material_id::text AS material_id,
    b.qty_per_case::float8 AS qty_per_case,
    m.material_name::text AS material_name,
    m.supplier_lead_time_days::bigint AS supplier_lead_time_days
FROM bill_of_materials b
JOIN materials m ON m.material_id = b.material_id
"#;

pub const MASTER_INVENTORY: &str = r#"
SELECT
    i.material_id::text AS material_id,
    i.on_hand_qty::float8 AS on_hand_qty
FROM inventory_materials i
"#;
