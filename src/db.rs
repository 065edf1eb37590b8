use crate::entities::{BankEntry, Route, ShipCompliance, ShipReport};
use crate::error::{ComplianceError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Route as it arrives from ingestion (no row id yet)
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewRoute {
    pub route_id: String,
    pub vessel_type: String,
    pub fuel_type: String,
    pub year: i32,
    pub ghg_intensity: f64,
    pub fuel_consumption: f64,
    pub distance: f64,
    pub total_emissions: f64,
    #[serde(default)]
    pub is_baseline: bool,
}

/// Event for audit trail: every baseline change, compliance record and
/// banking movement leaves one behind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub skipped: usize,
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file, ready for concurrent writers.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = connect(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Another handle on a database whose schema is already in place.
pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS routes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_id TEXT NOT NULL,
            vessel_type TEXT NOT NULL,
            fuel_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            ghg_intensity REAL NOT NULL,
            fuel_consumption REAL NOT NULL,
            distance REAL NOT NULL,
            total_emissions REAL NOT NULL,
            is_baseline INTEGER NOT NULL DEFAULT 0,
            UNIQUE (route_id, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ship_compliance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ship_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            cb_gco2eq REAL NOT NULL,
            UNIQUE (ship_id, year)
        )",
        [],
    )?;

    // Append-only: rows are inserted by the ledger and never updated
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bank_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ship_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            amount_gco2eq REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================

    // At most one baseline per year, whatever writes the table
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_routes_single_baseline
         ON routes(year) WHERE is_baseline = 1",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_entries_ship ON bank_entries(ship_id, id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW NORMALIZATION
// Numeric columns may hold INTEGER, REAL or TEXT depending on who wrote them.
// Everything leaves this module as f64 / i32 / bool.
// ============================================================================

fn numeric(row: &Row, idx: usize) -> rusqlite::Result<f64> {
    match row.get_ref(idx)? {
        ValueRef::Real(v) => Ok(v),
        ValueRef::Integer(v) => Ok(v as f64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "numeric".to_string(), Type::Text)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "numeric".to_string(),
            other.data_type(),
        )),
    }
}

fn int_year(row: &Row, idx: usize) -> rusqlite::Result<i32> {
    match row.get_ref(idx)? {
        ValueRef::Integer(v) => i32::try_from(v)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, v)),
        ValueRef::Real(v) if v.fract() == 0.0 => Ok(v as i32),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "year".to_string(), Type::Text)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "year".to_string(),
            other.data_type(),
        )),
    }
}

fn flag(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    match row.get_ref(idx)? {
        ValueRef::Integer(v) => Ok(v != 0),
        ValueRef::Text(bytes) => Ok(matches!(bytes, b"1" | b"true" | b"TRUE" | b"t")),
        ValueRef::Null => Ok(false),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "flag".to_string(),
            other.data_type(),
        )),
    }
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const ROUTE_COLUMNS: &str = "id, route_id, vessel_type, fuel_type, year, ghg_intensity,
    fuel_consumption, distance, total_emissions, is_baseline";

fn map_route(row: &Row) -> rusqlite::Result<Route> {
    Ok(Route {
        id: row.get(0)?,
        route_id: row.get(1)?,
        vessel_type: row.get(2)?,
        fuel_type: row.get(3)?,
        year: int_year(row, 4)?,
        ghg_intensity: numeric(row, 5)?,
        fuel_consumption: numeric(row, 6)?,
        distance: numeric(row, 7)?,
        total_emissions: numeric(row, 8)?,
        is_baseline: flag(row, 9)?,
    })
}

fn map_compliance(row: &Row) -> rusqlite::Result<ShipCompliance> {
    Ok(ShipCompliance {
        id: row.get(0)?,
        ship_id: row.get(1)?,
        year: int_year(row, 2)?,
        cb_gco2eq: numeric(row, 3)?,
    })
}

fn map_bank_entry(row: &Row) -> rusqlite::Result<BankEntry> {
    Ok(BankEntry {
        id: row.get(0)?,
        ship_id: row.get(1)?,
        year: int_year(row, 2)?,
        amount_gco2eq: numeric(row, 3)?,
        created_at: timestamp(row, 4)?,
    })
}

// ============================================================================
// INGESTION
// ============================================================================

pub fn load_routes_csv(csv_path: &Path) -> anyhow::Result<Vec<NewRoute>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open routes CSV file")?;

    let mut routes = Vec::new();
    for result in rdr.deserialize() {
        let route: NewRoute = result.context("Failed to deserialize route")?;
        routes.push(route);
    }

    Ok(routes)
}

pub fn load_ship_reports_csv(csv_path: &Path) -> anyhow::Result<Vec<ShipReport>> {
    let mut rdr =
        csv::Reader::from_path(csv_path).context("Failed to open ship reports CSV file")?;

    let mut reports = Vec::new();
    for result in rdr.deserialize() {
        let report: ShipReport = result.context("Failed to deserialize ship report")?;
        reports.push(report);
    }

    Ok(reports)
}

/// Insert routes, skipping rows that collide with an existing route_id+year
/// or with an existing baseline of the same year.
pub fn insert_routes(conn: &Connection, routes: &[NewRoute]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for route in routes {
        let result = conn.execute(
            "INSERT INTO routes (
                route_id, vessel_type, fuel_type, year, ghg_intensity,
                fuel_consumption, distance, total_emissions, is_baseline
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                route.route_id,
                route.vessel_type,
                route.fuel_type,
                route.year,
                route.ghg_intensity,
                route.fuel_consumption,
                route.distance,
                route.total_emissions,
                route.is_baseline,
            ],
        );

        match result {
            Ok(_) => stats.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(route_id = %route.route_id, year = route.year, "route skipped");
                stats.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(inserted = stats.inserted, skipped = stats.skipped, "routes imported");
    Ok(stats)
}

// ============================================================================
// ROUTES
// ============================================================================

pub fn list_routes(conn: &Connection) -> Result<Vec<Route>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM routes ORDER BY year, route_id",
        ROUTE_COLUMNS
    ))?;

    let routes = stmt
        .query_map([], map_route)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(routes)
}

/// All routes carrying `route_id`, one per year
pub fn find_routes_by_route_id(conn: &Connection, route_id: &str) -> Result<Vec<Route>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM routes WHERE route_id = ?1 ORDER BY year",
        ROUTE_COLUMNS
    ))?;

    let routes = stmt
        .query_map([route_id], map_route)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(routes)
}

pub fn find_baseline(conn: &Connection, year: i32) -> Result<Option<Route>> {
    let route = conn
        .query_row(
            &format!(
                "SELECT {} FROM routes WHERE year = ?1 AND is_baseline = 1",
                ROUTE_COLUMNS
            ),
            [year],
            map_route,
        )
        .optional()?;

    Ok(route)
}

/// Clear the current baseline of the route's year, then mark `route`.
/// Callers run this inside one transaction.
pub fn set_baseline_route(conn: &Connection, route: &Route) -> Result<()> {
    conn.execute(
        "UPDATE routes SET is_baseline = 0 WHERE year = ?1 AND id != ?2 AND is_baseline = 1",
        params![route.year, route.id],
    )?;

    let updated = conn.execute(
        "UPDATE routes SET is_baseline = 1 WHERE id = ?1",
        params![route.id],
    )?;

    if updated == 0 {
        return Err(ComplianceError::not_found(format!(
            "route {} ({})",
            route.route_id, route.year
        )));
    }

    Ok(())
}

pub fn count_routes(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// COMPLIANCE SNAPSHOTS
// ============================================================================

pub fn list_compliance_snapshots(conn: &Connection) -> Result<Vec<ShipCompliance>> {
    let mut stmt = conn.prepare(
        "SELECT id, ship_id, year, cb_gco2eq
         FROM ship_compliance
         ORDER BY ship_id, year",
    )?;

    let snapshots = stmt
        .query_map([], map_compliance)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(snapshots)
}

pub fn find_compliance(conn: &Connection, ship_id: &str, year: i32) -> Result<Option<ShipCompliance>> {
    let snapshot = conn
        .query_row(
            "SELECT id, ship_id, year, cb_gco2eq
             FROM ship_compliance
             WHERE ship_id = ?1 AND year = ?2",
            params![ship_id, year],
            map_compliance,
        )
        .optional()?;

    Ok(snapshot)
}

/// Store the computed balance of a ship/year, replacing an older snapshot.
pub fn upsert_compliance(conn: &Connection, ship_id: &str, year: i32, cb_gco2eq: f64) -> Result<ShipCompliance> {
    conn.execute(
        "INSERT INTO ship_compliance (ship_id, year, cb_gco2eq)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (ship_id, year) DO UPDATE SET cb_gco2eq = excluded.cb_gco2eq",
        params![ship_id, year, cb_gco2eq],
    )?;

    find_compliance(conn, ship_id, year)?.ok_or_else(|| {
        ComplianceError::Unexpected(format!("snapshot {} / {} vanished after write", ship_id, year))
    })
}

// ============================================================================
// BANK ENTRIES
// ============================================================================

/// Entries in creation order, optionally for one ship
pub fn list_bank_entries(conn: &Connection, ship_id: Option<&str>) -> Result<Vec<BankEntry>> {
    let entries = match ship_id {
        Some(ship) => {
            let mut stmt = conn.prepare(
                "SELECT id, ship_id, year, amount_gco2eq, created_at
                 FROM bank_entries
                 WHERE ship_id = ?1
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([ship], map_bank_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, ship_id, year, amount_gco2eq, created_at
                 FROM bank_entries
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], map_bank_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(entries)
}

pub fn append_bank_entry(conn: &Connection, ship_id: &str, year: i32, amount_gco2eq: f64) -> Result<BankEntry> {
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO bank_entries (ship_id, year, amount_gco2eq, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![ship_id, year, amount_gco2eq, created_at.to_rfc3339()],
    )?;

    Ok(BankEntry {
        id: conn.last_insert_rowid(),
        ship_id: ship_id.to_string(),
        year,
        amount_gco2eq,
        created_at,
    })
}

pub fn count_bank_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM bank_entries", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
