// 🧭 Application services - one method per use case
//
// Every mutation runs in a single BEGIN IMMEDIATE transaction: the store's
// write lock is taken first, the current state is re-read under it, the
// derived row is written, then commit. Returning early on any error drops
// the transaction, which rolls it back, so no partial entry survives.

use crate::calculator::ComplianceCalculator;
use crate::comparison::{ComparisonEngine, ComparisonRow};
use crate::db::{self, Event, ImportStats, NewRoute};
use crate::entities::{BankEntry, BankRecord, PoolStatus, Route, ShipCompliance, ShipReport};
use crate::error::{ComplianceError, Result};
use crate::ledger::ShipLedger;
use rusqlite::{Connection, TransactionBehavior};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const LEDGER_ACTOR: &str = "banking_ledger";
const ROUTES_ACTOR: &str = "routes_service";
const COMPLIANCE_ACTOR: &str = "compliance_calculator";

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

pub fn validate_ship_id(ship_id: &str) -> Result<&str> {
    let trimmed = ship_id.trim();
    if trimmed.is_empty() {
        return Err(ComplianceError::validation("shipId must not be empty"));
    }
    Ok(trimmed)
}

pub fn validate_year(year: i32) -> Result<i32> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ComplianceError::validation(format!(
            "year {} is outside {}..={}",
            year, MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(year)
}

/// Where a service gets its connections from
#[derive(Clone)]
enum Store {
    /// One connection shared by every call (in-memory databases, embedding)
    Shared(Arc<Mutex<Connection>>),
    /// A fresh connection per call; SQLite locking serialises the writers
    File(Arc<PathBuf>),
}

/// Connection borrowed for a single call
pub enum ConnHandle<'a> {
    Locked(MutexGuard<'a, Connection>),
    Owned(Connection),
}

impl Deref for ConnHandle<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ConnHandle::Locked(guard) => guard,
            ConnHandle::Owned(conn) => conn,
        }
    }
}

impl DerefMut for ConnHandle<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        match self {
            ConnHandle::Locked(guard) => guard,
            ConnHandle::Owned(conn) => conn,
        }
    }
}

#[derive(Clone)]
pub struct ComplianceService {
    store: Store,
    calculator: ComplianceCalculator,
}

impl ComplianceService {
    pub fn new(conn: Connection) -> Self {
        Self::with_calculator(conn, ComplianceCalculator::new())
    }

    pub fn with_calculator(conn: Connection, calculator: ComplianceCalculator) -> Self {
        ComplianceService {
            store: Store::Shared(Arc::new(Mutex::new(conn))),
            calculator,
        }
    }

    /// File-backed service: the schema is set up once, then every call opens
    /// its own connection so reads and other ships never wait on a lock here.
    pub fn open(path: &Path) -> Result<Self> {
        db::open_database(path)?;
        Ok(ComplianceService {
            store: Store::File(Arc::new(path.to_path_buf())),
            calculator: ComplianceCalculator::new(),
        })
    }

    pub fn calculator(&self) -> &ComplianceCalculator {
        &self.calculator
    }

    fn conn(&self) -> Result<ConnHandle<'_>> {
        match &self.store {
            Store::Shared(shared) => shared.lock().map(ConnHandle::Locked).map_err(|e| {
                ComplianceError::Unexpected(format!("database lock poisoned: {}", e))
            }),
            Store::File(path) => Ok(ConnHandle::Owned(db::connect(path)?)),
        }
    }

    // ========================================================================
    // ROUTES
    // ========================================================================

    pub fn list_routes(&self) -> Result<Vec<Route>> {
        let conn = self.conn()?;
        db::list_routes(&conn)
    }

    pub fn import_routes(&self, routes: &[NewRoute]) -> Result<ImportStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stats = db::insert_routes(&tx, routes)?;
        tx.commit()?;
        Ok(stats)
    }

    /// Make `route_id` the baseline of its year. `year` is required only
    /// when the route id is reported in more than one year.
    pub fn set_baseline(&self, route_id: &str, year: Option<i32>) -> Result<Route> {
        let route_id = route_id.trim();
        if route_id.is_empty() {
            return Err(ComplianceError::validation("routeId must not be empty"));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut candidates = db::find_routes_by_route_id(&tx, route_id)?;
        let route = match year {
            Some(year) => candidates.into_iter().find(|route| route.same_route(route_id, year)),
            None if candidates.len() > 1 => {
                let years: Vec<String> = candidates.iter().map(|r| r.year.to_string()).collect();
                return Err(ComplianceError::validation(format!(
                    "route {} exists in years {}; specify a year",
                    route_id,
                    years.join(", ")
                )));
            }
            None => candidates.pop(),
        }
        .ok_or_else(|| ComplianceError::not_found(format!("route {}", route_id)))?;

        let previous = db::find_baseline(&tx, route.year)?;
        db::set_baseline_route(&tx, &route)?;
        db::insert_event(
            &tx,
            &Event::new(
                "baseline_set",
                "route",
                &route.route_id,
                serde_json::json!({
                    "year": route.year,
                    "previous": previous.map(|r| r.route_id),
                }),
                ROUTES_ACTOR,
            ),
        )?;
        tx.commit()?;

        info!(route_id = %route.route_id, year = route.year, "baseline set");
        Ok(Route {
            is_baseline: true,
            ..route
        })
    }

    /// Comparison for one year, or for every year that has a baseline.
    pub fn comparison(&self, year: Option<i32>) -> Result<Vec<ComparisonRow>> {
        let routes = self.list_routes()?;
        let schedule = &self.calculator.schedule;

        match year {
            Some(year) => ComparisonEngine::compare(&routes, year, schedule.target_for(year)),
            None => {
                let mut years: Vec<i32> = routes
                    .iter()
                    .filter(|route| route.is_baseline)
                    .map(|route| route.year)
                    .collect();
                years.sort_unstable();
                years.dedup();

                if years.is_empty() {
                    return Err(ComplianceError::not_found("no baseline route set for any year"));
                }

                ComparisonEngine::compare_years(&routes, &years, |y| schedule.target_for(y))
            }
        }
    }

    // ========================================================================
    // COMPLIANCE
    // ========================================================================

    pub fn list_compliance(&self) -> Result<Vec<ShipCompliance>> {
        let conn = self.conn()?;
        db::list_compliance_snapshots(&conn)
    }

    /// Compute the compliance balance of a report and store it as the
    /// ship/year snapshot.
    pub fn record_compliance(&self, report: &ShipReport) -> Result<ShipCompliance> {
        validate_year(report.year)?;
        let ship_id = validate_ship_id(&report.ship_id)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let baseline = db::find_baseline(&tx, report.year)?;
        let cb = self.calculator.compute(report, baseline.as_ref())?;
        let snapshot = db::upsert_compliance(&tx, ship_id, report.year, cb)?;

        db::insert_event(
            &tx,
            &Event::new(
                "compliance_recorded",
                "ship",
                ship_id,
                serde_json::json!({
                    "year": report.year,
                    "ghgIntensity": report.ghg_intensity,
                    "fuelConsumption": report.fuel_consumption,
                    "cbGco2eq": cb,
                }),
                COMPLIANCE_ACTOR,
            ),
        )?;
        tx.commit()?;

        info!(ship_id, year = report.year, cb, "compliance recorded");
        Ok(snapshot)
    }

    /// Record a batch of reports; rejected reports are logged and counted.
    pub fn import_ship_reports(&self, reports: &[ShipReport]) -> Result<ImportStats> {
        let mut stats = ImportStats::default();

        for report in reports {
            match self.record_compliance(report) {
                Ok(_) => stats.inserted += 1,
                Err(err) if !err.is_internal() => {
                    warn!(ship_id = %report.ship_id, year = report.year, error = %err, "report skipped");
                    stats.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(stats)
    }

    // ========================================================================
    // BANKING
    // ========================================================================

    pub fn get_balance(&self, ship_id: &str, year: i32) -> Result<BankRecord> {
        let ship_id = validate_ship_id(ship_id)?;
        validate_year(year)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let snapshot = db::find_compliance(&tx, ship_id, year)?
            .ok_or_else(|| missing_compliance(ship_id, year))?;
        let ledger = ShipLedger::replay(ship_id, &db::list_bank_entries(&tx, Some(ship_id))?);
        tx.commit()?;

        Ok(ledger.record(snapshot.cb_gco2eq, year))
    }

    pub fn get_pool(&self, ship_id: &str, year: i32) -> Result<PoolStatus> {
        let ship_id = validate_ship_id(ship_id)?;
        validate_year(year)?;

        let conn = self.conn()?;
        let ledger = ShipLedger::replay(ship_id, &db::list_bank_entries(&conn, Some(ship_id))?);
        Ok(ledger.pool_status(year))
    }

    /// Move the whole surplus of `year` into the ship's banked pool.
    pub fn bank_surplus(&self, ship_id: &str, year: i32) -> Result<BankRecord> {
        self.mutate_ledger(ship_id, year, "surplus_banked", |ledger, raw_cb| {
            ledger.plan_bank(raw_cb, year)
        })
    }

    /// Offset the deficit of `year` with the oldest eligible banked surplus.
    pub fn apply_banked_surplus(&self, ship_id: &str, year: i32) -> Result<BankRecord> {
        self.mutate_ledger(ship_id, year, "surplus_applied", |ledger, raw_cb| {
            ledger.plan_apply(raw_cb, year)
        })
    }

    fn mutate_ledger<F>(&self, ship_id: &str, year: i32, event_type: &str, plan: F) -> Result<BankRecord>
    where
        F: FnOnce(&ShipLedger, f64) -> Result<f64>,
    {
        let ship_id = validate_ship_id(ship_id)?;
        validate_year(year)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let snapshot = db::find_compliance(&tx, ship_id, year)?
            .ok_or_else(|| missing_compliance(ship_id, year))?;
        let mut ledger = ShipLedger::replay(ship_id, &db::list_bank_entries(&tx, Some(ship_id))?);

        let amount = plan(&ledger, snapshot.cb_gco2eq).map_err(|err| {
            warn!(ship_id, year, event_type, error = %err, "ledger mutation rejected");
            err
        })?;

        let entry = db::append_bank_entry(&tx, ship_id, year, amount)?;
        db::insert_event(
            &tx,
            &Event::new(
                event_type,
                "ship",
                ship_id,
                serde_json::json!({
                    "year": year,
                    "amountGco2eq": amount,
                    "entryId": entry.id,
                }),
                LEDGER_ACTOR,
            ),
        )?;
        tx.commit()?;

        debug!(entry_id = entry.id, "bank entry appended");
        ledger.push(entry);
        let record = ledger.record(snapshot.cb_gco2eq, year);

        info!(ship_id, year, amount, balance = record.balance, event_type, "ledger updated");
        Ok(record)
    }

    /// All entries in creation order, optionally for one ship
    pub fn list_bank_entries(&self, ship_id: Option<&str>) -> Result<Vec<BankEntry>> {
        let ship_id = ship_id.map(validate_ship_id).transpose()?;
        let conn = self.conn()?;
        db::list_bank_entries(&conn, ship_id)
    }

    /// History of one ship, by year then insertion order
    pub fn list_history(&self, ship_id: &str) -> Result<Vec<BankEntry>> {
        let ship_id = validate_ship_id(ship_id)?;
        let conn = self.conn()?;
        let ledger = ShipLedger::replay(ship_id, &db::list_bank_entries(&conn, Some(ship_id))?);
        Ok(ledger.history())
    }

    /// Audit trail of one ship
    pub fn ship_events(&self, ship_id: &str) -> Result<Vec<Event>> {
        let ship_id = validate_ship_id(ship_id)?;
        let conn = self.conn()?;
        db::get_events_for_entity(&conn, "ship", ship_id)
    }
}

fn missing_compliance(ship_id: &str, year: i32) -> ComplianceError {
    ComplianceError::not_found(format!("compliance record for ship {} in {}", ship_id, year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::TargetSchedule;
    use crate::db::tests::new_route;
    use std::sync::Barrier;
    use std::thread;

    fn service() -> ComplianceService {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        ComplianceService::new(conn)
    }

    fn seed_snapshot(service: &ComplianceService, ship: &str, year: i32, cb: f64) {
        let conn = service.conn().unwrap();
        db::upsert_compliance(&conn, ship, year, cb).unwrap();
    }

    fn entry_count(service: &ComplianceService) -> i64 {
        let conn = service.conn().unwrap();
        db::count_bank_entries(&conn).unwrap()
    }

    fn seed_routes(service: &ComplianceService) {
        service
            .import_routes(&[
                new_route("R001", 2024, 91.0, true),
                new_route("R002", 2024, 88.0, false),
                new_route("R003", 2024, 93.5, false),
                new_route("R004", 2025, 89.2, true),
                new_route("R005", 2025, 90.5, false),
            ])
            .unwrap();
    }

    // ------------------------------------------------------------------------
    // banking
    // ------------------------------------------------------------------------

    #[test]
    fn test_bank_then_apply_scenario() {
        let service = service();
        seed_snapshot(&service, "S1", 2024, 500.0);
        seed_snapshot(&service, "S1", 2025, -300.0);

        let banked = service.bank_surplus("S1", 2024).unwrap();
        assert_eq!(banked.balance, 0.0);
        assert_eq!(service.get_balance("S1", 2024).unwrap().balance, 0.0);

        let entries = service.list_bank_entries(Some("S1")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount_gco2eq, 500.0);

        let applied = service.apply_banked_surplus("S1", 2025).unwrap();
        assert_eq!(applied.balance, 0.0);
        assert_eq!(service.get_balance("S1", 2025).unwrap().balance, 0.0);

        let entries = service.list_bank_entries(Some("S1")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].amount_gco2eq, -300.0);
        assert_eq!(entries[1].year, 2025);

        assert_eq!(service.get_pool("S1", 2025).unwrap().available, 200.0);

        println!("✅ Bank/apply scenario passed");
    }

    #[test]
    fn test_second_bank_is_rejected_without_new_entry() {
        let service = service();
        seed_snapshot(&service, "S1", 2024, 500.0);

        service.bank_surplus("S1", 2024).unwrap();
        let err = service.bank_surplus("S1", 2024).unwrap_err();

        assert!(matches!(err, ComplianceError::InvalidState(_)));
        assert_eq!(entry_count(&service), 1);
    }

    #[test]
    fn test_apply_with_empty_pool_writes_nothing() {
        let service = service();
        seed_snapshot(&service, "S1", 2025, -300.0);

        let err = service.apply_banked_surplus("S1", 2025).unwrap_err();

        assert!(matches!(err, ComplianceError::InvalidState(_)));
        assert_eq!(entry_count(&service), 0);
        assert!(service.ship_events("S1").unwrap().is_empty());
        assert_eq!(service.get_balance("S1", 2025).unwrap().balance, -300.0);
    }

    #[test]
    fn test_missing_compliance_record_is_not_found() {
        let service = service();

        assert!(matches!(
            service.get_balance("S9", 2024),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(matches!(
            service.bank_surplus("S9", 2024),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(matches!(
            service.apply_banked_surplus("S9", 2024),
            Err(ComplianceError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_input_is_validation_error() {
        let service = service();

        assert!(matches!(
            service.bank_surplus("  ", 2024),
            Err(ComplianceError::Validation(_))
        ));
        assert!(matches!(
            service.get_balance("S1", 20240),
            Err(ComplianceError::Validation(_))
        ));
        assert!(matches!(
            service.list_history(""),
            Err(ComplianceError::Validation(_))
        ));
    }

    #[test]
    fn test_later_surplus_cannot_cover_earlier_deficit() {
        let service = service();
        seed_snapshot(&service, "S1", 2024, -300.0);
        seed_snapshot(&service, "S1", 2025, 800.0);

        service.bank_surplus("S1", 2025).unwrap();

        let err = service.apply_banked_surplus("S1", 2024).unwrap_err();
        assert!(matches!(err, ComplianceError::InvalidState(_)));
        assert_eq!(service.get_pool("S1", 2024).unwrap().available, 0.0);
        assert_eq!(service.get_pool("S1", 2025).unwrap().available, 800.0);
    }

    #[test]
    fn test_balances_recompute_from_history() {
        let service = service();
        let raw = [(2023, 400.0), (2024, 100.0), (2025, -450.0), (2026, -200.0)];
        for (year, cb) in raw {
            seed_snapshot(&service, "S1", year, cb);
        }

        service.bank_surplus("S1", 2023).unwrap();
        service.bank_surplus("S1", 2024).unwrap();
        service.apply_banked_surplus("S1", 2025).unwrap();
        service.apply_banked_surplus("S1", 2026).unwrap();

        let history = service.list_history("S1").unwrap();
        for (year, cb) in raw {
            let moved: f64 = history
                .iter()
                .filter(|e| e.year == year)
                .map(|e| e.amount_gco2eq)
                .sum();
            assert_eq!(service.get_balance("S1", year).unwrap().balance, cb - moved);
        }

        // 500 banked, 450 to 2025, the last 50 to 2026
        assert_eq!(service.get_balance("S1", 2025).unwrap().balance, 0.0);
        assert_eq!(service.get_balance("S1", 2026).unwrap().balance, -150.0);
        assert_eq!(service.get_pool("S1", 2026).unwrap().available, 0.0);
    }

    #[test]
    fn test_history_is_ordered_by_year() {
        let service = service();
        seed_snapshot(&service, "S1", 2025, 50.0);
        seed_snapshot(&service, "S1", 2023, 70.0);
        seed_snapshot(&service, "S2", 2023, 10.0);

        service.bank_surplus("S1", 2025).unwrap();
        service.bank_surplus("S2", 2023).unwrap();
        service.bank_surplus("S1", 2023).unwrap();

        let years: Vec<i32> = service
            .list_history("S1")
            .unwrap()
            .iter()
            .map(|e| e.year)
            .collect();
        assert_eq!(years, vec![2023, 2025]);
        assert_eq!(service.list_bank_entries(None).unwrap().len(), 3);
    }

    #[test]
    fn test_banking_leaves_audit_events() {
        let service = service();
        seed_snapshot(&service, "S1", 2024, 500.0);
        seed_snapshot(&service, "S1", 2025, -100.0);

        service.bank_surplus("S1", 2024).unwrap();
        service.apply_banked_surplus("S1", 2025).unwrap();

        let events = service.ship_events("S1").unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["surplus_banked", "surplus_applied"]);
        assert_eq!(events[1].data["amountGco2eq"], -100.0);
    }

    #[test]
    fn test_failed_mutation_rolls_back_entry() {
        let service = service();
        seed_snapshot(&service, "S1", 2024, 500.0);

        // audit insert fails after the entry was appended
        service
            .conn()
            .unwrap()
            .execute("DROP TABLE events", [])
            .unwrap();

        let err = service.bank_surplus("S1", 2024).unwrap_err();
        assert!(err.is_internal());
        assert_eq!(entry_count(&service), 0);
        assert_eq!(service.get_balance("S1", 2024).unwrap().balance, 500.0);
    }

    #[test]
    fn test_concurrent_bank_calls_move_surplus_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let setup = ComplianceService::new(db::open_database(&path).unwrap());
        seed_snapshot(&setup, "S1", 2024, 500.0);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let service = ComplianceService::new(db::open_database(&path).unwrap());
                    barrier.wait();
                    service.bank_surplus("S1", 2024)
                })
            })
            .collect();

        let results: Vec<Result<BankRecord>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(ComplianceError::InvalidState(_))))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(rejected, 1);
        assert_eq!(setup.list_bank_entries(Some("S1")).unwrap().len(), 1);
        assert_eq!(setup.get_balance("S1", 2024).unwrap().balance, 0.0);
    }

    #[test]
    fn test_file_service_reads_while_a_writer_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let service = ComplianceService::open(&path).unwrap();
        seed_snapshot(&service, "S1", 2024, 500.0);

        let mut writer = db::connect(&path).unwrap();
        let tx = writer
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        db::upsert_compliance(&tx, "S2", 2024, 10.0).unwrap();

        // served from the last committed state without waiting
        assert_eq!(service.get_balance("S1", 2024).unwrap().balance, 500.0);
        assert_eq!(service.list_compliance().unwrap().len(), 1);

        tx.commit().unwrap();
        assert_eq!(service.list_compliance().unwrap().len(), 2);
    }

    #[test]
    fn test_file_service_banks_different_ships_from_many_threads() {
        let dir = tempfile::tempdir().unwrap();
        let service = ComplianceService::open(&dir.path().join("ledger.db")).unwrap();

        let ships: Vec<String> = (1..=4).map(|n| format!("S{}", n)).collect();
        for ship in &ships {
            seed_snapshot(&service, ship, 2024, 100.0);
        }

        let barrier = Arc::new(Barrier::new(ships.len()));
        let handles: Vec<_> = ships
            .iter()
            .cloned()
            .map(|ship| {
                let service = service.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.bank_surplus(&ship, 2024)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().balance, 0.0);
        }
        assert_eq!(service.list_bank_entries(None).unwrap().len(), ships.len());
    }

    // ------------------------------------------------------------------------
    // routes & comparison
    // ------------------------------------------------------------------------

    fn baselines_per_year(service: &ComplianceService) -> Vec<(i32, String)> {
        service
            .list_routes()
            .unwrap()
            .into_iter()
            .filter(|r| r.is_baseline)
            .map(|r| (r.year, r.route_id))
            .collect()
    }

    #[test]
    fn test_set_baseline_keeps_one_per_year() {
        let service = service();
        seed_routes(&service);

        let route = service.set_baseline("R002", None).unwrap();
        assert!(route.is_baseline);
        assert_eq!(route.year, 2024);

        assert_eq!(
            baselines_per_year(&service),
            vec![(2024, "R002".to_string()), (2025, "R004".to_string())]
        );

        // setting the current baseline again is harmless
        service.set_baseline("R002", None).unwrap();
        assert_eq!(baselines_per_year(&service).len(), 2);
    }

    #[test]
    fn test_failed_set_baseline_keeps_previous_baseline() {
        let service = service();
        seed_routes(&service);

        // audit insert fails after the flags were moved
        service
            .conn()
            .unwrap()
            .execute("DROP TABLE events", [])
            .unwrap();

        let err = service.set_baseline("R002", None).unwrap_err();
        assert!(err.is_internal());

        assert_eq!(
            baselines_per_year(&service),
            vec![(2024, "R001".to_string()), (2025, "R004".to_string())]
        );
    }

    #[test]
    fn test_set_baseline_unknown_route_is_not_found() {
        let service = service();
        seed_routes(&service);

        assert!(matches!(
            service.set_baseline("R999", None),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(matches!(
            service.set_baseline("R002", Some(2025)),
            Err(ComplianceError::NotFound(_))
        ));
        assert_eq!(baselines_per_year(&service).len(), 2);
    }

    #[test]
    fn test_set_baseline_ambiguous_route_needs_year() {
        let service = service();
        service
            .import_routes(&[
                new_route("R001", 2024, 91.0, false),
                new_route("R001", 2025, 89.0, false),
            ])
            .unwrap();

        assert!(matches!(
            service.set_baseline("R001", None),
            Err(ComplianceError::Validation(_))
        ));

        let route = service.set_baseline("R001", Some(2025)).unwrap();
        assert_eq!(route.year, 2025);
        assert_eq!(baselines_per_year(&service), vec![(2025, "R001".to_string())]);
    }

    #[test]
    fn test_comparison_per_year_and_all_years() {
        let service = service();
        seed_routes(&service);

        let rows_2024 = service.comparison(Some(2024)).unwrap();
        assert_eq!(rows_2024.len(), 3);
        assert_eq!(rows_2024[0].route_id, "R001");
        assert_eq!(rows_2024[0].percent_diff, 0.0);

        let all = service.comparison(None).unwrap();
        assert_eq!(all.len(), 5);

        // 2025 uses the regulatory target 89.3368 as the pass line
        let r005 = all.iter().find(|r| r.route_id == "R005").unwrap();
        assert!(!r005.compliant);
    }

    #[test]
    fn test_comparison_without_baseline_is_not_found() {
        let service = service();
        service
            .import_routes(&[new_route("R001", 2024, 91.0, false)])
            .unwrap();

        assert!(matches!(
            service.comparison(None),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(matches!(
            service.comparison(Some(2024)),
            Err(ComplianceError::NotFound(_))
        ));
    }

    // ------------------------------------------------------------------------
    // compliance
    // ------------------------------------------------------------------------

    #[test]
    fn test_record_compliance_uses_schedule_then_baseline() {
        let service = service();
        seed_routes(&service);

        // 2024 has no regulatory step: baseline R001 at 91.0
        let snapshot = service
            .record_compliance(&ShipReport {
                ship_id: "S1".to_string(),
                year: 2024,
                ghg_intensity: 90.0,
                fuel_consumption: 10.0,
            })
            .unwrap();
        assert_eq!(snapshot.cb_gco2eq, 410_000.0);

        // 2025 uses 89.3368
        let snapshot = service
            .record_compliance(&ShipReport {
                ship_id: "S1".to_string(),
                year: 2025,
                ghg_intensity: 90.5,
                fuel_consumption: 10.0,
            })
            .unwrap();
        assert!(snapshot.cb_gco2eq < 0.0);

        assert_eq!(service.list_compliance().unwrap().len(), 2);
        assert_eq!(service.ship_events("S1").unwrap().len(), 2);
    }

    #[test]
    fn test_record_compliance_without_target_is_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let service = ComplianceService::with_calculator(
            conn,
            ComplianceCalculator::with_schedule(TargetSchedule::empty()),
        );

        let err = service
            .record_compliance(&ShipReport {
                ship_id: "S1".to_string(),
                year: 2030,
                ghg_intensity: 80.0,
                fuel_consumption: 10.0,
            })
            .unwrap_err();

        assert!(matches!(err, ComplianceError::NotFound(_)));
        assert!(service.list_compliance().unwrap().is_empty());
    }

    #[test]
    fn test_import_ship_reports_counts_rejections() {
        let service = service();
        seed_routes(&service);

        let reports = vec![
            ShipReport {
                ship_id: "S1".to_string(),
                year: 2024,
                ghg_intensity: 88.0,
                fuel_consumption: 4800.0,
            },
            ShipReport {
                ship_id: "S2".to_string(),
                year: 2023,
                ghg_intensity: 88.0,
                fuel_consumption: 4800.0,
            },
        ];

        let stats = service.import_ship_reports(&reports).unwrap();
        assert_eq!(stats, ImportStats { inserted: 1, skipped: 1 });
    }
}
