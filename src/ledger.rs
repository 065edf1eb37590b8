// 🏦 Banking Ledger - adjusted balances and the FIFO banked pool
//
// A year's adjusted balance:
//   balance(year) = raw_cb(year) - Σ amount(entries of year)
//
// Banking moves the whole surplus of a year into the pool (entry > 0, the
// year drops to 0). Applying consumes pooled surplus against a deficit
// (entry < 0, the year rises by the consumed amount).
//
// The pool is replayed from the full history in creation order. Every
// positive entry opens a lot; every negative entry consumes the oldest lots
// banked in a year <= its own year. Surplus banked after a deficit year is
// never eligible for it.
//
// Everything here is pure: the services load entries inside a transaction,
// plan the next movement with this module, then append it.

use crate::entities::{BankEntry, BankRecord, PoolStatus};
use crate::error::{ComplianceError, Result};

/// Amounts closer to zero than this (gCO2e) always count as zero
pub const BALANCE_TOLERANCE: f64 = 1e-6;

/// Residue allowed per gram of the operands; balances reach 1e10 g and more,
/// where one ulp is already several micrograms
pub const RELATIVE_TOLERANCE: f64 = 1e-12;

/// Zero band for a result computed from operands of magnitude `scale`
pub fn tolerance(scale: f64) -> f64 {
    BALANCE_TOLERANCE.max(scale.abs() * RELATIVE_TOLERANCE)
}

fn settle(value: f64, scale: f64) -> f64 {
    if value.abs() < tolerance(scale) {
        0.0
    } else {
        value
    }
}

// ============================================================================
// LOTS
// ============================================================================

/// Surplus banked by one entry and what is left of it
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub entry_id: i64,
    pub year: i32,
    pub banked: f64,
    pub remaining: f64,
}

impl Lot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining < tolerance(self.banked)
    }
}

/// Consume up to `amount` from lots eligible for `year`, oldest first.
/// Returns what was actually consumed.
fn consume_fifo(lots: &mut [Lot], year: i32, amount: f64) -> f64 {
    let mut outstanding = amount;

    for lot in lots.iter_mut().filter(|lot| lot.year <= year) {
        if outstanding < tolerance(amount) {
            break;
        }
        if lot.is_exhausted() {
            continue;
        }

        let taken = lot.remaining.min(outstanding);
        lot.remaining = settle(lot.remaining - taken, lot.banked);
        outstanding -= taken;
    }

    amount - settle(outstanding, amount)
}

// ============================================================================
// SHIP LEDGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct ShipLedger {
    ship_id: String,
    entries: Vec<BankEntry>,
    lots: Vec<Lot>,
}

impl ShipLedger {
    /// Rebuild the ledger of one ship from its history. Entries of other
    /// ships are ignored; order is restored from the entry ids.
    pub fn replay(ship_id: &str, entries: &[BankEntry]) -> Self {
        let mut ordered: Vec<BankEntry> = entries
            .iter()
            .filter(|entry| entry.ship_id == ship_id)
            .cloned()
            .collect();
        ordered.sort_by_key(|entry| entry.id);

        let mut ledger = ShipLedger {
            ship_id: ship_id.to_string(),
            entries: Vec::with_capacity(ordered.len()),
            lots: Vec::new(),
        };

        for entry in ordered {
            ledger.push(entry);
        }

        ledger
    }

    /// Fold one more entry into the state. Must be newer than every entry
    /// already pushed.
    pub fn push(&mut self, entry: BankEntry) {
        if entry.is_banking() {
            self.lots.push(Lot {
                entry_id: entry.id,
                year: entry.year,
                banked: entry.amount_gco2eq,
                remaining: entry.amount_gco2eq,
            });
        } else if entry.is_application() {
            consume_fifo(&mut self.lots, entry.year, -entry.amount_gco2eq);
        }

        self.entries.push(entry);
    }

    pub fn ship_id(&self) -> &str {
        &self.ship_id
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Entries in creation order
    pub fn entries(&self) -> &[BankEntry] {
        &self.entries
    }

    /// History ordered by year, then insertion order
    pub fn history(&self) -> Vec<BankEntry> {
        let mut history = self.entries.clone();
        history.sort_by_key(|entry| (entry.year, entry.id));
        history
    }

    /// Net movement of a year into the pool
    pub fn year_movement(&self, year: i32) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.year == year)
            .map(|entry| entry.amount_gco2eq)
            .sum()
    }

    /// Largest operand that went into the balance of `year`
    fn year_scale(&self, raw_cb: f64, year: i32) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.year == year)
            .map(|entry| entry.amount_gco2eq.abs())
            .fold(raw_cb.abs(), f64::max)
    }

    pub fn adjusted_balance(&self, raw_cb: f64, year: i32) -> f64 {
        settle(
            raw_cb - self.year_movement(year),
            self.year_scale(raw_cb, year),
        )
    }

    pub fn record(&self, raw_cb: f64, year: i32) -> BankRecord {
        BankRecord {
            ship_id: self.ship_id.clone(),
            year,
            balance: self.adjusted_balance(raw_cb, year),
        }
    }

    /// Unconsumed surplus banked in years <= `year`
    pub fn available_pool(&self, year: i32) -> f64 {
        let eligible = self.lots.iter().filter(|lot| lot.year <= year);
        let banked: f64 = eligible.clone().map(|lot| lot.banked).sum();

        settle(eligible.map(|lot| lot.remaining).sum(), banked)
    }

    pub fn pool_status(&self, year: i32) -> PoolStatus {
        PoolStatus {
            ship_id: self.ship_id.clone(),
            year,
            available: self.available_pool(year),
        }
    }

    pub fn total_pool(&self) -> f64 {
        let banked: f64 = self.lots.iter().map(|lot| lot.banked).sum();
        settle(self.lots.iter().map(|lot| lot.remaining).sum(), banked)
    }

    /// Amount to bank for `year`: the whole current surplus.
    pub fn plan_bank(&self, raw_cb: f64, year: i32) -> Result<f64> {
        let balance = self.adjusted_balance(raw_cb, year);

        if balance <= 0.0 {
            return Err(ComplianceError::invalid_state(format!(
                "ship {} has no surplus to bank for {} (balance {:.2})",
                self.ship_id, year, balance
            )));
        }

        Ok(balance)
    }

    /// Signed entry amount (negative) that applies banked surplus to the
    /// deficit of `year`: min(pool, |deficit|).
    pub fn plan_apply(&self, raw_cb: f64, year: i32) -> Result<f64> {
        let balance = self.adjusted_balance(raw_cb, year);

        if balance >= 0.0 {
            return Err(ComplianceError::invalid_state(format!(
                "ship {} has no deficit in {} (balance {:.2})",
                self.ship_id, year, balance
            )));
        }

        let pool = self.available_pool(year);
        if pool <= 0.0 {
            return Err(ComplianceError::invalid_state(format!(
                "ship {} has no banked surplus available for {}",
                self.ship_id, year
            )));
        }

        Ok(-pool.min(-balance))
    }
}
