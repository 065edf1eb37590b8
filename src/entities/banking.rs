// 🏦 Banking entities
//
// BankEntry rows are written by the ledger only. The amount is the movement
// into the ship's banked pool:
//   amount > 0  surplus banked out of `year`
//   amount < 0  banked surplus consumed against the deficit of `year`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntry {
    /// Insertion order; entries of one ship are totally ordered by it
    pub id: i64,
    pub ship_id: String,
    pub year: i32,
    pub amount_gco2eq: f64,
    pub created_at: DateTime<Utc>,
}

impl BankEntry {
    pub fn is_banking(&self) -> bool {
        self.amount_gco2eq > 0.0
    }

    pub fn is_application(&self) -> bool {
        self.amount_gco2eq < 0.0
    }
}

/// Adjusted balance of a ship/year after all banking activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankRecord {
    pub ship_id: String,
    pub year: i32,
    pub balance: f64,
}

/// Banked surplus still available to offset a deficit in `year`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub ship_id: String,
    pub year: i32,
    pub available: f64,
}
