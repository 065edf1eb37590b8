// 📊 Compliance snapshot
//
// ShipCompliance is derived: it is produced from a ShipReport by the
// calculator and replaced whenever the report is recorded again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipCompliance {
    pub id: i64,
    pub ship_id: String,
    pub year: i32,

    /// Raw compliance balance, gCO2e. Positive = surplus, negative = deficit.
    pub cb_gco2eq: f64,
}

/// Reported fuel use of a ship for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipReport {
    pub ship_id: String,
    pub year: i32,

    /// gCO2e/MJ
    pub ghg_intensity: f64,

    /// tonnes of fuel
    pub fuel_consumption: f64,
}
