// 🚢 Route Entity
//
// One reported route per (route_id, year). At most one route of a year is
// the baseline the others are compared against.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: i64,

    /// Business identifier, unique per year
    pub route_id: String,

    pub vessel_type: String,
    pub fuel_type: String,
    pub year: i32,

    /// gCO2e/MJ
    pub ghg_intensity: f64,

    /// tonnes of fuel
    pub fuel_consumption: f64,

    /// km
    pub distance: f64,

    /// tonnes CO2e
    pub total_emissions: f64,

    pub is_baseline: bool,
}

impl Route {
    /// Same business identity (route_id + year), ignoring the row id.
    pub fn same_route(&self, route_id: &str, year: i32) -> bool {
        self.route_id == route_id && self.year == year
    }
}
