// 🧮 Compliance Balance Calculator
//
//   cb = (target_intensity - actual_intensity) * energy_used
//   energy_used = fuel_consumption (t) * 41 000 MJ/t
//
// Positive cb = under target (surplus), negative = over target (deficit).
// The target of a year comes from the regulatory schedule; years the
// schedule does not cover fall back to that year's baseline route.

use crate::entities::{Route, ShipReport};
use crate::error::{ComplianceError, Result};

/// Lower calorific value used to convert tonnes of fuel into MJ
pub const ENERGY_PER_TONNE_MJ: f64 = 41_000.0;

/// FuelEU reference intensity (gCO2e/MJ) the reductions apply to
pub const REFERENCE_INTENSITY: f64 = 91.16;

// ============================================================================
// TARGET SCHEDULE
// ============================================================================

/// Step schedule of target intensities: each step applies from its year
/// until the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSchedule {
    steps: Vec<(i32, f64)>,
}

impl TargetSchedule {
    /// FuelEU Maritime reduction steps relative to 91.16 gCO2e/MJ
    pub fn fueleu() -> Self {
        let reductions = [
            (2025, 0.02),
            (2030, 0.06),
            (2035, 0.145),
            (2040, 0.31),
            (2045, 0.62),
            (2050, 0.80),
        ];

        TargetSchedule::from_steps(
            reductions
                .iter()
                .map(|(year, cut)| (*year, REFERENCE_INTENSITY * (1.0 - cut)))
                .collect(),
        )
    }

    /// Schedule with no regulatory targets; every year falls back to its baseline.
    pub fn empty() -> Self {
        TargetSchedule { steps: Vec::new() }
    }

    pub fn from_steps(mut steps: Vec<(i32, f64)>) -> Self {
        steps.sort_by_key(|(year, _)| *year);
        TargetSchedule { steps }
    }

    pub fn target_for(&self, year: i32) -> Option<f64> {
        self.steps
            .iter()
            .rev()
            .find(|(from, _)| *from <= year)
            .map(|(_, target)| *target)
    }
}

impl Default for TargetSchedule {
    fn default() -> Self {
        Self::fueleu()
    }
}

// ============================================================================
// CALCULATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct ComplianceCalculator {
    pub schedule: TargetSchedule,
    pub energy_per_tonne_mj: f64,
}

impl ComplianceCalculator {
    pub fn new() -> Self {
        ComplianceCalculator {
            schedule: TargetSchedule::fueleu(),
            energy_per_tonne_mj: ENERGY_PER_TONNE_MJ,
        }
    }

    pub fn with_schedule(schedule: TargetSchedule) -> Self {
        ComplianceCalculator {
            schedule,
            energy_per_tonne_mj: ENERGY_PER_TONNE_MJ,
        }
    }

    /// Target intensity for `year`: schedule first, then the baseline route
    /// of that year.
    pub fn target_for(&self, year: i32, baseline: Option<&Route>) -> Result<f64> {
        if let Some(target) = self.schedule.target_for(year) {
            return Ok(target);
        }

        match baseline {
            Some(route) if route.year == year && route.is_baseline => Ok(route.ghg_intensity),
            _ => Err(ComplianceError::not_found(format!(
                "no target intensity or baseline route for year {}",
                year
            ))),
        }
    }

    pub fn energy_used(&self, fuel_consumption_t: f64) -> f64 {
        fuel_consumption_t * self.energy_per_tonne_mj
    }

    /// Raw compliance balance in gCO2e
    pub fn compliance_balance(&self, target: f64, actual: f64, fuel_consumption_t: f64) -> f64 {
        (target - actual) * self.energy_used(fuel_consumption_t)
    }

    /// Validate a report and compute its compliance balance for the year's target.
    pub fn compute(&self, report: &ShipReport, baseline: Option<&Route>) -> Result<f64> {
        if report.ship_id.trim().is_empty() {
            return Err(ComplianceError::validation("shipId must not be empty"));
        }
        if !report.ghg_intensity.is_finite() || report.ghg_intensity < 0.0 {
            return Err(ComplianceError::validation(
                "ghgIntensity must be a non-negative number",
            ));
        }
        if !report.fuel_consumption.is_finite() || report.fuel_consumption < 0.0 {
            return Err(ComplianceError::validation(
                "fuelConsumption must be a non-negative number",
            ));
        }

        let target = self.target_for(report.year, baseline)?;
        Ok(self.compliance_balance(target, report.ghg_intensity, report.fuel_consumption))
    }
}

impl Default for ComplianceCalculator {
    fn default() -> Self {
        Self::new()
    }
}
