// 📈 Comparison Engine - routes vs. the baseline route of their year
//
//   percent_diff = (route.ghg - baseline.ghg) / baseline.ghg * 100
//   compliant    = route.ghg <= threshold
//
// threshold is the regulatory target of the year when one is known,
// otherwise the baseline intensity. The baseline row itself is always
// 0 % and compliant.

use crate::entities::Route;
use crate::error::{ComplianceError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub route_id: String,
    pub year: i32,
    pub baseline_route_id: String,
    pub ghg_intensity: f64,
    pub baseline_intensity: f64,
    pub percent_diff: f64,
    pub compliant: bool,
}

impl ComparisonRow {
    pub fn is_baseline(&self) -> bool {
        self.route_id == self.baseline_route_id
    }
}

pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn percent_diff(route_intensity: f64, baseline_intensity: f64) -> f64 {
        (route_intensity - baseline_intensity) * 100.0 / baseline_intensity
    }

    /// Compare every route of `year` with that year's baseline.
    ///
    /// `threshold` overrides the baseline intensity as the pass/fail line.
    pub fn compare(routes: &[Route], year: i32, threshold: Option<f64>) -> Result<Vec<ComparisonRow>> {
        let baseline = routes
            .iter()
            .find(|route| route.year == year && route.is_baseline)
            .ok_or_else(|| {
                ComplianceError::not_found(format!("no baseline route set for year {}", year))
            })?;

        if baseline.ghg_intensity <= 0.0 {
            return Err(ComplianceError::Unexpected(format!(
                "baseline route {} has non-positive intensity {}",
                baseline.route_id, baseline.ghg_intensity
            )));
        }

        let limit = threshold.unwrap_or(baseline.ghg_intensity);

        let mut rows: Vec<ComparisonRow> = routes
            .iter()
            .filter(|route| route.year == year)
            .map(|route| {
                let is_baseline = route.id == baseline.id;

                ComparisonRow {
                    route_id: route.route_id.clone(),
                    year,
                    baseline_route_id: baseline.route_id.clone(),
                    ghg_intensity: route.ghg_intensity,
                    baseline_intensity: baseline.ghg_intensity,
                    percent_diff: if is_baseline {
                        0.0
                    } else {
                        Self::percent_diff(route.ghg_intensity, baseline.ghg_intensity)
                    },
                    compliant: is_baseline || route.ghg_intensity <= limit,
                }
            })
            .collect();

        rows.sort_by(|a, b| a.route_id.cmp(&b.route_id));
        Ok(rows)
    }

    /// Compare several years and merge, ordered by route id then year.
    pub fn compare_years<F>(routes: &[Route], years: &[i32], threshold_for: F) -> Result<Vec<ComparisonRow>>
    where
        F: Fn(i32) -> Option<f64>,
    {
        let mut rows = Vec::new();
        for &year in years {
            rows.extend(Self::compare(routes, year, threshold_for(year))?);
        }

        rows.sort_by(|a, b| a.route_id.cmp(&b.route_id).then(a.year.cmp(&b.year)));
        Ok(rows)
    }
}
