//! Pointwise comparison of observed and analytic series with an optional
//! tolerance gate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::obs;
use crate::series::{AnalyticSeries, ObservationSeries};

fn default_relative() -> f64 {
    0.1
}

/// Acceptance band around the analytic value.
///
/// A point passes when `|simulated - analytic| <= absolute + relative * |analytic|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tolerance {
    #[serde(default = "default_relative")]
    pub relative: f64,
    #[serde(default)]
    pub absolute: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: default_relative(),
            absolute: 0.0,
        }
    }
}

impl Tolerance {
    pub fn new(relative: f64, absolute: f64) -> Result<Self> {
        let tolerance = Self { relative, absolute };
        tolerance.validate()?;
        Ok(tolerance)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        if !ok(self.relative) || !ok(self.absolute) {
            return Err(VerifyError::Configuration(format!(
                "tolerance bounds must be finite and non-negative (relative {}, absolute {})",
                self.relative, self.absolute
            )));
        }
        Ok(())
    }

    pub fn admits(&self, simulated: f64, analytic: f64) -> bool {
        (simulated - analytic).abs() <= self.absolute + self.relative * analytic.abs()
    }
}

/// One observed point next to the interpolated analytic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub coordinate: f64,
    pub simulated: f64,
    /// `None` when the coordinate lies outside the analytic sampling range.
    pub analytic: Option<f64>,
    pub abs_deviation: Option<f64>,
    /// Undefined where the analytic value is zero.
    pub rel_deviation: Option<f64>,
    /// Set only when a tolerance was supplied and the point is comparable.
    pub within_tolerance: Option<bool>,
}

impl ComparisonRow {
    pub fn is_comparable(&self) -> bool {
        self.analytic.is_some()
    }
}

/// Rows for one subtest on one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesComparison {
    pub subtest_id: String,
    pub slice_name: String,
    pub rows: Vec<ComparisonRow>,
}

impl SeriesComparison {
    pub fn compared(&self) -> usize {
        self.rows.iter().filter(|r| r.is_comparable()).count()
    }

    pub fn max_rel_deviation(&self) -> Option<f64> {
        self.rows
            .iter()
            .filter_map(|r| r.rel_deviation)
            .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.rows.iter().filter(|r| r.within_tolerance == Some(false))
    }
}

/// Align `observed` against `analytic` at each observation coordinate.
pub fn compare_series(
    observed: &ObservationSeries,
    analytic: &AnalyticSeries,
    tolerance: Option<&Tolerance>,
) -> SeriesComparison {
    let rows = observed
        .points()
        .map(|(coordinate, simulated)| {
            let analytic_value = analytic.interpolate(coordinate);
            let abs_deviation = analytic_value.map(|a| (simulated - a).abs());
            let rel_deviation = analytic_value
                .filter(|a| *a != 0.0)
                .map(|a| (simulated - a).abs() / a.abs());
            let within_tolerance = match (tolerance, analytic_value) {
                (Some(t), Some(a)) => Some(t.admits(simulated, a)),
                _ => None,
            };
            ComparisonRow {
                coordinate,
                simulated,
                analytic: analytic_value,
                abs_deviation,
                rel_deviation,
                within_tolerance,
            }
        })
        .collect();

    SeriesComparison {
        subtest_id: observed.subtest_id.clone(),
        slice_name: observed.slice_name.clone(),
        rows,
    }
}

/// Outcome of applying a tolerance across comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceVerdict {
    pub passed: bool,
    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,
    pub compared: usize,
    pub message: String,
}

/// Gate the comparisons against `tolerance`.
///
/// Every out-of-band point is a violation, as is a subtest with no
/// comparable point at all.
pub fn evaluate_tolerance(comparisons: &[SeriesComparison], tolerance: &Tolerance) -> ToleranceVerdict {
    let mut violations = Vec::new();
    let mut compared = 0;

    for comparison in comparisons {
        let mut subtest_passed = true;
        let mut subtest_compared = 0;
        for row in &comparison.rows {
            let Some(analytic) = row.analytic else {
                continue;
            };
            subtest_compared += 1;
            if !tolerance.admits(row.simulated, analytic) {
                subtest_passed = false;
                violations.push(format!(
                    "{} @ {}: simulated {:.6e} vs analytic {:.6e}",
                    comparison.subtest_id, row.coordinate, row.simulated, analytic
                ));
            }
        }
        if subtest_compared == 0 {
            subtest_passed = false;
            violations.push(format!(
                "{}: no observation inside the analytic range",
                comparison.subtest_id
            ));
        }
        compared += subtest_compared;
        obs::emit_tolerance_evaluated(
            &comparison.slice_name,
            &comparison.subtest_id,
            subtest_compared,
            subtest_passed,
        );
    }

    let passed = violations.is_empty();
    let message = if passed {
        format!("All {compared} point(s) within tolerance")
    } else {
        format!("Tolerance failed with {} violation(s)", violations.len())
    };

    ToleranceVerdict {
        passed,
        violations,
        compared,
        message,
    }
}
