//! Coordinate/value series along a slice.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::slice::Slice;

/// Concentrations observed by the simulator along one slice for one subtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    pub subtest_id: String,
    pub slice_name: String,
    coordinates: Vec<f64>,
    values: Vec<f64>,
}

impl ObservationSeries {
    /// Build a series from unordered `(coordinate, value)` points.
    ///
    /// Points are sorted by coordinate; duplicate coordinates, coordinates
    /// outside the slice domain and non-finite values are rejected.
    pub fn from_points(
        subtest_id: impl Into<String>,
        slice: &Slice,
        mut points: Vec<(f64, f64)>,
    ) -> Result<Self> {
        let subtest_id = subtest_id.into();
        let parse_error = |reason: String| VerifyError::Parse {
            subtest_id: subtest_id.clone(),
            slice: Some(slice.name.clone()),
            reason,
        };

        if points.is_empty() {
            return Err(parse_error("no observation points on slice".to_string()));
        }
        if let Some((c, v)) = points.iter().find(|(c, v)| !c.is_finite() || !v.is_finite()) {
            return Err(parse_error(format!("non-finite observation ({c}, {v})")));
        }
        if let Some((c, _)) = points.iter().find(|(c, _)| !slice.domain.contains(*c)) {
            return Err(parse_error(format!(
                "coordinate {c} outside domain ({}, {})",
                slice.domain.min, slice.domain.max
            )));
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(pair) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(parse_error(format!(
                "duplicate observation at {} = {}",
                slice.coordinate_label(),
                pair[0].0
            )));
        }

        let (coordinates, values) = points.into_iter().unzip();
        Ok(Self {
            subtest_id,
            slice_name: slice.name.clone(),
            coordinates,
            values,
        })
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.coordinates.iter().copied().zip(self.values.iter().copied())
    }

    /// Re-check the invariants after loading from an untrusted source.
    pub fn validate(&self) -> std::result::Result<(), String> {
        check_shape(&self.coordinates, &self.values)
    }
}

/// Closed-form concentrations sampled along one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticSeries {
    pub case_name: String,
    pub slice_name: String,
    coordinates: Vec<f64>,
    values: Vec<f64>,
}

impl AnalyticSeries {
    pub(crate) fn new(
        case_name: impl Into<String>,
        slice_name: impl Into<String>,
        coordinates: Vec<f64>,
        values: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(coordinates.len(), values.len());
        Self {
            case_name: case_name.into(),
            slice_name: slice_name.into(),
            coordinates,
            values,
        }
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.coordinates.iter().copied().zip(self.values.iter().copied())
    }

    /// Linear interpolation at `coordinate`; `None` outside the sampled range.
    pub fn interpolate(&self, coordinate: f64) -> Option<f64> {
        let first = *self.coordinates.first()?;
        let last = *self.coordinates.last()?;
        if coordinate < first || coordinate > last {
            return None;
        }
        let upper = self.coordinates.partition_point(|&c| c < coordinate);
        if upper == 0 {
            return Some(self.values[0]);
        }
        if self.coordinates[upper] == coordinate {
            return Some(self.values[upper]);
        }
        let (x0, x1) = (self.coordinates[upper - 1], self.coordinates[upper]);
        let (y0, y1) = (self.values[upper - 1], self.values[upper]);
        let w = (coordinate - x0) / (x1 - x0);
        Some(y0 + w * (y1 - y0))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        check_shape(&self.coordinates, &self.values)
    }
}

fn check_shape(coordinates: &[f64], values: &[f64]) -> std::result::Result<(), String> {
    if coordinates.len() != values.len() {
        return Err(format!(
            "{} coordinates but {} values",
            coordinates.len(),
            values.len()
        ));
    }
    if coordinates.windows(2).any(|w| w[0] >= w[1]) {
        return Err("coordinates are not strictly increasing".to_string());
    }
    Ok(())
}
