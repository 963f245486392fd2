//! Named 1D cuts through the 2D concentration field.
//!
//! A [`Slice`] fixes one coordinate and spans the other over a [`Domain`].
//! The [`SliceRegistry`] is built once per run and shared read-only by
//! result acquisition, the analytic evaluator and the plot assembler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};

/// Points closer than this (scaled by the fixed coordinate) lie on the cut.
const ON_SLICE_TOLERANCE: f64 = 1e-6;

/// Closed coordinate interval spanned by a slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
}

impl Domain {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, coordinate: f64) -> bool {
        coordinate >= self.min && coordinate <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// `count` evenly spaced coordinates from `min` to `max` inclusive.
    pub fn linspace(&self, count: usize) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![self.min],
            n => {
                let step = self.span() / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { self.max } else { self.min + step * i as f64 })
                    .collect()
            }
        }
    }
}

/// Which coordinate a slice holds fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "along", rename_all = "snake_case")]
pub enum SliceAxis {
    /// Cut at fixed `y`, sampled along `x`.
    X { y: f64 },
    /// Cut at fixed `x`, sampled along `y`.
    Y { x: f64 },
}

/// A named spatial slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub name: String,
    pub domain: Domain,
    pub axis: SliceAxis,
}

impl Slice {
    /// Create a validated slice.
    pub fn new(name: impl Into<String>, domain: Domain, axis: SliceAxis) -> Result<Self> {
        let slice = Self {
            name: name.into(),
            domain,
            axis,
        };
        slice.validate()?;
        Ok(slice)
    }

    /// Slice running along `x` at fixed `y`.
    pub fn along_x(name: impl Into<String>, min: f64, max: f64, y: f64) -> Result<Self> {
        Self::new(name, Domain::new(min, max), SliceAxis::X { y })
    }

    /// Slice running along `y` at fixed `x`.
    pub fn along_y(name: impl Into<String>, min: f64, max: f64, x: f64) -> Result<Self> {
        Self::new(name, Domain::new(min, max), SliceAxis::Y { x })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VerifyError::Configuration(
                "slice name must not be empty".to_string(),
            ));
        }
        let Domain { min, max } = self.domain;
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(VerifyError::Configuration(format!(
                "slice '{}' has degenerate domain ({min}, {max})",
                self.name
            )));
        }
        if !self.fixed_coordinate().is_finite() {
            return Err(VerifyError::Configuration(format!(
                "slice '{}' has a non-finite fixed coordinate",
                self.name
            )));
        }
        Ok(())
    }

    pub fn fixed_coordinate(&self) -> f64 {
        match self.axis {
            SliceAxis::X { y } => y,
            SliceAxis::Y { x } => x,
        }
    }

    /// Name of the coordinate that varies along the slice.
    pub fn coordinate_label(&self) -> &'static str {
        match self.axis {
            SliceAxis::X { .. } => "x",
            SliceAxis::Y { .. } => "y",
        }
    }

    /// Short form of the cut, e.g. `y=0` or `x=424`.
    pub fn cut_label(&self) -> String {
        match self.axis {
            SliceAxis::X { y } => format!("y={y}"),
            SliceAxis::Y { x } => format!("x={x}"),
        }
    }

    /// Map a coordinate along the slice to a point in the plane.
    pub fn point_at(&self, coordinate: f64) -> (f64, f64) {
        match self.axis {
            SliceAxis::X { y } => (coordinate, y),
            SliceAxis::Y { x } => (x, coordinate),
        }
    }

    /// Coordinate along the slice of `(x, y)`, if the point lies on the cut
    /// and inside the domain.
    pub fn locate(&self, x: f64, y: f64) -> Option<f64> {
        let (along, across) = match self.axis {
            SliceAxis::X { .. } => (x, y),
            SliceAxis::Y { .. } => (y, x),
        };
        let fixed = self.fixed_coordinate();
        let tolerance = ON_SLICE_TOLERANCE * fixed.abs().max(1.0);
        if (across - fixed).abs() > tolerance || !self.domain.contains(along) {
            return None;
        }
        Some(along)
    }

    /// File-system friendly form of the slice name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Replace everything but ASCII alphanumerics, `.` and `-` with `_`.
pub fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Immutable, name-indexed set of slices.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceRegistry {
    slices: BTreeMap<String, Slice>,
}

impl SliceRegistry {
    /// Build a registry, rejecting duplicate names and invalid slices.
    pub fn new(slices: impl IntoIterator<Item = Slice>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for slice in slices {
            slice.validate()?;
            if map.contains_key(&slice.name) {
                return Err(VerifyError::Configuration(format!(
                    "duplicate slice name '{}'",
                    slice.name
                )));
            }
            map.insert(slice.name.clone(), slice);
        }
        if map.is_empty() {
            return Err(VerifyError::Configuration(
                "at least one slice must be defined".to_string(),
            ));
        }
        Ok(Self { slices: map })
    }

    pub fn get(&self, name: &str) -> Result<&Slice> {
        self.slices.get(name).ok_or_else(|| VerifyError::UnknownSlice {
            name: name.to_string(),
            registered: self.names().join(", "),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slices.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.slices.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slice> {
        self.slices.values()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// The standard slices of the aligned point-source problem: the plume
/// centerline and two transverse cuts at the source and downstream.
pub fn define_slices() -> Result<SliceRegistry> {
    SliceRegistry::new([
        Slice::along_x("centerline", 0.0, 1000.0, 0.0)?,
        Slice::along_y("x=0.0", 0.0, 100.0, 0.0)?,
        Slice::along_y("x=424.0", 0.0, 200.0, 424.0)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_slices_is_deterministic() {
        let a = define_slices().unwrap();
        let b = define_slices().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.names(), vec!["centerline", "x=0.0", "x=424.0"]);
    }

    #[test]
    fn test_cut_label() {
        let registry = define_slices().unwrap();
        assert_eq!(registry.get("centerline").unwrap().cut_label(), "y=0");
        assert_eq!(registry.get("x=424.0").unwrap().cut_label(), "x=424");
    }

    #[test]
    fn test_degenerate_domain_rejected() {
        let err = Slice::along_x("bad", 10.0, 10.0, 0.0).unwrap_err();
        assert!(matches!(err, VerifyError::Configuration(_)));

        let err = Slice::along_y("reversed", 5.0, -5.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = SliceRegistry::new([
            Slice::along_x("centerline", 0.0, 10.0, 0.0).unwrap(),
            Slice::along_x("centerline", 0.0, 20.0, 0.0).unwrap(),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate slice name"));
    }

    #[test]
    fn test_unknown_slice_lists_registered() {
        let registry = define_slices().unwrap();
        match registry.get("y=3") {
            Err(VerifyError::UnknownSlice { name, registered }) => {
                assert_eq!(name, "y=3");
                assert!(registered.contains("centerline"));
            }
            other => panic!("expected UnknownSlice, got {other:?}"),
        }
    }

    #[test]
    fn test_locate_on_and_off_slice() {
        let slice = Slice::along_y("x=424.0", 0.0, 200.0, 424.0).unwrap();
        assert_eq!(slice.locate(424.0, 50.0), Some(50.0));
        assert_eq!(slice.locate(424.0000001, 50.0), Some(50.0));
        assert_eq!(slice.locate(430.0, 50.0), None);
        assert_eq!(slice.locate(424.0, 250.0), None);
        assert_eq!(slice.locate(424.0, -1.0), None);
    }

    #[test]
    fn test_point_at_respects_axis() {
        let centerline = Slice::along_x("centerline", 0.0, 100.0, 0.0).unwrap();
        assert_eq!(centerline.point_at(25.0), (25.0, 0.0));
        let transverse = Slice::along_y("x=0.0", 0.0, 100.0, 0.0).unwrap();
        assert_eq!(transverse.point_at(25.0), (0.0, 25.0));
    }

    #[test]
    fn test_linspace_hits_endpoints() {
        let grid = Domain::new(0.0, 500.0).linspace(6);
        assert_eq!(grid, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
        assert!(Domain::new(0.0, 1.0).linspace(0).is_empty());
    }

    #[test]
    fn test_slug_is_path_safe() {
        let slice = Slice::along_y("x=424.0", 0.0, 200.0, 424.0).unwrap();
        assert_eq!(slice.slug(), "x_424.0");
    }

    #[test]
    fn test_slice_toml_roundtrip() {
        let text = r#"
            name = "centerline"
            domain = { min = 0.0, max = 500.0 }
            axis = { along = "x", y = 0.0 }
        "#;
        let slice: Slice = toml::from_str(text).unwrap();
        assert_eq!(slice, Slice::along_x("centerline", 0.0, 500.0, 0.0).unwrap());
    }
}
