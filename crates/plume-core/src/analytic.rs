//! Closed-form concentration for a continuous point source in 2D uniform flow.
//!
//! Flow is along `+x` with seepage velocity `v = q / n`. A source at
//! `(x0, y0)` injects mass at a constant rate `M` per unit aquifer thickness
//! from `t = 0`; the solute disperses with `D_L = alpha_L v + D_m`,
//! `D_T = alpha_T v + D_m` and decays at first-order rate `lambda`. Integrating
//! the instantaneous Gaussian puff over the injection history gives
//!
//! ```text
//! C(x, y, t) = M / (4 pi n sqrt(D_L D_T)) * exp(v dx / (2 D_L)) * W(u, b)
//!
//! r = sqrt(dx^2 + dy^2 D_L / D_T)
//! u = r^2 / (4 D_L t)
//! b = r sqrt((v^2 / (4 D_L) + lambda) / D_L)
//! ```
//!
//! where `W(u, b)` is the leaky well function (Wilson & Miller, 1978). With
//! `v = 0` and `lambda = 0` it reduces to the exponential integral `E1(u)`.

use serde::{Deserialize, Serialize};

use crate::cache::{ArtifactCache, ArtifactKind, CacheKey, Cached};
use crate::error::{Result, VerifyError};
use crate::series::AnalyticSeries;
use crate::slice::Slice;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Simpson intervals used for the well-function quadrature (even).
const QUADRATURE_INTERVALS: usize = 2000;

/// Integrand terms below `exp(-EXP_CUTOFF)` are treated as zero.
const EXP_CUTOFF: f64 = 700.0;

/// Past `y = peak + TAIL_CUTOFF` the integrand has dropped by `exp(-TAIL_CUTOFF)`.
const TAIL_CUTOFF: f64 = 50.0;

fn default_source_radius() -> f64 {
    0.5
}

fn default_samples() -> usize {
    400
}

/// Physical parameters of one analytic reference solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticCase {
    /// Name used for cache keys and plot legends.
    pub name: String,
    /// Darcy flux along +x [m/s].
    pub darcy_velocity: f64,
    /// Effective porosity [-].
    pub porosity: f64,
    /// Longitudinal dispersivity [m].
    pub longitudinal_dispersivity: f64,
    /// Transverse dispersivity [m].
    pub transverse_dispersivity: f64,
    /// Molecular diffusion coefficient [m^2/s].
    #[serde(default)]
    pub molecular_diffusion: f64,
    /// Mass injection rate per unit thickness [kg/s/m].
    pub source_rate: f64,
    /// First-order decay rate [1/s].
    #[serde(default)]
    pub decay_rate: f64,
    /// Source location `[x, y]` [m].
    #[serde(default)]
    pub source_location: [f64; 2],
    /// Near-field radius [m]; distances from the source are clamped to at
    /// least this value, keeping the source itself finite.
    #[serde(default = "default_source_radius")]
    pub source_radius: f64,
    /// Evaluation time since injection started [s].
    pub time: f64,
    /// Number of samples per slice.
    #[serde(default = "default_samples")]
    pub samples: usize,
}

impl AnalyticCase {
    /// Reference parameters of the aligned point-source problem at 1440 days:
    /// Darcy flux 1.8634e-6 m/s, porosity 0.35, dispersivities 21.3 m / 4.3 m.
    pub fn aligned_point_2d() -> Self {
        Self {
            name: "analytic".to_string(),
            darcy_velocity: 1.8634e-6,
            porosity: 0.35,
            longitudinal_dispersivity: 21.3,
            transverse_dispersivity: 4.3,
            molecular_diffusion: 0.0,
            source_rate: 6.93e-7,
            decay_rate: 0.0,
            source_location: [0.0, 0.0],
            source_radius: default_source_radius(),
            time: 1440.0 * SECONDS_PER_DAY,
            samples: default_samples(),
        }
    }

    pub fn with_time_days(mut self, days: f64) -> Self {
        self.time = days * SECONDS_PER_DAY;
        self
    }

    pub fn time_days(&self) -> f64 {
        self.time / SECONDS_PER_DAY
    }

    pub fn validate(&self) -> Result<()> {
        self.transport().map(|_| ())
    }

    fn transport(&self) -> Result<Transport> {
        let domain = |msg: String| Err(VerifyError::Domain(format!("case '{}': {msg}", self.name)));

        if !(self.time.is_finite() && self.time > 0.0) {
            return domain(format!("evaluation time must be positive, got {}", self.time));
        }
        if !(self.porosity > 0.0 && self.porosity <= 1.0) {
            return domain(format!("porosity must lie in (0, 1], got {}", self.porosity));
        }
        for (label, value) in [
            ("darcy_velocity", self.darcy_velocity),
            ("longitudinal_dispersivity", self.longitudinal_dispersivity),
            ("transverse_dispersivity", self.transverse_dispersivity),
            ("molecular_diffusion", self.molecular_diffusion),
            ("source_rate", self.source_rate),
            ("decay_rate", self.decay_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return domain(format!("{label} must be finite and >= 0, got {value}"));
            }
        }
        if !(self.source_radius.is_finite() && self.source_radius > 0.0) {
            return domain(format!("source_radius must be positive, got {}", self.source_radius));
        }
        if self.samples < 2 {
            return domain(format!("samples must be at least 2, got {}", self.samples));
        }
        if self.source_location.iter().any(|c| !c.is_finite()) {
            return domain("source_location must be finite".to_string());
        }

        let velocity = self.darcy_velocity / self.porosity;
        let d_long = self.longitudinal_dispersivity * velocity + self.molecular_diffusion;
        let d_trans = self.transverse_dispersivity * velocity + self.molecular_diffusion;
        if d_long <= 0.0 || d_trans <= 0.0 {
            return domain(format!(
                "effective dispersion must be positive (D_L = {d_long}, D_T = {d_trans})"
            ));
        }

        Ok(Transport {
            velocity,
            d_long,
            d_trans,
            prefactor: self.source_rate
                / (4.0 * std::f64::consts::PI * self.porosity * (d_long * d_trans).sqrt()),
            sink: velocity * velocity / (4.0 * d_long) + self.decay_rate,
            time: self.time,
            source: self.source_location,
            radius: self.source_radius,
        })
    }
}

/// Derived coefficients, valid by construction.
struct Transport {
    velocity: f64,
    d_long: f64,
    d_trans: f64,
    prefactor: f64,
    sink: f64,
    time: f64,
    source: [f64; 2],
    radius: f64,
}

impl Transport {
    fn concentration(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.source[0];
        let dy = y - self.source[1];
        let r = (dx * dx + dy * dy * self.d_long / self.d_trans)
            .sqrt()
            .max(self.radius);
        let u = r * r / (4.0 * self.d_long * self.time);
        let b = r * (self.sink / self.d_long).sqrt();

        let w = leaky_well_function(u, b);
        if w <= 0.0 || self.prefactor == 0.0 {
            return 0.0;
        }
        // exp(advection) * W combined in log space; either factor alone can
        // overflow or underflow far from the source.
        let exponent = self.velocity * dx / (2.0 * self.d_long) + w.ln();
        let c = self.prefactor * exponent.exp();
        if c.is_finite() {
            c.max(0.0)
        } else {
            0.0
        }
    }
}

/// Leaky well function `W(u, b) = ∫_u^∞ exp(-y - b²/(4y)) / y dy`.
///
/// Integrated with composite Simpson in `s = ln y`, truncated where the
/// integrand drops below `exp(-700)`. Returns 0 when the whole range
/// underflows.
pub fn leaky_well_function(u: f64, b: f64) -> f64 {
    if !(u > 0.0) || !u.is_finite() || !b.is_finite() || b < 0.0 {
        return 0.0;
    }
    let quarter_b2 = 0.25 * b * b;

    let mut lower = u.ln();
    if quarter_b2 > 0.0 {
        lower = lower.max((quarter_b2 / EXP_CUTOFF).ln());
    }
    // The integrand peaks at y = b/2 when that lies above u.
    let upper = (u.max(0.5 * b) + TAIL_CUTOFF).ln();
    if lower >= upper {
        return 0.0;
    }

    let n = QUADRATURE_INTERVALS;
    let h = (upper - lower) / n as f64;
    let integrand = |s: f64| {
        let y = s.exp();
        let exponent = -y - quarter_b2 / y;
        if exponent < -EXP_CUTOFF {
            0.0
        } else {
            exponent.exp()
        }
    };

    let mut sum = integrand(lower) + integrand(upper);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * integrand(lower + h * i as f64);
    }
    (sum * h / 3.0).max(0.0)
}

/// Concentration at a single point.
pub fn concentration(case: &AnalyticCase, x: f64, y: f64) -> Result<f64> {
    Ok(case.transport()?.concentration(x, y))
}

/// Sample the closed form across `slice` on a uniform grid of `case.samples`
/// points.
pub fn evaluate(case: &AnalyticCase, slice: &Slice) -> Result<AnalyticSeries> {
    let transport = case.transport()?;
    let coordinates = slice.domain.linspace(case.samples);
    let values = coordinates
        .iter()
        .map(|&c| {
            let (x, y) = slice.point_at(c);
            transport.concentration(x, y)
        })
        .collect();
    Ok(AnalyticSeries::new(
        case.name.clone(),
        slice.name.clone(),
        coordinates,
        values,
    ))
}

/// Cache key of the analytic series for `case` on `slice`.
pub fn cache_key(case: &AnalyticCase, slice: &Slice) -> Result<CacheKey> {
    CacheKey::new(ArtifactKind::Analytic, &case.name, slice, case)
}

/// Return the cached series for `(case, slice)` when present, readable and
/// `overwrite` is false; otherwise evaluate, persist and return it.
pub fn evaluate_or_load(
    case: &AnalyticCase,
    slice: &Slice,
    cache: &ArtifactCache,
    overwrite: bool,
) -> Result<Cached<AnalyticSeries>> {
    case.validate()?;
    let key = cache_key(case, slice)?;
    cache.fetch_or_compute(&key, overwrite, || evaluate(case, slice))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exponential integral E1 by its convergent series, for reference.
    fn e1_series(u: f64) -> f64 {
        const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
        let mut term = 1.0;
        let mut sum = 0.0;
        for k in 1..60 {
            term *= -u / k as f64;
            sum -= term / k as f64;
        }
        -EULER_GAMMA - u.ln() + sum
    }

    #[test]
    fn test_well_function_matches_exponential_integral() {
        for u in [0.01, 0.1, 0.5, 1.0, 2.0] {
            let w = leaky_well_function(u, 0.0);
            let e1 = e1_series(u);
            assert!(
                ((w - e1) / e1).abs() < 1e-6,
                "W({u}, 0) = {w}, E1 = {e1}"
            );
        }
    }

    #[test]
    fn test_well_function_steady_limit() {
        // W(0+, b) -> 2 K0(b); K0(1) = 0.42102443824
        let w = leaky_well_function(1e-9, 1.0);
        assert!((w - 2.0 * 0.421_024_438_24).abs() < 1e-4, "got {w}");
    }

    #[test]
    fn test_well_function_underflow_is_zero() {
        assert_eq!(leaky_well_function(800.0, 0.0), 0.0);
        assert_eq!(leaky_well_function(1.0, 2000.0), 0.0);
        assert_eq!(leaky_well_function(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_rejects_non_positive_time() {
        let case = AnalyticCase {
            time: 0.0,
            ..AnalyticCase::aligned_point_2d()
        };
        let err = evaluate(&case, &Slice::along_x("c", 0.0, 10.0, 0.0).unwrap()).unwrap_err();
        assert!(matches!(err, VerifyError::Domain(_)));
        assert!(err.to_string().contains("time must be positive"));
    }

    #[test]
    fn test_rejects_negative_dispersivity() {
        let case = AnalyticCase {
            transverse_dispersivity: -1.0,
            ..AnalyticCase::aligned_point_2d()
        };
        assert!(matches!(case.validate(), Err(VerifyError::Domain(_))));
    }

    #[test]
    fn test_rejects_zero_effective_dispersion() {
        let case = AnalyticCase {
            darcy_velocity: 0.0,
            ..AnalyticCase::aligned_point_2d()
        };
        let err = case.validate().unwrap_err();
        assert!(err.to_string().contains("effective dispersion"));
    }

    #[test]
    fn test_far_field_is_zero_not_error() {
        let case = AnalyticCase::aligned_point_2d();
        assert_eq!(concentration(&case, 1.0e6, 0.0).unwrap(), 0.0);
        assert_eq!(concentration(&case, 0.0, 1.0e5).unwrap(), 0.0);
    }

    #[test]
    fn test_source_is_finite() {
        let case = AnalyticCase::aligned_point_2d();
        let c = concentration(&case, 0.0, 0.0).unwrap();
        assert!(c.is_finite() && c > 0.0);
    }

    #[test]
    fn test_decay_reduces_concentration() {
        let base = AnalyticCase::aligned_point_2d();
        let decaying = AnalyticCase {
            decay_rate: 1.0e-8,
            ..base.clone()
        };
        let c0 = concentration(&base, 200.0, 0.0).unwrap();
        let c1 = concentration(&decaying, 200.0, 0.0).unwrap();
        assert!(c1 < c0);
    }

    #[test]
    fn test_symmetric_about_centerline() {
        let case = AnalyticCase::aligned_point_2d();
        let above = concentration(&case, 300.0, 40.0).unwrap();
        let below = concentration(&case, 300.0, -40.0).unwrap();
        assert_eq!(above, below);
    }

    #[test]
    fn test_evaluate_samples_whole_domain() {
        let case = AnalyticCase {
            samples: 11,
            ..AnalyticCase::aligned_point_2d()
        };
        let slice = Slice::along_y("x=424.0", 0.0, 200.0, 424.0).unwrap();
        let series = evaluate(&case, &slice).unwrap();
        assert_eq!(series.len(), 11);
        assert_eq!(series.coordinates()[0], 0.0);
        assert_eq!(series.coordinates()[10], 200.0);
        assert_eq!(series.slice_name, "x=424.0");
        assert!(series.values().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_case_toml_defaults() {
        let case: AnalyticCase = toml::from_str(
            r#"
            name = "at123d"
            darcy_velocity = 1.8634e-6
            porosity = 0.35
            longitudinal_dispersivity = 21.3
            transverse_dispersivity = 4.3
            source_rate = 6.93e-7
            time = 124416000.0
            "#,
        )
        .unwrap();
        assert_eq!(case.samples, 400);
        assert_eq!(case.source_radius, 0.5);
        assert_eq!(case.source_location, [0.0, 0.0]);
        assert!((case.time_days() - 1440.0).abs() < 1e-9);
    }
}
