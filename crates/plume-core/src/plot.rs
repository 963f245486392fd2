//! Figure assembly and SVG rendering.
//!
//! [`assemble_figure`] is a pure step that aligns simulated and analytic
//! series on one slice and decides the axis decoration. A [`PlotBackend`]
//! turns the resulting [`Figure`] into an image; [`SvgPlotter`] uses
//! `plotters` with its SVG backend.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::write_atomic;
use crate::error::{Exclusion, Result, VerifyError};
use crate::series::{AnalyticSeries, ObservationSeries};
use crate::slice::{Slice, SliceRegistry};

/// Label of the analytic curve.
pub const ANALYTIC_LABEL: &str = "analytic";

/// Observation series grouped by slice name; entries borrow the by-subtest results.
pub type ObservationsBySlice<'a> = BTreeMap<String, Vec<&'a ObservationSeries>>;

/// Analytic series keyed by slice name.
pub type AnalyticBySlice = BTreeMap<String, AnalyticSeries>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueScale {
    #[default]
    Log,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LegendPosition {
    UpperLeft,
    UpperRight,
    LowerLeft,
    #[default]
    LowerRight,
    UpperMiddle,
    LowerMiddle,
}

impl LegendPosition {
    fn series_label_position(self) -> SeriesLabelPosition {
        match self {
            LegendPosition::UpperLeft => SeriesLabelPosition::UpperLeft,
            LegendPosition::UpperRight => SeriesLabelPosition::UpperRight,
            LegendPosition::LowerLeft => SeriesLabelPosition::LowerLeft,
            LegendPosition::LowerRight => SeriesLabelPosition::LowerRight,
            LegendPosition::UpperMiddle => SeriesLabelPosition::UpperMiddle,
            LegendPosition::LowerMiddle => SeriesLabelPosition::LowerMiddle,
        }
    }
}

/// Free text placed at data coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

fn default_y_label() -> String {
    "Concentration [kg/m^3]".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

/// Axis decoration for one figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxesConfig {
    #[serde(default)]
    pub value_scale: ValueScale,
    /// Defaults to a label derived from the slice.
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default = "default_y_label")]
    pub y_label: String,
    #[serde(default)]
    pub legend: LegendPosition,
    #[serde(default)]
    pub annotation: Option<Annotation>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            value_scale: ValueScale::default(),
            x_label: None,
            y_label: default_y_label(),
            legend: LegendPosition::default(),
            annotation: None,
            title: None,
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStyle {
    Markers,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSeries {
    pub label: String,
    pub style: SeriesStyle,
    pub points: Vec<(f64, f64)>,
}

/// Everything a backend needs to draw one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub slice_name: String,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub axes: AxesConfig,
    /// Observation markers in subtest order, then the analytic curve.
    pub series: Vec<FigureSeries>,
    /// Requested subtests that have no series in this figure.
    pub excluded: Vec<Exclusion>,
}

impl Figure {
    pub fn labels(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn series(&self, label: &str) -> Option<&FigureSeries> {
        self.series.iter().find(|s| s.label == label)
    }
}

/// Axis label for the coordinate along `slice`.
pub fn slice_axis_label(slice: &Slice) -> String {
    format!(
        "Position along {} ({}), {} [m]",
        slice.name,
        slice.cut_label(),
        slice.coordinate_label()
    )
}

/// Annotation describing the cut and evaluation time, placed just below the
/// analytic curve 15% into the domain. `None` where the curve is zero there.
pub fn slice_annotation(slice: &Slice, analytic: &AnalyticSeries, time_days: f64) -> Option<Annotation> {
    let x = slice.domain.min + 0.15 * slice.domain.span();
    let value = analytic.interpolate(x).filter(|v| *v > 0.0)?;
    Some(Annotation {
        text: format!(
            "Concentration along {}, at t={} days.",
            slice.cut_label(),
            time_days
        ),
        x,
        y: 0.75 * value,
    })
}

/// Annotation for `slice`: the configured one when its `x` lies in the slice
/// domain, otherwise the configured text at the derived position.
pub fn annotation_for(
    slice: &Slice,
    analytic: &AnalyticSeries,
    time_days: f64,
    configured: Option<&Annotation>,
) -> Option<Annotation> {
    let derived = slice_annotation(slice, analytic, time_days);
    match configured {
        None => derived,
        Some(note) if slice.domain.contains(note.x) => Some(note.clone()),
        Some(note) => match derived {
            Some(placed) => Some(Annotation {
                text: note.text.clone(),
                ..placed
            }),
            None => Some(Annotation {
                x: note.x.clamp(slice.domain.min, slice.domain.max),
                ..note.clone()
            }),
        },
    }
}

fn plottable(points: impl Iterator<Item = (f64, f64)>, scale: ValueScale) -> Vec<(f64, f64)> {
    points
        .filter(|(_, v)| v.is_finite() && (scale == ValueScale::Linear || *v > 0.0))
        .collect()
}

fn value_range(series: &[FigureSeries], scale: ValueScale, slice_name: &str) -> Result<(f64, f64)> {
    let values = series.iter().flat_map(|s| s.points.iter().map(|p| p.1));
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return Err(VerifyError::Render(format!(
            "slice '{slice_name}' has no plottable values"
        )));
    }
    Ok(match scale {
        ValueScale::Log => (lo / 2.0, hi * 2.0),
        ValueScale::Linear => {
            let lo = lo.min(0.0);
            let span = if hi > lo { hi - lo } else { hi.abs().max(1.0) };
            (lo, hi + 0.1 * span)
        }
    })
}

/// Assemble the figure for `slice_name` from per-slice observations and
/// analytic series.
///
/// Each requested subtest with a series on the slice becomes a marker
/// series; the others are excluded with the reason found in `exclusions`
/// (or "no observations on slice"). Errors when the slice is unknown, has
/// no analytic series, or has no usable subtest left.
pub fn assemble_figure(
    observations_by_slice: &ObservationsBySlice<'_>,
    analytic_by_slice: &AnalyticBySlice,
    registry: &SliceRegistry,
    slice_name: &str,
    subtests: &[&str],
    exclusions: &[Exclusion],
    axes: &AxesConfig,
) -> Result<Figure> {
    let slice = registry.get(slice_name)?;
    let analytic = analytic_by_slice
        .get(slice_name)
        .ok_or_else(|| VerifyError::MissingData {
            slice: slice_name.to_string(),
            what: "no analytic series".to_string(),
        })?;
    let observed = observations_by_slice
        .get(slice_name)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut series = Vec::new();
    let mut excluded = Vec::new();
    for &subtest_id in subtests {
        match observed.iter().find(|o| o.subtest_id == subtest_id) {
            Some(observation) => series.push(FigureSeries {
                label: subtest_id.to_string(),
                style: SeriesStyle::Markers,
                points: plottable(observation.points(), axes.value_scale),
            }),
            None => {
                let reason = exclusions
                    .iter()
                    .find(|e| e.subtest_id == subtest_id)
                    .map(|e| e.reason.clone())
                    .unwrap_or_else(|| "no observations on slice".to_string());
                excluded.push(Exclusion {
                    subtest_id: subtest_id.to_string(),
                    reason,
                });
            }
        }
    }
    if series.is_empty() {
        return Err(VerifyError::NoUsableSubtests {
            slice: slice_name.to_string(),
            excluded,
        });
    }

    series.push(FigureSeries {
        label: ANALYTIC_LABEL.to_string(),
        style: SeriesStyle::Line,
        points: plottable(analytic.points(), axes.value_scale),
    });

    if let Some(annotation) = &axes.annotation {
        if axes.value_scale == ValueScale::Log && annotation.y <= 0.0 {
            return Err(VerifyError::Render(format!(
                "annotation at y = {} cannot be placed on a log axis",
                annotation.y
            )));
        }
    }

    let y_range = value_range(&series, axes.value_scale, slice_name)?;
    let mut axes = axes.clone();
    if axes.x_label.is_none() {
        axes.x_label = Some(slice_axis_label(slice));
    }
    Ok(Figure {
        slice_name: slice.name.clone(),
        x_range: (slice.domain.min, slice.domain.max),
        y_range,
        axes,
        series,
        excluded,
    })
}

/// Renders an assembled figure to a file.
pub trait PlotBackend {
    fn draw(&self, figure: &Figure, output: &Path) -> Result<()>;
}

/// SVG output through `plotters`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgPlotter;

impl SvgPlotter {
    pub fn render_to_string(&self, figure: &Figure) -> Result<String> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (figure.axes.width, figure.axes.height))
                .into_drawing_area();
            draw_on_area(&root, figure).map_err(|e| VerifyError::Render(e.to_string()))?;
        }
        Ok(svg)
    }
}

impl PlotBackend for SvgPlotter {
    fn draw(&self, figure: &Figure, output: &Path) -> Result<()> {
        let svg = self.render_to_string(figure)?;
        write_atomic(output, svg.as_bytes())?;
        tracing::info!(slice = %figure.slice_name, path = %output.display(), "figure written");
        Ok(())
    }
}

/// Marker palette; the analytic curve is always black.
const PALETTE: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

fn series_color(index: usize, style: SeriesStyle) -> RGBColor {
    match style {
        SeriesStyle::Line => BLACK,
        SeriesStyle::Markers => PALETTE[index % PALETTE.len()],
    }
}

// Log and linear charts have different coordinate types, so the drawing
// steps are shared through a macro rather than a generic function.
macro_rules! draw_layers {
    ($chart:expr, $figure:expr, $y_fmt:expr) => {{
        let chart = &mut $chart;
        let figure: &Figure = $figure;
        chart
            .configure_mesh()
            .x_desc(figure.axes.x_label.as_deref().unwrap_or_default())
            .y_desc(figure.axes.y_label.as_str())
            .y_label_formatter(&$y_fmt)
            .draw()?;

        for (index, series) in figure.series.iter().enumerate() {
            let color = series_color(index, series.style);
            match series.style {
                SeriesStyle::Line => {
                    chart
                        .draw_series(LineSeries::new(
                            series.points.iter().copied(),
                            color.stroke_width(2),
                        ))?
                        .label(series.label.as_str())
                        .legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                        });
                }
                SeriesStyle::Markers => {
                    chart
                        .draw_series(
                            series
                                .points
                                .iter()
                                .map(|&point| Circle::new(point, 4, color.filled())),
                        )?
                        .label(series.label.as_str())
                        .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
                }
            }
        }

        if let Some(note) = &figure.axes.annotation {
            chart.draw_series(std::iter::once(Text::new(
                note.text.clone(),
                (note.x, note.y),
                ("sans-serif", 18).into_font(),
            )))?;
        }

        chart
            .configure_series_labels()
            .position(figure.axes.legend.series_label_position())
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }};
}

fn draw_on_area<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    figure: &Figure,
) -> std::result::Result<(), Box<dyn Error>>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let (x_min, x_max) = figure.x_range;
    let (y_min, y_max) = figure.y_range;
    let mut builder = ChartBuilder::on(root);
    builder.margin(15).x_label_area_size(50).y_label_area_size(80);
    if let Some(title) = &figure.axes.title {
        builder.caption(title, ("sans-serif", 28).into_font());
    }

    match figure.axes.value_scale {
        ValueScale::Log => {
            let mut chart = builder.build_cartesian_2d(x_min..x_max, (y_min..y_max).log_scale())?;
            draw_layers!(chart, figure, |y: &f64| format!("{y:.0e}"));
        }
        ValueScale::Linear => {
            let mut chart = builder.build_cartesian_2d(x_min..x_max, y_min..y_max)?;
            draw_layers!(chart, figure, |y: &f64| format!("{y:.2e}"));
        }
    }

    root.present()?;
    Ok(())
}
