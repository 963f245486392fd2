//! plume-verify core library
//!
//! Slices, the analytic point-source solution, the artifact cache, series
//! comparison, figure assembly and reporting. Simulator invocation lives in
//! `plume-sim`.

pub mod analytic;
pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod obs;
pub mod plot;
pub mod report;
pub mod run;
pub mod series;
pub mod slice;
pub mod subtest;
pub mod telemetry;

pub use analytic::{concentration, evaluate, evaluate_or_load, AnalyticCase, SECONDS_PER_DAY};
pub use cache::{
    write_atomic, Artifact, ArtifactCache, ArtifactKind, CacheEntry, CacheKey, Cached, Digest,
    Origin,
};
pub use compare::{
    compare_series, evaluate_tolerance, ComparisonRow, SeriesComparison, Tolerance,
    ToleranceVerdict,
};
pub use config::{HarnessConfig, SimulatorConfig};
pub use error::{Exclusion, Result, VerifyError};
pub use plot::{
    annotation_for, assemble_figure, slice_annotation, slice_axis_label, AnalyticBySlice,
    Annotation, AxesConfig, Figure, FigureSeries, LegendPosition, ObservationsBySlice,
    PlotBackend, SeriesStyle, SvgPlotter, ValueScale, ANALYTIC_LABEL,
};
pub use report::{
    render_profile_md, render_report_md, write_report_json, write_report_md, ComparisonReport,
    REPORT_SCHEMA_VERSION,
};
pub use run::{RunConfig, RunPhase, RunTracker};
pub use series::{AnalyticSeries, ObservationSeries};
pub use slice::{define_slices, Domain, Slice, SliceAxis, SliceRegistry};
pub use subtest::{Subtest, SubtestSet};
pub use telemetry::init_tracing;

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
