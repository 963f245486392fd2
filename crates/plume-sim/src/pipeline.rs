//! End-to-end verification: slices, acquisition, analytic evaluation,
//! figures and reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use plume_core::{
    annotation_for, assemble_figure, compare_series, evaluate_or_load, evaluate_tolerance, obs,
    write_report_json, write_report_md, AnalyticBySlice, AnalyticCase, ArtifactCache, AxesConfig,
    ComparisonReport, Exclusion, Origin, PlotBackend, Result, RunConfig, RunPhase, RunTracker,
    SeriesComparison, Slice, SliceRegistry, SubtestSet, Tolerance, VerifyError,
    REPORT_SCHEMA_VERSION,
};
use tracing::{info, Instrument};

use crate::acquire::{acquire_results, AcquisitionPlan, AcquisitionReport};
use crate::runner::Simulator;

/// What one pipeline run should produce.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Slice names to render, in order. Must be non-empty.
    pub slices: Vec<String>,
    pub analytic: AnalyticCase,
    /// Axis defaults; the annotation is placed per slice.
    pub axes: AxesConfig,
    pub tolerance: Option<Tolerance>,
    /// Restrict observation rows to this variable.
    pub variable: Option<String>,
    /// Directory receiving `<slice>.svg` and the reports.
    pub output_dir: PathBuf,
    pub write_reports: bool,
}

impl VerificationRequest {
    pub fn new(slices: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            slices,
            analytic: AnalyticCase::aligned_point_2d(),
            axes: AxesConfig::default(),
            tolerance: None,
            variable: None,
            output_dir: output_dir.into(),
            write_reports: false,
        }
    }
}

/// Outcome for one rendered slice.
#[derive(Debug, Clone)]
pub struct SliceOutcome {
    pub report: ComparisonReport,
    pub figure: PathBuf,
    pub analytic_origin: Origin,
    /// Markdown and JSON report paths, when written.
    pub report_files: Vec<PathBuf>,
}

impl SliceOutcome {
    /// False only when a tolerance gate was configured and failed.
    pub fn passed(&self) -> bool {
        self.report.verdict.as_ref().map_or(true, |v| v.passed)
    }
}

/// Result of a complete verification run.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub run_id: String,
    pub phase: RunPhase,
    pub slices: Vec<SliceOutcome>,
    /// Subtests that produced no results at all.
    pub failures: Vec<Exclusion>,
    pub simulator_runs: usize,
    pub duration_ms: u64,
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        self.slices.iter().all(SliceOutcome::passed)
    }

    pub fn failed_slices(&self) -> Vec<&str> {
        self.slices
            .iter()
            .filter(|s| !s.passed())
            .map(|s| s.report.slice.as_str())
            .collect()
    }
}

/// Run-wide inputs shared by every slice rendered in one run.
#[derive(Clone, Copy)]
struct RenderContext<'a> {
    run_id: &'a str,
    subtests: &'a SubtestSet,
    acquired: &'a AcquisitionReport,
    analytic_by_slice: &'a AnalyticBySlice,
    request: &'a VerificationRequest,
}

/// Verification pipeline orchestrator.
pub struct VerificationPipeline {
    simulator: Arc<dyn Simulator>,
    backend: Arc<dyn PlotBackend + Send + Sync>,
    registry: SliceRegistry,
    run: RunConfig,
}

impl VerificationPipeline {
    pub fn new(
        simulator: Arc<dyn Simulator>,
        backend: Arc<dyn PlotBackend + Send + Sync>,
        registry: SliceRegistry,
        run: RunConfig,
    ) -> Self {
        Self {
            simulator,
            backend,
            registry,
            run,
        }
    }

    pub fn registry(&self) -> &SliceRegistry {
        &self.registry
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Execute a run.
    ///
    /// Every requested slice is resolved before the simulator is touched, so
    /// an unknown name fails the run without side effects. Failing subtests
    /// are excluded and reported; the run fails only when a requested slice
    /// ends up with no usable subtest.
    pub async fn run(
        &self,
        subtests: &SubtestSet,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome> {
        let tracker = RunTracker::new();
        let span = obs::run_span(&tracker.run_id(), &self.run.input_case);
        self.execute(tracker, subtests, request).instrument(span).await
    }

    async fn execute(
        &self,
        mut tracker: RunTracker,
        subtests: &SubtestSet,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome> {
        let start = Instant::now();
        let run_id = tracker.run_id();

        let slices = self.resolve_slices(&request.slices)?;
        request.analytic.validate()?;
        if let Some(tolerance) = &request.tolerance {
            tolerance.validate()?;
        }
        tracker.advance(RunPhase::SlicesDefined)?;

        obs::emit_run_started(
            &run_id,
            &self.run.input_case,
            subtests.len(),
            self.run.overwrite,
        );
        let cache = ArtifactCache::new(&self.run.cache_dir)?;

        let acquired = acquire_results(
            self.simulator.as_ref(),
            &cache,
            AcquisitionPlan {
                run: &self.run,
                subtests,
                slices: &slices,
                variable: request.variable.as_deref(),
            },
        )
        .await;
        if acquired.usable_count() == 0 {
            let names: Vec<&str> = slices.iter().map(|s| s.name.as_str()).collect();
            return Err(VerifyError::NoUsableSubtests {
                slice: names.join(", "),
                excluded: acquired.exclusions_across(&names),
            });
        }
        tracker.advance(RunPhase::ResultsAcquired)?;

        let mut analytic_by_slice = AnalyticBySlice::new();
        let mut analytic_origins = Vec::with_capacity(slices.len());
        for slice in &slices {
            let cached = evaluate_or_load(&request.analytic, slice, &cache, self.run.overwrite)?;
            info!(slice = %slice.name, origin = ?cached.origin, "analytic series ready");
            analytic_origins.push(cached.origin);
            analytic_by_slice.insert(slice.name.clone(), cached.value);
        }
        tracker.advance(RunPhase::AnalyticEvaluated)?;

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let context = RenderContext {
            run_id: &run_id,
            subtests,
            acquired: &acquired,
            analytic_by_slice: &analytic_by_slice,
            request,
        };
        let mut outcomes = Vec::with_capacity(slices.len());
        for (slice, analytic_origin) in slices.iter().zip(analytic_origins) {
            outcomes.push(self.render_slice(&context, slice, analytic_origin)?);
        }
        tracker.advance(RunPhase::Rendered)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(
            &run_id,
            duration_ms,
            acquired.usable_count(),
            acquired.failures.len(),
        );

        Ok(VerificationOutcome {
            run_id,
            phase: tracker.phase(),
            slices: outcomes,
            failures: acquired.failures.clone(),
            simulator_runs: acquired.simulator_runs(),
            duration_ms,
        })
    }

    fn resolve_slices(&self, names: &[String]) -> Result<Vec<&Slice>> {
        if names.is_empty() {
            return Err(VerifyError::Configuration(
                "at least one slice must be requested".to_string(),
            ));
        }
        let mut slices: Vec<&Slice> = Vec::with_capacity(names.len());
        for name in names {
            let slice = self.registry.get(name)?;
            if !slices.iter().any(|s| s.name == slice.name) {
                slices.push(slice);
            }
        }
        Ok(slices)
    }

    fn render_slice(
        &self,
        context: &RenderContext<'_>,
        slice: &Slice,
        analytic_origin: Origin,
    ) -> Result<SliceOutcome> {
        let RenderContext {
            run_id,
            subtests,
            acquired,
            analytic_by_slice,
            request,
        } = *context;
        let analytic = analytic_by_slice
            .get(&slice.name)
            .ok_or_else(|| VerifyError::MissingData {
                slice: slice.name.clone(),
                what: "no analytic series".to_string(),
            })?;

        let mut axes = request.axes.clone();
        axes.annotation = annotation_for(
            slice,
            analytic,
            request.analytic.time_days(),
            request.axes.annotation.as_ref(),
        );

        let by_slice = acquired.by_slice();
        let figure = assemble_figure(
            &by_slice,
            analytic_by_slice,
            &self.registry,
            &slice.name,
            &subtests.ids(),
            &acquired.exclusions_for(&slice.name),
            &axes,
        )?;
        let figure_path = request.output_dir.join(format!("{}.svg", slice.slug()));
        self.backend.draw(&figure, &figure_path)?;

        let comparisons: Vec<SeriesComparison> = by_slice
            .get(&slice.name)
            .map(|observed| {
                observed
                    .iter()
                    .map(|series| compare_series(series, analytic, request.tolerance.as_ref()))
                    .collect()
            })
            .unwrap_or_default();
        let verdict = request
            .tolerance
            .as_ref()
            .map(|tolerance| evaluate_tolerance(&comparisons, tolerance));

        let report = ComparisonReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: run_id.to_string(),
            input_case: self.run.input_case.clone(),
            analytic_case: request.analytic.name.clone(),
            slice: slice.name.clone(),
            time_days: request.analytic.time_days(),
            comparisons,
            excluded: figure.excluded.clone(),
            verdict,
            figure: Some(figure_path.clone()),
        };

        let report_files = if request.write_reports {
            write_reports(&request.output_dir, slice, &report)?
        } else {
            Vec::new()
        };

        Ok(SliceOutcome {
            report,
            figure: figure_path,
            analytic_origin,
            report_files,
        })
    }
}

fn write_reports(dir: &Path, slice: &Slice, report: &ComparisonReport) -> Result<Vec<PathBuf>> {
    let md = dir.join(format!("{}.md", slice.slug()));
    let json = dir.join(format!("{}.json", slice.slug()));
    write_report_md(&md, report)?;
    write_report_json(&json, report)?;
    info!(slice = %slice.name, markdown = %md.display(), json = %json.display(), "reports written");
    Ok(vec![md, json])
}
