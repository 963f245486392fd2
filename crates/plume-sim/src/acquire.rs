//! Result acquisition: cached series, reused simulator output, or a fresh
//! simulator run, per subtest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use plume_core::{
    obs, ArtifactCache, ArtifactKind, CacheKey, Digest, Exclusion, ObservationSeries, ObservationsBySlice,
    Origin, Result, RunConfig, Slice, Subtest, SubtestSet, VerifyError,
};
use serde::Serialize;

use crate::observations::{
    extract_series, latest_by_region, parse_observation_file, parse_observation_points,
};
use crate::runner::{SimulationRequest, Simulator};

/// Everything that determines a subtest's observed series besides the slice.
/// The digests tie cached series to the exact input and output they were
/// extracted from.
#[derive(Serialize)]
struct ObservedIdentity<'a> {
    input_case: &'a str,
    subtest: &'a Subtest,
    variable: Option<&'a str>,
    input_digest: String,
    output_digest: String,
}

/// What to acquire and how.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionPlan<'a> {
    pub run: &'a RunConfig,
    pub subtests: &'a SubtestSet,
    pub slices: &'a [&'a Slice],
    /// Restrict observation rows to this variable.
    pub variable: Option<&'a str>,
}

/// Series acquired for one subtest.
#[derive(Debug, Clone)]
pub struct SubtestResults {
    pub subtest_id: String,
    /// Series by slice name.
    pub series: BTreeMap<String, ObservationSeries>,
    /// Slices on which this subtest has no usable observations, with reason.
    pub slice_failures: BTreeMap<String, String>,
    pub origin: Origin,
    pub simulated: bool,
}

/// Outcome of acquiring every subtest; failures are isolated per subtest.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionReport {
    /// Input description used by each subtest.
    pub inputs: BTreeMap<String, PathBuf>,
    pub by_subtest: BTreeMap<String, SubtestResults>,
    /// Subtests that produced nothing, in subtest order.
    pub failures: Vec<Exclusion>,
}

impl AcquisitionReport {
    /// Per-slice view referencing the by-subtest series.
    pub fn by_slice(&self) -> ObservationsBySlice<'_> {
        let mut view = ObservationsBySlice::new();
        for results in self.by_subtest.values() {
            for (slice, series) in &results.series {
                view.entry(slice.clone()).or_default().push(series);
            }
        }
        view
    }

    /// Subtest-level failures plus slice-level failures for `slice`.
    pub fn exclusions_for(&self, slice: &str) -> Vec<Exclusion> {
        let mut exclusions = self.failures.clone();
        for results in self.by_subtest.values() {
            if let Some(reason) = results.slice_failures.get(slice) {
                exclusions.push(Exclusion {
                    subtest_id: results.subtest_id.clone(),
                    reason: reason.clone(),
                });
            }
        }
        exclusions
    }

    /// Subtest-level failures plus slice-level failures on any of `slices`,
    /// each slice-level reason prefixed with its slice.
    pub fn exclusions_across(&self, slices: &[&str]) -> Vec<Exclusion> {
        let mut exclusions = self.failures.clone();
        for results in self.by_subtest.values() {
            for slice in slices {
                if let Some(reason) = results.slice_failures.get(*slice) {
                    exclusions.push(Exclusion {
                        subtest_id: results.subtest_id.clone(),
                        reason: format!("{slice}: {reason}"),
                    });
                }
            }
        }
        exclusions
    }

    pub fn simulator_runs(&self) -> usize {
        self.by_subtest.values().filter(|r| r.simulated).count()
    }

    pub fn usable_count(&self) -> usize {
        self.by_subtest.values().filter(|r| !r.series.is_empty()).count()
    }
}

/// Acquire observation series for every subtest on every planned slice.
///
/// Subtests run concurrently; a failing subtest is recorded in
/// [`AcquisitionReport::failures`] and does not affect the others.
pub async fn acquire_results(
    simulator: &dyn Simulator,
    cache: &ArtifactCache,
    plan: AcquisitionPlan<'_>,
) -> AcquisitionReport {
    let tasks = plan.subtests.iter().map(|subtest| async move {
        let outcome = acquire_subtest(simulator, cache, &plan, subtest).await;
        (subtest, outcome)
    });
    let outcomes = join_all(tasks).await;

    let mut report = AcquisitionReport::default();
    for (subtest, outcome) in outcomes {
        report
            .inputs
            .insert(subtest.id.clone(), subtest.input_path(plan.run));
        match outcome {
            Ok(results) => {
                for (slice, reason) in &results.slice_failures {
                    obs::emit_subtest_excluded(&subtest.id, &format!("{slice}: {reason}"));
                }
                report.by_subtest.insert(subtest.id.clone(), results);
            }
            Err(e) => {
                obs::emit_subtest_excluded(&subtest.id, &e);
                report.failures.push(Exclusion {
                    subtest_id: subtest.id.clone(),
                    reason: failure_reason(&e),
                });
            }
        }
    }
    report
}

fn failure_reason(error: &VerifyError) -> String {
    match error {
        VerifyError::Simulation { reason, .. } => format!("simulation failed: {reason}"),
        VerifyError::Parse { reason, .. } => format!("parse error: {reason}"),
        other => other.to_string(),
    }
}

fn cache_keys(
    plan: &AcquisitionPlan<'_>,
    subtest: &Subtest,
    input: &[u8],
    output: &[u8],
) -> Result<Vec<CacheKey>> {
    let identity = ObservedIdentity {
        input_case: &plan.run.input_case,
        subtest,
        variable: plan.variable,
        input_digest: Digest::compute(input).to_hex(),
        output_digest: Digest::compute(output).to_hex(),
    };
    plan.slices
        .iter()
        .map(|slice| CacheKey::new(ArtifactKind::Observed, &subtest.id, slice, &identity))
        .collect()
}

/// All planned series for one subtest, or `None` if any is missing.
fn load_all(
    cache: &ArtifactCache,
    slices: &[&Slice],
    keys: &[CacheKey],
    overwrite: bool,
) -> Result<Option<BTreeMap<String, ObservationSeries>>> {
    let mut series = BTreeMap::new();
    for (slice, key) in slices.iter().zip(keys) {
        let entry = cache.entry(key);
        if !entry.trusted(overwrite) {
            obs::emit_cache_miss(&entry.key.to_string(), "absent");
            return Ok(None);
        }
        match cache.lookup::<ObservationSeries>(&entry.key)? {
            Some(loaded) => {
                series.insert(slice.name.clone(), loaded);
            }
            None => return Ok(None),
        }
    }
    Ok(Some(series))
}

async fn read_text(path: &Path, what: &str) -> std::result::Result<String, String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read {what} {}: {e}", path.display()))
}

async fn acquire_subtest(
    simulator: &dyn Simulator,
    cache: &ArtifactCache,
    plan: &AcquisitionPlan<'_>,
    subtest: &Subtest,
) -> Result<SubtestResults> {
    let overwrite = plan.run.overwrite;
    let input = subtest.input_path(plan.run);
    let output = subtest.output_path(plan.run);

    // A missing output artifact invalidates any cached series.
    let simulated = if !overwrite && output.is_file() {
        obs::emit_simulation_reused(&subtest.id, &output);
        false
    } else {
        simulate(simulator, plan.run, subtest, &input, &output).await?;
        true
    };

    let parse_error = |reason: String| VerifyError::Parse {
        subtest_id: subtest.id.clone(),
        slice: None,
        reason,
    };
    let input_text = read_text(&input, "input").await.map_err(parse_error)?;
    let output_text = read_text(&output, "output").await.map_err(parse_error)?;
    let keys = cache_keys(plan, subtest, input_text.as_bytes(), output_text.as_bytes())?;

    if !simulated {
        if let Some(series) = load_all(cache, plan.slices, &keys, overwrite)? {
            return Ok(SubtestResults {
                subtest_id: subtest.id.clone(),
                series,
                slice_failures: BTreeMap::new(),
                origin: Origin::Loaded,
                simulated,
            });
        }
    }

    let points = parse_observation_points(&input_text).map_err(parse_error)?;
    let records = parse_observation_file(&output_text).map_err(parse_error)?;
    let values = latest_by_region(&records, plan.variable);

    let mut series = BTreeMap::new();
    let mut slice_failures = BTreeMap::new();
    for (slice, key) in plan.slices.iter().zip(&keys) {
        match extract_series(&subtest.id, slice, &points, &values) {
            Ok(extracted) => {
                cache.store(key, &extracted)?;
                series.insert(slice.name.clone(), extracted);
            }
            Err(VerifyError::Parse { reason, .. }) => {
                slice_failures.insert(slice.name.clone(), format!("parse error: {reason}"));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(SubtestResults {
        subtest_id: subtest.id.clone(),
        series,
        slice_failures,
        origin: Origin::Computed,
        simulated,
    })
}

async fn simulate(
    simulator: &dyn Simulator,
    run: &RunConfig,
    subtest: &Subtest,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let failed = |reason: String| VerifyError::Simulation {
        subtest_id: subtest.id.clone(),
        reason,
    };

    // A stale artifact must not stand in for a run that produced none.
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(failed(format!("cannot remove stale output: {e}"))),
    }

    let request = SimulationRequest {
        subtest_id: subtest.id.clone(),
        input: input.to_path_buf(),
        run_dir: subtest.run_dir(run),
        extra_args: subtest.args.clone(),
    };
    let outcome = simulator
        .run(&request)
        .await
        .map_err(|e| failed(e.to_string()))?;

    if !outcome.passed() {
        let reason = match outcome.stderr_tail() {
            Some(tail) => format!("exited with code {}: {tail}", outcome.exit_code),
            None => format!("exited with code {}", outcome.exit_code),
        };
        return Err(failed(reason));
    }
    if !output.is_file() {
        return Err(failed(format!("no output artifact at {}", output.display())));
    }
    Ok(())
}
