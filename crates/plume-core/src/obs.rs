//! Structured observability hooks for verification runs.
//!
//! This module provides:
//! - A run-scoped tracing span (`run_span`) for instrumenting futures
//! - Emission functions for key lifecycle events: run start/finish, simulator
//!   invocations, cache decisions, subtest exclusions and tolerance verdicts
//!
//! Events are emitted at `info!` level unless noted. For JSON output pass
//! `--json` to the CLI.

use std::path::Path;

use tracing::{info, warn};

/// Run-scoped span carrying `run_id` and `input_case`.
///
/// # Example
///
/// ```ignore
/// async { /* every event logged here carries the run fields */ }
///     .instrument(run_span("5b0e6f1c-...", "dispersion_aligned_point_2d"))
///     .await
/// ```
pub fn run_span(run_id: &str, input_case: &str) -> tracing::Span {
    tracing::info_span!("plume.run", run_id = %run_id, input_case = %input_case)
}

pub fn emit_run_started(run_id: &str, input_case: &str, subtests: usize, overwrite: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        input_case = %input_case,
        subtests = subtests,
        overwrite = overwrite,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, usable_subtests: usize, excluded: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        usable_subtests = usable_subtests,
        excluded = excluded,
    );
}

pub fn emit_simulation_started(subtest_id: &str, command: &str) {
    info!(event = "simulation.started", subtest = %subtest_id, command = %command);
}

pub fn emit_simulation_finished(subtest_id: &str, exit_code: i32, duration_ms: u64) {
    info!(
        event = "simulation.finished",
        subtest = %subtest_id,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

/// Simulator output already present; execution skipped.
pub fn emit_simulation_reused(subtest_id: &str, artifact: &Path) {
    info!(event = "simulation.reused", subtest = %subtest_id, artifact = %artifact.display());
}

pub fn emit_cache_hit(key: &str) {
    tracing::debug!(event = "cache.hit", key = %key);
}

pub fn emit_cache_miss(key: &str, reason: &str) {
    tracing::debug!(event = "cache.miss", key = %key, reason = %reason);
}

/// Unreadable cache artifact (warning level); the value is recomputed.
pub fn emit_cache_corrupt(path: &Path, reason: &str) {
    warn!(event = "cache.corrupt", path = %path.display(), reason = %reason);
}

/// Subtest dropped from comparison (warning level).
pub fn emit_subtest_excluded(subtest_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "subtest.excluded", subtest = %subtest_id, reason = %reason);
}

pub fn emit_tolerance_evaluated(slice: &str, subtest_id: &str, compared: usize, passed: bool) {
    info!(
        event = "tolerance.evaluated",
        slice = %slice,
        subtest = %subtest_id,
        compared = compared,
        passed = passed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = run_span("test-run-id", "case").entered();
        emit_cache_hit("analytic:case:centerline@000000000000");
    }
}
