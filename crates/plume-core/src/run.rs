//! Run-level configuration and the pipeline state machine.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Result, VerifyError};

/// Explicit per-run settings passed into every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Input description shared by subtests that do not name their own.
    pub input_case: String,
    /// Base directory for relative paths and default run directories.
    pub work_dir: PathBuf,
    /// Root of the artifact cache.
    pub cache_dir: PathBuf,
    /// Force recomputation of simulated and analytic results.
    pub overwrite: bool,
}

impl RunConfig {
    /// A relative `work_dir` is anchored to the current directory, since the
    /// simulator runs inside its own run directory.
    pub fn new(input_case: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let work_dir = std::path::absolute(&work_dir).unwrap_or(work_dir);
        Self {
            input_case: input_case.into(),
            cache_dir: work_dir.join(".plume-cache"),
            work_dir,
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = self.resolve(cache_dir.into());
        self
    }

    /// Resolve `path` against the work directory unless it is absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }
}

/// Pipeline phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Init,
    SlicesDefined,
    ResultsAcquired,
    AnalyticEvaluated,
    Rendered,
}

impl RunPhase {
    pub fn next(self) -> Option<RunPhase> {
        match self {
            RunPhase::Init => Some(RunPhase::SlicesDefined),
            RunPhase::SlicesDefined => Some(RunPhase::ResultsAcquired),
            RunPhase::ResultsAcquired => Some(RunPhase::AnalyticEvaluated),
            RunPhase::AnalyticEvaluated => Some(RunPhase::Rendered),
            RunPhase::Rendered => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "INIT",
            RunPhase::SlicesDefined => "SLICES_DEFINED",
            RunPhase::ResultsAcquired => "RESULTS_ACQUIRED",
            RunPhase::AnalyticEvaluated => "ANALYTIC_EVALUATED",
            RunPhase::Rendered => "RENDERED",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one run's identity and phase; phases may only advance one step.
#[derive(Debug, Clone)]
pub struct RunTracker {
    run_id: Uuid,
    phase: RunPhase,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunPhase::Init,
        }
    }

    pub fn run_id(&self) -> String {
        self.run_id.to_string()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance(&mut self, to: RunPhase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(VerifyError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        tracing::debug!(run_id = %self.run_id, from = %self.phase, to = %to, "phase transition");
        self.phase = to;
        Ok(())
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_advance_in_order() {
        let mut tracker = RunTracker::new();
        assert_eq!(tracker.phase(), RunPhase::Init);
        tracker.advance(RunPhase::SlicesDefined).unwrap();
        tracker.advance(RunPhase::ResultsAcquired).unwrap();
        tracker.advance(RunPhase::AnalyticEvaluated).unwrap();
        tracker.advance(RunPhase::Rendered).unwrap();
        assert_eq!(tracker.phase(), RunPhase::Rendered);
        assert!(tracker.phase().next().is_none());
    }

    #[test]
    fn test_skipping_a_phase_fails() {
        let mut tracker = RunTracker::new();
        let err = tracker.advance(RunPhase::ResultsAcquired).unwrap_err();
        assert!(err.to_string().contains("INIT"));
        assert!(err.to_string().contains("RESULTS_ACQUIRED"));
        assert_eq!(tracker.phase(), RunPhase::Init);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunTracker::new().run_id(), RunTracker::new().run_id());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = RunConfig::new("case.xml", "/work").with_cache_dir("cache");
        assert_eq!(config.cache_dir, PathBuf::from("/work/cache"));
        assert_eq!(config.resolve("/abs/file"), PathBuf::from("/abs/file"));
        assert_eq!(config.resolve("rel/file"), PathBuf::from("/work/rel/file"));
        assert!(!config.overwrite);
    }

    #[test]
    fn test_relative_work_dir_is_anchored() {
        let cwd = std::env::current_dir().unwrap();
        let config = RunConfig::new("case.xml", "demos");
        assert_eq!(config.work_dir, cwd.join("demos"));
        assert_eq!(config.cache_dir, cwd.join("demos").join(".plume-cache"));
        assert!(config.resolve("case.xml").is_absolute());
    }
}
