//! TOML harness configuration.
//!
//! ```toml
//! input_case = "dispersion_aligned_point_2d.xml"
//! default_slice = "centerline"
//!
//! [simulator]
//! command = ["amanzi", "--xml_file={input}"]
//! timeout_secs = 3600
//! variable = "aqueous_conc"
//!
//! [[subtests]]
//! id = "amanzi"
//!
//! [analytic]
//! name = "analytic"
//! # ...
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analytic::AnalyticCase;
use crate::compare::Tolerance;
use crate::error::{Result, VerifyError};
use crate::plot::AxesConfig;
use crate::run::RunConfig;
use crate::slice::{define_slices, Slice, SliceRegistry};
use crate::subtest::{Subtest, SubtestSet};

fn default_timeout_secs() -> u64 {
    3600
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".plume-cache")
}

fn default_slice() -> String {
    "centerline".to_string()
}

/// How to launch the external simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Program and arguments; `{input}` is replaced by the input path, or the
    /// path is appended when no argument carries the placeholder.
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Restrict observations to this variable name.
    #[serde(default)]
    pub variable: Option<String>,
}

impl SimulatorConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: default_timeout_secs(),
            variable: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.command.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => {
                return Err(VerifyError::Configuration(
                    "simulator.command must name a program".to_string(),
                ))
            }
        }
        if self.timeout_secs == 0 {
            return Err(VerifyError::Configuration(
                "simulator.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contents of a harness file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub input_case: String,
    /// Base directory for relative paths; defaults to the file's directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_slice")]
    pub default_slice: String,
    pub simulator: SimulatorConfig,
    pub subtests: Vec<Subtest>,
    /// Replaces the built-in slice registry when present.
    #[serde(default)]
    pub slices: Option<Vec<Slice>>,
    #[serde(default = "AnalyticCase::aligned_point_2d")]
    pub analytic: AnalyticCase,
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
    #[serde(default)]
    pub plot: AxesConfig,
}

impl HarnessConfig {
    /// Read and validate a harness file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)
            .map_err(|e| match e {
                VerifyError::Configuration(msg) => {
                    VerifyError::Configuration(format!("{}: {msg}", path.display()))
                }
                other => other,
            })?;
        if config.work_dir.is_none() {
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            config.work_dir = Some(base.to_path_buf());
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| VerifyError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        if self.input_case.trim().is_empty() {
            return Err(VerifyError::Configuration(
                "input_case must not be empty".to_string(),
            ));
        }
        self.simulator.validate()?;
        self.subtest_set()?;
        self.analytic.validate()?;
        if let Some(tolerance) = &self.tolerance {
            tolerance.validate()?;
        }
        self.registry()?.get(&self.default_slice)?;
        Ok(())
    }

    /// Configured slices, or the built-in registry.
    pub fn registry(&self) -> Result<SliceRegistry> {
        match &self.slices {
            Some(slices) => SliceRegistry::new(slices.iter().cloned()),
            None => define_slices(),
        }
    }

    pub fn subtest_set(&self) -> Result<SubtestSet> {
        SubtestSet::new(self.subtests.clone())
    }

    pub fn run_config(&self, overwrite: bool) -> RunConfig {
        let work_dir = self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        RunConfig::new(self.input_case.clone(), work_dir)
            .with_cache_dir(self.cache_dir.clone())
            .with_overwrite(self.overwrite || overwrite)
    }
}
