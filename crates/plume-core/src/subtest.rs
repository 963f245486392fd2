//! Simulation variants compared against the same analytic reference.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::run::RunConfig;
use crate::slice::slugify;

fn default_output_file() -> String {
    "observation.out".to_string()
}

/// One simulator configuration whose results are compared to the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subtest {
    /// Unique id; also the legend label.
    pub id: String,
    /// Input description; defaults to the run's input case.
    #[serde(default)]
    pub input_file: Option<PathBuf>,
    /// Directory the simulator runs in; defaults to `<work_dir>/<id>`.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,
    /// Observation file written by the simulator, relative to the run dir.
    #[serde(default = "default_output_file")]
    pub output_file: String,
    /// Extra simulator arguments for this variant.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Subtest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_file: None,
            run_dir: None,
            output_file: default_output_file(),
            args: Vec::new(),
        }
    }

    pub fn with_input(mut self, input_file: impl Into<PathBuf>) -> Self {
        self.input_file = Some(input_file.into());
        self
    }

    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(run_dir.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Input description path, resolved against the work directory.
    pub fn input_path(&self, config: &RunConfig) -> PathBuf {
        let input = self
            .input_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.input_case));
        config.resolve(input)
    }

    pub fn run_dir(&self, config: &RunConfig) -> PathBuf {
        match &self.run_dir {
            Some(dir) => config.resolve(dir.clone()),
            None => config.work_dir.join(slugify(&self.id)),
        }
    }

    /// Where the simulator's observation file is expected.
    pub fn output_path(&self, config: &RunConfig) -> PathBuf {
        self.run_dir(config).join(&self.output_file)
    }
}

/// Validated, ordered collection of subtests with unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtestSet {
    subtests: Vec<Subtest>,
}

impl SubtestSet {
    pub fn new(subtests: Vec<Subtest>) -> Result<Self> {
        if subtests.is_empty() {
            return Err(VerifyError::Configuration(
                "at least one subtest must be defined".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        let mut slugs = BTreeSet::new();
        for subtest in &subtests {
            if subtest.id.trim().is_empty() {
                return Err(VerifyError::Configuration(
                    "subtest id must not be empty".to_string(),
                ));
            }
            if !seen.insert(subtest.id.as_str()) {
                return Err(VerifyError::Configuration(format!(
                    "duplicate subtest id '{}'",
                    subtest.id
                )));
            }
            // Distinct ids that share a slug would share a run directory.
            if subtest.run_dir.is_none() && !slugs.insert(slugify(&subtest.id)) {
                return Err(VerifyError::Configuration(format!(
                    "subtest id '{}' collides with another id's run directory",
                    subtest.id
                )));
            }
            if subtest.output_file.trim().is_empty() {
                return Err(VerifyError::Configuration(format!(
                    "subtest '{}' has an empty output_file",
                    subtest.id
                )));
            }
        }
        Ok(Self { subtests })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subtest> {
        self.subtests.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.subtests.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.subtests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SubtestSet::new(vec![Subtest::new("mesh"), Subtest::new("mesh")]).unwrap_err();
        assert!(err.to_string().contains("duplicate subtest id 'mesh'"));
    }

    #[test]
    fn test_slug_collision_rejected() {
        let err = SubtestSet::new(vec![Subtest::new("h=5"), Subtest::new("h 5")]).unwrap_err();
        assert!(err.to_string().contains("collides"));

        // explicit run dirs disambiguate
        let ok = SubtestSet::new(vec![
            Subtest::new("h=5").with_run_dir("a"),
            Subtest::new("h 5").with_run_dir("b"),
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(SubtestSet::new(vec![]).is_err());
    }

    #[test]
    fn test_paths_resolve_against_work_dir() {
        let config = RunConfig::new("case.xml", "/tmp/work");
        let subtest = Subtest::new("fine mesh");
        assert_eq!(subtest.input_path(&config), PathBuf::from("/tmp/work/case.xml"));
        assert_eq!(subtest.run_dir(&config), PathBuf::from("/tmp/work/fine_mesh"));
        assert_eq!(
            subtest.output_path(&config),
            PathBuf::from("/tmp/work/fine_mesh/observation.out")
        );

        let custom = Subtest::new("coarse")
            .with_input("/data/coarse.xml")
            .with_run_dir("runs/coarse");
        assert_eq!(custom.input_path(&config), PathBuf::from("/data/coarse.xml"));
        assert_eq!(custom.run_dir(&config), PathBuf::from("/tmp/work/runs/coarse"));
    }

    #[test]
    fn test_subtest_toml_defaults() {
        let subtest: Subtest = toml::from_str(r#"id = "amanzi""#).unwrap();
        assert_eq!(subtest.output_file, "observation.out");
        assert!(subtest.args.is_empty());
        assert!(subtest.input_file.is_none());
    }
}
