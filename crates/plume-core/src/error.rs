//! Error taxonomy for the verification harness.

use std::path::PathBuf;

/// Why a subtest was excluded from comparison.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Exclusion {
    pub subtest_id: String,
    pub reason: String,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subtest_id, self.reason)
    }
}

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown slice '{name}' (registered: {registered})")]
    UnknownSlice { name: String, registered: String },

    #[error("simulation failed for subtest '{subtest_id}': {reason}")]
    Simulation { subtest_id: String, reason: String },

    #[error("parse error for subtest '{subtest_id}'{}: {reason}", slice_suffix(.slice))]
    Parse {
        subtest_id: String,
        slice: Option<String>,
        reason: String,
    },

    #[error("invalid analytic parameters: {0}")]
    Domain(String),

    #[error("unreadable cache artifact {path:?}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("no data for slice '{slice}': {what}")]
    MissingData { slice: String, what: String },

    #[error("no usable subtests for slice '{slice}'{}", format_exclusions(.excluded))]
    NoUsableSubtests {
        /// Slice name; several are comma-separated.
        slice: String,
        excluded: Vec<Exclusion>,
    },

    #[error("render error: {0}")]
    Render(String),

    #[error("invalid run transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn slice_suffix(slice: &Option<String>) -> String {
    match slice {
        Some(name) => format!(" on slice '{name}'"),
        None => String::new(),
    }
}

fn format_exclusions(excluded: &[Exclusion]) -> String {
    if excluded.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = excluded.iter().map(ToString::to_string).collect();
    format!("; excluded: {}", parts.join("; "))
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_names_slice() {
        let err = VerifyError::Parse {
            subtest_id: "h=5m".to_string(),
            slice: Some("centerline".to_string()),
            reason: "no observation points".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("h=5m"));
        assert!(msg.contains("centerline"));
        assert!(msg.contains("no observation points"));
    }

    #[test]
    fn test_parse_error_display_without_slice() {
        let err = VerifyError::Parse {
            subtest_id: "h=5m".to_string(),
            slice: None,
            reason: "line 3: expected 6 fields".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error for subtest 'h=5m': line 3: expected 6 fields"
        );
    }

    #[test]
    fn test_no_usable_subtests_lists_reasons() {
        let err = VerifyError::NoUsableSubtests {
            slice: "x=424.0".to_string(),
            excluded: vec![
                Exclusion {
                    subtest_id: "coarse".to_string(),
                    reason: "simulator exited with code 1".to_string(),
                },
                Exclusion {
                    subtest_id: "fine".to_string(),
                    reason: "observation file missing".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("x=424.0"));
        assert!(msg.contains("coarse: simulator exited with code 1"));
        assert!(msg.contains("fine: observation file missing"));
    }
}
