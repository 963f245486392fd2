//! Markdown and JSON comparison reports.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::write_atomic;
use crate::compare::{SeriesComparison, ToleranceVerdict};
use crate::error::{Exclusion, Result};
use crate::series::AnalyticSeries;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Persisted outcome of comparing one slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub input_case: String,
    pub analytic_case: String,
    pub slice: String,
    pub time_days: f64,
    pub comparisons: Vec<SeriesComparison>,
    pub excluded: Vec<Exclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ToleranceVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure: Option<PathBuf>,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4e}"))
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_mark(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "✓",
        Some(false) => "✗",
        None => "-",
    }
}

/// Render the report as markdown, one table per subtest.
pub fn render_report_md(report: &ComparisonReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Comparison: {}\n\n", report.slice));
    out.push_str(&format!(
        "- input case: `{}`\n- analytic case: `{}` at t = {} days\n- run: `{}`\n- generated: {}\n",
        report.input_case,
        report.analytic_case,
        report.time_days,
        report.run_id,
        report.generated_at.to_rfc3339()
    ));
    if let Some(figure) = &report.figure {
        out.push_str(&format!("- figure: `{}`\n", figure.display()));
    }
    out.push('\n');

    for comparison in &report.comparisons {
        out.push_str(&format!("## {}\n\n", comparison.subtest_id));
        out.push_str("| coordinate | simulated | analytic | abs. deviation | rel. deviation | ok |\n");
        out.push_str("|---:|---:|---:|---:|---:|:-:|\n");
        for row in &comparison.rows {
            out.push_str(&format!(
                "| {} | {:.4e} | {} | {} | {} | {} |\n",
                row.coordinate,
                row.simulated,
                fmt_opt(row.analytic),
                fmt_opt(row.abs_deviation),
                fmt_pct(row.rel_deviation),
                fmt_mark(row.within_tolerance)
            ));
        }
        out.push('\n');
    }

    if !report.excluded.is_empty() {
        out.push_str("## Excluded\n");
        for exclusion in &report.excluded {
            out.push_str(&format!("- `{}`: {}\n", exclusion.subtest_id, exclusion.reason));
        }
        out.push('\n');
    }

    if let Some(verdict) = &report.verdict {
        out.push_str("## Tolerance\n");
        out.push_str(&format!(
            "{} {}\n",
            if verdict.passed { "✓" } else { "✗" },
            verdict.message
        ));
        for violation in &verdict.violations {
            out.push_str(&format!("- {violation}\n"));
        }
    }
    out
}

/// Write the markdown report.
pub fn write_report_md(path: &Path, report: &ComparisonReport) -> Result<()> {
    write_atomic(path, render_report_md(report).as_bytes())
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &ComparisonReport) -> Result<()> {
    let content = serde_json::to_vec_pretty(report)?;
    write_atomic(path, &content)
}

/// Render an analytic profile as a two-column markdown table, keeping every
/// `stride`-th sample plus the last one.
pub fn render_profile_md(series: &AnalyticSeries, coordinate_label: &str, stride: usize) -> String {
    let stride = stride.max(1);
    let mut out = String::new();
    out.push_str(&format!("| {coordinate_label} [m] | concentration |\n"));
    out.push_str("|---:|---:|\n");
    let last = series.len().saturating_sub(1);
    for (i, (coordinate, value)) in series.points().enumerate() {
        if i % stride == 0 || i == last {
            out.push_str(&format!("| {coordinate:.3} | {value:.6e} |\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ComparisonRow;

    fn sample_report() -> ComparisonReport {
        ComparisonReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("parse RFC3339")
                .with_timezone(&Utc),
            run_id: "11111111-1111-1111-1111-111111111111".to_string(),
            input_case: "dispersion_aligned_point_2d.xml".to_string(),
            analytic_case: "analytic".to_string(),
            slice: "centerline".to_string(),
            time_days: 1440.0,
            comparisons: vec![SeriesComparison {
                subtest_id: "amanzi".to_string(),
                slice_name: "centerline".to_string(),
                rows: vec![
                    ComparisonRow {
                        coordinate: 150.0,
                        simulated: 0.004,
                        analytic: Some(0.00399),
                        abs_deviation: Some(1e-5),
                        rel_deviation: Some(0.0025),
                        within_tolerance: Some(true),
                    },
                    ComparisonRow {
                        coordinate: 1200.0,
                        simulated: 1e-6,
                        analytic: None,
                        abs_deviation: None,
                        rel_deviation: None,
                        within_tolerance: None,
                    },
                ],
            }],
            excluded: vec![Exclusion {
                subtest_id: "coarse".to_string(),
                reason: "simulator exited with code 1".to_string(),
            }],
            verdict: None,
            figure: Some(PathBuf::from("centerline.svg")),
        }
    }

    #[test]
    fn markdown_contains_tables_and_exclusions() {
        let md = render_report_md(&sample_report());
        assert!(md.starts_with("# Comparison: centerline"));
        assert!(md.contains("## amanzi"));
        assert!(md.contains("| 150 | 4.0000e-3 | 3.9900e-3 |"));
        assert!(md.contains("0.25%"));
        assert!(md.contains("| 1200 | 1.0000e-6 | - | - | - | - |"));
        assert!(md.contains("- `coarse`: simulator exited with code 1"));
        assert!(!md.contains("## Tolerance"));
    }

    #[test]
    fn json_schema_has_expected_keys() {
        let value = serde_json::to_value(sample_report()).expect("serialize report");
        for key in [
            "schema_version",
            "generated_at",
            "run_id",
            "input_case",
            "analytic_case",
            "slice",
            "time_days",
            "comparisons",
            "excluded",
            "figure",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert!(value.get("verdict").is_none());
    }

    #[test]
    fn report_files_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json_path = dir.path().join("report.json");
        let md_path = dir.path().join("report.md");
        let report = sample_report();

        write_report_json(&json_path, &report).expect("write json");
        write_report_md(&md_path, &report).expect("write md");

        let loaded: ComparisonReport =
            serde_json::from_slice(&std::fs::read(&json_path).expect("read json"))
                .expect("parse json");
        assert_eq!(loaded, report);
        let md = std::fs::read_to_string(&md_path).expect("read md");
        assert!(md.contains("figure: `centerline.svg`"));
    }

    #[test]
    fn profile_table_keeps_last_sample() {
        let series = AnalyticSeries::new(
            "analytic",
            "centerline",
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![5.0, 4.0, 3.0, 2.0, 1.0],
        );
        let md = render_profile_md(&series, "x", 3);
        let rows: Vec<&str> = md.lines().skip(2).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("| 0.000 |"));
        assert!(rows[1].starts_with("| 3.000 |"));
        assert!(rows[2].starts_with("| 4.000 |"));
    }
}
