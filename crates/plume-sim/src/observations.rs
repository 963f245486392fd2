//! Observation points from the input description and observed values from
//! the simulator's observation file.

use std::collections::BTreeMap;

use plume_core::{ObservationSeries, Result, Slice, VerifyError};
use regex::Regex;

/// A named observation location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationPoint {
    pub x: f64,
    pub y: f64,
}

/// One data row of an observation file.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub name: String,
    pub region: String,
    pub functional: String,
    pub variable: String,
    pub time: f64,
    pub value: f64,
}

const REGION_BLOCK: &str = r#"(?s)<region\b([^>]*)>(.*?)</region>"#;
const NAME_ATTR: &str = r#"\bname\s*=\s*"([^"]+)""#;
const POINT_COORDINATE: &str = r#"<point\b[^>]*\bcoordinate\s*=\s*"\(?([^")]*)\)?""#;
// An optional nested "Region: Point" list may wrap the Coordinate parameter.
const PARAMETER_LIST: &str = r#"(?s)<ParameterList\b[^>]*\bname\s*=\s*"([^"]+)"[^>]*>\s*(?:<ParameterList\b[^>]*>\s*)?<Parameter\b[^>]*\bname\s*=\s*"Coordinate"[^>]*\bvalue\s*=\s*"\{?([^"}]*)\}?""#;

fn compile(pattern: &str) -> std::result::Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))
}

fn parse_coordinate(text: &str) -> std::result::Result<ObservationPoint, String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("expected 2 or 3 components in coordinate '{text}'"));
    }
    let component = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("invalid coordinate component '{s}'"))
    };
    Ok(ObservationPoint {
        x: component(parts[0])?,
        y: component(parts[1])?,
    })
}

/// Collect point regions from an input description.
///
/// Accepts `<region name="N"><point coordinate="(x, y[, z])"/></region>` and
/// `<ParameterList name="N"><Parameter name="Coordinate" value="{x, y[, z]}"/>`.
/// A region defined twice keeps its first definition.
pub fn parse_observation_points(
    input: &str,
) -> std::result::Result<BTreeMap<String, ObservationPoint>, String> {
    let region_block = compile(REGION_BLOCK)?;
    let name_attr = compile(NAME_ATTR)?;
    let point_coordinate = compile(POINT_COORDINATE)?;
    let parameter_list = compile(PARAMETER_LIST)?;

    let mut found = Vec::new();
    for block in region_block.captures_iter(input) {
        let (Some(name), Some(point)) = (
            name_attr.captures(&block[1]),
            point_coordinate.captures(&block[2]),
        ) else {
            continue;
        };
        found.push((name[1].trim().to_string(), point[1].to_string()));
    }
    for list in parameter_list.captures_iter(input) {
        found.push((list[1].trim().to_string(), list[2].to_string()));
    }

    let mut points = BTreeMap::new();
    for (name, coordinate) in found {
        let point = parse_coordinate(&coordinate).map_err(|e| format!("region '{name}': {e}"))?;
        points.entry(name).or_insert(point);
    }
    Ok(points)
}

/// Parse an observation file.
///
/// The first line is a header, optionally followed by a separator of `=`
/// characters; every further non-blank line is
/// `name, region, functional, variable, time, value`.
pub fn parse_observation_file(content: &str) -> std::result::Result<Vec<ObservationRecord>, String> {
    let mut lines = content.lines().enumerate().peekable();
    if lines.next().is_none() {
        return Err("observation file is empty".to_string());
    }
    if let Some((_, line)) = lines.peek() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c == '=') {
            lines.next();
        }
    }

    let mut records = Vec::new();
    for (index, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(format!(
                "line {}: expected 6 fields, found {}",
                index + 1,
                fields.len()
            ));
        }
        let number = |s: &str, what: &str| {
            s.parse::<f64>()
                .map_err(|_| format!("line {}: invalid {what} '{s}'", index + 1))
        };
        records.push(ObservationRecord {
            name: fields[0].to_string(),
            region: fields[1].to_string(),
            functional: fields[2].to_string(),
            variable: fields[3].to_string(),
            time: number(fields[4], "time")?,
            value: number(fields[5], "value")?,
        });
    }
    Ok(records)
}

/// Value at the latest observed time for each region, optionally restricted
/// to one variable.
pub fn latest_by_region(records: &[ObservationRecord], variable: Option<&str>) -> BTreeMap<String, f64> {
    let mut latest: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for record in records {
        if variable.is_some_and(|v| v != record.variable) {
            continue;
        }
        latest
            .entry(record.region.clone())
            .and_modify(|(time, value)| {
                if record.time >= *time {
                    *time = record.time;
                    *value = record.value;
                }
            })
            .or_insert((record.time, record.value));
    }
    latest.into_iter().map(|(region, (_, value))| (region, value)).collect()
}

/// Build the series for `slice` from every region lying on it.
///
/// Regions without an observed value are skipped. Fails with a parse error
/// when no observation falls on the slice.
pub fn extract_series(
    subtest_id: &str,
    slice: &Slice,
    points: &BTreeMap<String, ObservationPoint>,
    values: &BTreeMap<String, f64>,
) -> Result<ObservationSeries> {
    let on_slice: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|(region, point)| {
            let coordinate = slice.locate(point.x, point.y)?;
            let value = values.get(region)?;
            Some((coordinate, *value))
        })
        .collect();

    if on_slice.is_empty() {
        return Err(VerifyError::Parse {
            subtest_id: subtest_id.to_string(),
            slice: Some(slice.name.clone()),
            reason: "no observation points lie on the slice".to_string(),
        });
    }
    ObservationSeries::from_points(subtest_id, slice, on_slice)
}
