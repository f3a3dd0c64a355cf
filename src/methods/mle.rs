//! Helpers shared by the adapters for walking HyPhy JSON, mostly the `MLE`
//! table (`MLE.headers` as `[name, description]` pairs, `MLE.content.0` as rows).

use crate::domain::model::{AnalysisResult, FieldValue, Record, SiteData};
use serde_json::Value;
use std::collections::HashMap;

/// p-value threshold used by FEL, MEME and PRIME.
pub const P_THRESHOLD: f64 = 0.05;

/// Key under `branch attributes.0.<branch>` for separate-rate MG94 fits.
const MG94_SEPARATE_RATES: &str = "MG94xREV with separate rates for branch sets";

/// Follows a dotted path such as `test results.p-value`. Numeric segments
/// also index into arrays.
pub fn lookup_path<'a>(raw: &'a AnalysisResult, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn has_mle_headers(raw: &AnalysisResult) -> bool {
    raw.pointer("/MLE/headers").is_some()
}

pub fn has_mle_content(raw: &AnalysisResult) -> bool {
    raw.pointer("/MLE/content/0").is_some()
}

/// `(name, description)` for every MLE column, in column order.
pub fn headers(raw: &AnalysisResult) -> Vec<(String, String)> {
    raw.pointer("/MLE/headers")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .map(|col| {
                    let name = col.get(0).and_then(Value::as_str).unwrap_or_default();
                    let desc = col.get(1).and_then(Value::as_str).unwrap_or_default();
                    (name.to_string(), desc.to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn header_indices(raw: &AnalysisResult) -> HashMap<String, usize> {
    headers(raw)
        .into_iter()
        .enumerate()
        .map(|(idx, (name, _))| (name, idx))
        .collect()
}

/// First column whose lowercased name starts with `prefix`.
pub fn find_column_prefix(raw: &AnalysisResult, prefix: &str) -> Option<usize> {
    headers(raw)
        .iter()
        .position(|(name, _)| name.to_lowercase().starts_with(prefix))
}

/// Rows of `MLE.content.0`; each row is a JSON array.
pub fn rows(raw: &AnalysisResult) -> &[Value] {
    raw.pointer("/MLE/content/0")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// One record per MLE row, keyed by 1-based site index.
pub fn site_records<F>(raw: &AnalysisResult, mut per_row: F) -> SiteData
where
    F: FnMut(&Value) -> Record,
{
    rows(raw)
        .iter()
        .enumerate()
        .map(|(idx, row)| (idx + 1, per_row(row)))
        .collect()
}

/// Numeric cell, accepting numbers or numeric strings.
pub fn cell_f64(row: &Value, idx: usize) -> Option<f64> {
    match row.get(idx)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn format_p(p: f64) -> String {
    format!("{:.3}", p)
}

/// `sites`, `N` and `T`, each falling back through the schema versions HyPhy has used.
pub fn common_fields(raw: &AnalysisResult) -> Record {
    let mut record = Record::new();

    let sites = lookup_path(raw, "input.number of sites")
        .or_else(|| lookup_path(raw, "input.sites"))
        .map(FieldValue::from_json)
        .or_else(|| {
            raw.pointer("/MLE/content/0")
                .and_then(Value::as_array)
                .map(|r| FieldValue::from(r.len()))
        })
        .unwrap_or(FieldValue::Missing);
    record.insert("sites", sites);

    let n = lookup_path(raw, "input.number of sequences")
        .map(FieldValue::from_json)
        .or_else(|| count_entries(lookup_path(raw, "input.sequences")))
        .or_else(|| count_entries(lookup_path(raw, "tested.sequences")))
        .unwrap_or(FieldValue::Missing);
    record.insert("N", n);

    let t = total_branch_length(raw)
        .map(FieldValue::Number)
        .unwrap_or(FieldValue::Missing);
    record.insert("T", t);

    record
}

fn count_entries(value: Option<&Value>) -> Option<FieldValue> {
    match value? {
        Value::Array(items) => Some(FieldValue::from(items.len())),
        Value::Object(map) => Some(FieldValue::from(map.len())),
        _ => None,
    }
}

fn total_branch_length(raw: &AnalysisResult) -> Option<f64> {
    let branches = raw.pointer("/branch attributes/0")?.as_object()?;
    let lengths: Vec<f64> = branches
        .values()
        .filter_map(|branch| match branch {
            Value::Object(attrs) => attrs
                .get("length")
                .or_else(|| attrs.get(MG94_SEPARATE_RATES))
                .and_then(as_f64),
            other => as_f64(other),
        })
        .collect();

    if lengths.is_empty() {
        None
    } else {
        Some(lengths.iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_path_handles_spaces_and_indices() {
        let raw = json!({
            "test results": {"p-value": 0.01},
            "MLE": {"content": {"0": [[1, 2], [3, 4]]}}
        });

        assert_eq!(lookup_path(&raw, "test results.p-value"), Some(&json!(0.01)));
        assert_eq!(lookup_path(&raw, "MLE.content.0.1.0"), Some(&json!(3)));
        assert!(lookup_path(&raw, "fits.Unconstrained model").is_none());
    }

    #[test]
    fn test_common_fields_fallbacks() {
        let raw = json!({
            "input": {"number of sequences": 8, "number of sites": 100},
            "branch attributes": {"0": {
                "a": {"length": 0.5},
                "b": {"MG94xREV with separate rates for branch sets": 0.25},
                "c": "0.25"
            }}
        });

        let record = common_fields(&raw);
        assert_eq!(record.get("N"), Some(&FieldValue::Integer(8)));
        assert_eq!(record.get("sites"), Some(&FieldValue::Integer(100)));
        assert_eq!(record.get("T"), Some(&FieldValue::Number(1.0)));
    }

    #[test]
    fn test_common_fields_missing_are_na() {
        let record = common_fields(&json!({}));
        assert_eq!(record.get("N"), Some(&FieldValue::Missing));
        assert_eq!(record.get("T"), Some(&FieldValue::Missing));
        assert_eq!(record.get("sites"), Some(&FieldValue::Missing));
    }

    #[test]
    fn test_sites_from_mle_rows_and_sequences_from_tested() {
        let raw = json!({
            "MLE": {"content": {"0": [[0.1], [0.2], [0.3]]}},
            "tested": {"sequences": ["s1", "s2"]}
        });

        let record = common_fields(&raw);
        assert_eq!(record.get("sites"), Some(&FieldValue::Integer(3)));
        assert_eq!(record.get("N"), Some(&FieldValue::Integer(2)));
    }

    #[test]
    fn test_cell_f64_accepts_strings() {
        let row = json!([1.5, "0.25", null]);
        assert_eq!(cell_f64(&row, 0), Some(1.5));
        assert_eq!(cell_f64(&row, 1), Some(0.25));
        assert_eq!(cell_f64(&row, 2), None);
        assert_eq!(cell_f64(&row, 9), None);
    }
}
