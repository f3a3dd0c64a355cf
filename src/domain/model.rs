use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Raw parsed JSON for one (gene, method) pair.
pub type AnalysisResult = serde_json::Value;

/// Sentinel for a value that could not be determined.
pub const MISSING: &str = "NA";
/// Sentinel for a test that ran but was not significant.
pub const NOT_SIGNIFICANT: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Missing,
    NotSignificant,
    Text(String),
    Integer(i64),
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Converts a JSON scalar. Arrays and objects are not field values.
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Missing,
            serde_json::Value::Bool(b) => FieldValue::Flag(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Missing),
            },
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => FieldValue::Missing,
        }
    }

    /// Same as [`FieldValue::from_json`] but absent paths become `Missing`.
    pub fn from_json_opt(value: Option<&serde_json::Value>) -> FieldValue {
        value.map(FieldValue::from_json).unwrap_or(FieldValue::Missing)
    }
}

/// Plain decimal inside `[1e-4, 1e16)`, exponent form (`1.2e-12`, `1e+20`) outside it.
fn format_number(x: f64) -> String {
    let magnitude = x.abs();
    if !x.is_finite() || magnitude == 0.0 || (1e-4..1e16).contains(&magnitude) {
        return if x.is_finite() && x.fract() == 0.0 {
            format!("{:.1}", x)
        } else {
            format!("{}", x)
        };
    }

    let scientific = format!("{:e}", x);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => format!(
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.abs()
            ),
            Err(_) => scientific,
        },
        None => scientific,
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Missing => f.write_str(MISSING),
            FieldValue::NotSignificant => f.write_str(NOT_SIGNIFICANT),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Number(x) => f.write_str(&format_number(*x)),
            FieldValue::Flag(true) => f.write_str("True"),
            FieldValue::Flag(false) => f.write_str("False"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        match value {
            MISSING => FieldValue::Missing,
            NOT_SIGNIFICANT => FieldValue::NotSignificant,
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::from(value.as_str())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// Ordered field map. Re-inserting a field replaces it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Site-index (1-based) to record.
pub type SiteData = BTreeMap<usize, Record>;

/// Group label to record, in group order.
pub type GroupData = Vec<(String, Record)>;

/// Site-index to per-group records.
pub type GroupSiteData = BTreeMap<usize, GroupData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonGroups {
    labels: Vec<String>,
    inferred_default: bool,
}

impl ComparisonGroups {
    pub fn detected(labels: Vec<String>) -> Self {
        Self {
            labels,
            inferred_default: false,
        }
    }

    pub fn inferred(labels: Vec<String>) -> Self {
        Self {
            labels,
            inferred_default: true,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// True when no method reported labels and the configured defaults were used.
    pub fn is_inferred_default(&self) -> bool {
        self.inferred_default
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A non-fatal problem found while processing one gene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneWarning {
    MethodFailed { method: String, message: String },
    InputIncomplete { method: String, missing: Vec<String> },
    InconsistentGroups { detail: String },
    GroupDetectionFailed { message: String },
    MissingFields { context: String, fields: Vec<String> },
    NoResults,
}

impl fmt::Display for GeneWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneWarning::MethodFailed { method, message } => {
                write!(f, "{} failed: {}", method, message)
            }
            GeneWarning::InputIncomplete { method, missing } => write!(
                f,
                "{} is missing required input fields: {}",
                method,
                missing.join(", ")
            ),
            GeneWarning::InconsistentGroups { detail } => {
                write!(f, "inconsistent comparison groups: {}", detail)
            }
            GeneWarning::GroupDetectionFailed { message } => {
                write!(f, "comparison groups could not be detected: {}", message)
            }
            GeneWarning::MissingFields { context, fields } => {
                write!(f, "missing {} fields: {}", context, fields.join(", "))
            }
            GeneWarning::NoResults => f.write_str("no method results found"),
        }
    }
}

/// Everything extracted for one gene.
#[derive(Debug, Clone, Default)]
pub struct GeneOutput {
    pub gene: String,
    pub summary: Record,
    pub sites: Vec<Record>,
    pub comparison_summary: Option<Vec<Record>>,
    pub comparison_sites: Vec<Record>,
    pub groups: Option<ComparisonGroups>,
    pub warnings: Vec<GeneWarning>,
}

impl GeneOutput {
    pub fn has_comparison_output(&self) -> bool {
        self.comparison_summary
            .as_ref()
            .map(|rows| !rows.is_empty())
            .unwrap_or(false)
            || !self.comparison_sites.is_empty()
    }
}

/// File names per method directory, taken once before processing starts.
pub type DirectoryListing = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default)]
pub struct GeneBatch {
    pub genes: Vec<String>,
    pub listing: DirectoryListing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Summary,
    Sites,
    ComparisonSummary,
    ComparisonSite,
}

impl TableKind {
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Summary => &["gene"],
            TableKind::Sites => &["gene", "site"],
            TableKind::ComparisonSummary => &["gene", "comparison_group"],
            TableKind::ComparisonSite => &["gene", "site", "comparison_group"],
        }
    }

    pub fn file_stem(&self) -> &'static str {
        match self {
            TableKind::Summary => "combined_summary",
            TableKind::Sites => "combined_sites",
            TableKind::ComparisonSummary => "combined_comparison_summary",
            TableKind::ComparisonSite => "combined_comparison_site",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    pub kind: TableKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CombinedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx)).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct CombinedTables {
    pub summary: CombinedTable,
    pub sites: CombinedTable,
    pub comparison_summary: Option<CombinedTable>,
    pub comparison_site: Option<CombinedTable>,
}

impl CombinedTables {
    pub fn iter(&self) -> impl Iterator<Item = &CombinedTable> {
        [Some(&self.summary), Some(&self.sites)]
            .into_iter()
            .chain([self.comparison_summary.as_ref(), self.comparison_site.as_ref()])
            .flatten()
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub tables: CombinedTables,
    pub genes_processed: usize,
    pub inconsistent_genes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sentinels_render_distinctly() {
        assert_eq!(FieldValue::Missing.to_string(), "NA");
        assert_eq!(FieldValue::NotSignificant.to_string(), "-");
        assert_eq!(FieldValue::from("-"), FieldValue::NotSignificant);
        assert_eq!(FieldValue::from("NA"), FieldValue::Missing);
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(FieldValue::Number(3.0).to_string(), "3.0");
        assert_eq!(FieldValue::Number(0.25).to_string(), "0.25");
        assert_eq!(FieldValue::Number(0.0001).to_string(), "0.0001");
        assert_eq!(FieldValue::Number(1.2e-12).to_string(), "1.2e-12");
        assert_eq!(FieldValue::Number(5e-5).to_string(), "5e-05");
        assert_eq!(FieldValue::Number(1e20).to_string(), "1e+20");
        assert_eq!(FieldValue::Number(-2.5e17).to_string(), "-2.5e+17");
        assert_eq!(FieldValue::Integer(12).to_string(), "12");
        assert_eq!(FieldValue::Flag(true).to_string(), "True");
    }

    #[test]
    fn test_from_json() {
        assert_eq!(FieldValue::from_json(&json!(4)), FieldValue::Integer(4));
        assert_eq!(FieldValue::from_json(&json!(0.5)), FieldValue::Number(0.5));
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Missing);
        assert_eq!(FieldValue::from_json(&json!({"a": 1})), FieldValue::Missing);
        assert_eq!(FieldValue::from_json_opt(None), FieldValue::Missing);
    }

    #[test]
    fn test_record_keeps_insertion_order_and_replaces_in_place() {
        let mut record = Record::new().with("gene", "g1").with("b", 1i64).with("a", 2i64);
        record.insert("b", 5i64);

        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["gene", "b", "a"]);
        assert_eq!(record.get("b"), Some(&FieldValue::Integer(5)));
        assert_eq!(record.len(), 3);
    }
}
