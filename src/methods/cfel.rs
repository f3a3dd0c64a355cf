//! Contrast-FEL: per-site differences in selection between branch sets.

use crate::domain::model::{
    AnalysisResult, ComparisonGroups, FieldValue, GroupData, GroupSiteData, Record,
};
use crate::domain::ports::{require_groups, MethodAdapter};
use crate::methods::mle::{self, as_f64, cell_f64, lookup_path};
use crate::utils::error::{EtlError, Result};
use crate::utils::tree::{parse_newick, tally_site, SiteTally, TreeNode};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Q-value at or below which a site counts as differing between groups.
pub const Q_THRESHOLD: f64 = 0.20;

#[derive(Debug, Default, Clone, Copy)]
pub struct Cfel;

/// Per-group `beta (<g>)` and `subs (<g>)` column positions.
#[derive(Debug, Default)]
struct GroupColumns {
    beta: HashMap<String, usize>,
    subs: HashMap<String, usize>,
}

impl GroupColumns {
    fn from_headers(raw: &AnalysisResult) -> Result<Self> {
        let beta_re = Regex::new(r"beta\s*\(([^)]+)\)").map_err(regex_error)?;
        let subs_re = Regex::new(r"(?i)subs\s*\(([^)]+)\)").map_err(regex_error)?;

        let mut columns = GroupColumns::default();
        for (idx, (name, _)) in mle::headers(raw).iter().enumerate() {
            if let Some(caps) = beta_re.captures(name) {
                columns.beta.entry(caps[1].to_string()).or_insert(idx);
            } else if let Some(caps) = subs_re.captures(name) {
                columns.subs.entry(caps[1].to_string()).or_insert(idx);
            }
        }
        Ok(columns)
    }
}

fn regex_error(e: regex::Error) -> EtlError {
    EtlError::ProcessingError {
        message: format!("invalid column pattern: {}", e),
    }
}

impl Cfel {
    fn tested(raw: &AnalysisResult) -> Option<&Map<String, Value>> {
        raw.pointer("/tested/0").and_then(Value::as_object)
    }

    fn q_column(raw: &AnalysisResult) -> Option<usize> {
        mle::find_column_prefix(raw, "q-value")
    }

    fn branches_for<'a>(tested: &'a Map<String, Value>, label: &str) -> Vec<&'a str> {
        tested
            .iter()
            .filter(|(_, tag)| tag.as_str() == Some(label))
            .map(|(branch, _)| branch.as_str())
            .collect()
    }

    fn group_length(raw: &AnalysisResult, branches: &[&str]) -> FieldValue {
        let Some(attributes) = raw.pointer("/branch attributes/0").and_then(Value::as_object) else {
            return FieldValue::Missing;
        };
        branches
            .iter()
            .map(|branch| {
                attributes
                    .get(*branch)
                    .and_then(|attrs| attrs.get("Global MG94xREV"))
                    .and_then(as_f64)
            })
            .sum::<Option<f64>>()
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Missing)
    }

    fn group_dnds(raw: &AnalysisResult, label: &str) -> FieldValue {
        lookup_path(raw, "fits.Global MG94xREV.Rate Distributions")
            .and_then(Value::as_object)
            .and_then(|dists| dists.iter().find(|(key, _)| key.contains(label)))
            .and_then(|(_, rates)| rates.pointer("/0/0"))
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Missing)
    }

    /// `(nt_conserved, aa_conserved)`: rows where the group's beta is zero, and of
    /// those the rows that still carry substitutions. One unreadable beta makes both NA.
    fn conserved_counts(
        raw: &AnalysisResult,
        columns: &GroupColumns,
        label: &str,
    ) -> (FieldValue, FieldValue) {
        let Some(&beta_idx) = columns.beta.get(label) else {
            return (FieldValue::Missing, FieldValue::Missing);
        };
        let subs_idx = columns.subs.get(label).copied();

        let mut nt = 0usize;
        let mut aa = 0usize;
        for row in mle::rows(raw) {
            match cell_f64(row, beta_idx) {
                Some(beta) if beta == 0.0 => {}
                Some(_) => continue,
                None => return (FieldValue::Missing, FieldValue::Missing),
            }
            nt += 1;
            let has_subs = subs_idx
                .and_then(|idx| cell_f64(row, idx))
                .map(|s| s > 0.0)
                .unwrap_or(false);
            if has_subs {
                aa += 1;
            }
        }
        (FieldValue::from(nt), FieldValue::from(aa))
    }

    fn tree(&self, raw: &AnalysisResult) -> Result<Option<TreeNode>> {
        if raw.pointer("/substitutions/0").is_none() {
            return Ok(None);
        }
        let Some(newick) = raw.pointer("/input/trees/0").and_then(Value::as_str) else {
            return Ok(None);
        };
        parse_newick(newick)
            .map(Some)
            .map_err(|e| EtlError::MalformedResult {
                method: self.name().to_string(),
                message: e.to_string(),
            })
    }
}

/// Formats a group's beta: `0.000` for zero, scientific notation with three
/// decimals outside `[1e-3, 1e3)`, four decimals otherwise.
pub fn format_beta(beta: f64) -> String {
    if beta == 0.0 {
        return "0.000".to_string();
    }
    if beta.abs() < 1e-3 || beta.abs() >= 1e3 {
        let formatted = format!("{:.3e}", beta);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            None => formatted,
        };
    }
    format!("{:.4}", beta)
}

fn format_marker(q: Option<f64>) -> FieldValue {
    match q {
        Some(q) if q <= Q_THRESHOLD => FieldValue::Text(mle::format_p(q)),
        Some(_) => FieldValue::NotSignificant,
        None => FieldValue::Missing,
    }
}

fn tree_fields(record: Record, tally: Option<&SiteTally>, label: &str) -> Record {
    let Some(tally) = tally else {
        return record
            .with("composition", FieldValue::Missing)
            .with("substitutions", FieldValue::Missing)
            .with("majority_residue", FieldValue::Missing);
    };

    let composition = tally.composition_for(label).filter(|c| !c.is_empty());
    let substitutions = tally.substitutions_for(label).filter(|s| !s.is_empty());
    record
        .with(
            "composition",
            composition
                .map(|c| FieldValue::Text(c.format(",")))
                .unwrap_or(FieldValue::NotSignificant),
        )
        .with(
            "substitutions",
            substitutions
                .map(|s| FieldValue::Text(s.format(",")))
                .unwrap_or(FieldValue::NotSignificant),
        )
        .with(
            "majority_residue",
            composition
                .and_then(|c| c.majority())
                .map(FieldValue::from)
                .unwrap_or(FieldValue::NotSignificant),
        )
}

impl MethodAdapter for Cfel {
    fn name(&self) -> &str {
        "CFEL"
    }

    fn file_suffix(&self) -> &str {
        "CONTRASTFEL.json"
    }

    fn directory(&self) -> &str {
        "CONTRASTFEL"
    }

    fn supports_comparison_groups(&self) -> bool {
        true
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        vec!["diff_sites"]
    }

    fn comparison_summary_fields(&self) -> Vec<&'static str> {
        vec![
            "group_N",
            "group_T",
            "group_dN/dS",
            "group_nt_conserved",
            "group_aa_conserved",
        ]
    }

    fn comparison_site_fields(&self) -> Vec<&'static str> {
        vec![
            "cfel_marker",
            "cfel_beta",
            "composition",
            "substitutions",
            "majority_residue",
        ]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec!["MLE.headers", "MLE.content.0", "tested.0", "substitutions.0"]
    }

    fn detect_groups(&self, raw: &AnalysisResult) -> Option<Vec<String>> {
        let mut labels: Vec<String> = Vec::new();
        for tag in Self::tested(raw)?.values().filter_map(Value::as_str) {
            if !labels.iter().any(|l| l == tag) {
                labels.push(tag.to_string());
            }
        }
        if labels.is_empty() {
            None
        } else {
            Some(labels)
        }
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record> {
        let diff_sites = match Self::q_column(raw) {
            Some(q_idx) if mle::has_mle_content(raw) => FieldValue::from(
                mle::rows(raw)
                    .iter()
                    .filter_map(|row| cell_f64(row, q_idx))
                    .filter(|q| *q <= Q_THRESHOLD)
                    .count(),
            ),
            _ => FieldValue::Missing,
        };
        Ok(Record::new().with("diff_sites", diff_sites))
    }

    fn process_comparison_data(
        &self,
        raw: &AnalysisResult,
        groups: Option<&ComparisonGroups>,
    ) -> Result<GroupData> {
        let groups = require_groups(self.name(), groups)?;
        let Some(tested) = Self::tested(raw) else {
            return Err(EtlError::MalformedResult {
                method: self.name().to_string(),
                message: "no tested branch sets".to_string(),
            });
        };
        let columns = GroupColumns::from_headers(raw)?;

        let mut data = GroupData::new();
        for label in groups.labels() {
            let branches = Self::branches_for(tested, label);
            let (nt_conserved, aa_conserved) = Self::conserved_counts(raw, &columns, label);

            let record = Record::new()
                .with("group_N", branches.len())
                .with("group_T", Self::group_length(raw, &branches))
                .with("group_dN/dS", Self::group_dnds(raw, label))
                .with("group_nt_conserved", nt_conserved)
                .with("group_aa_conserved", aa_conserved);
            data.push((label.clone(), record));
        }
        Ok(data)
    }

    fn process_comparison_site_data(
        &self,
        raw: &AnalysisResult,
        groups: Option<&ComparisonGroups>,
    ) -> Result<GroupSiteData> {
        let groups = require_groups(self.name(), groups)?;
        let mut data = GroupSiteData::new();
        if !mle::has_mle_headers(raw) || !mle::has_mle_content(raw) {
            return Ok(data);
        }

        let columns = GroupColumns::from_headers(raw)?;
        let q_idx = Self::q_column(raw);
        let tree = self.tree(raw)?;
        let site_codons = raw.pointer("/substitutions/0").and_then(Value::as_object);
        let tested = Self::tested(raw);
        let empty = Map::new();

        for (row_idx, row) in mle::rows(raw).iter().enumerate() {
            let tally = tree.as_ref().map(|tree| {
                let codons = site_codons
                    .and_then(|sites| sites.get(&row_idx.to_string()))
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                tally_site(tree, codons, |branch| {
                    tested
                        .and_then(|t| t.get(branch))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
            });

            let q = q_idx.and_then(|idx| cell_f64(row, idx));
            let mut site = GroupData::new();
            for label in groups.labels() {
                let beta = columns
                    .beta
                    .get(label)
                    .and_then(|&idx| cell_f64(row, idx))
                    .map(|b| FieldValue::Text(format_beta(b)))
                    .unwrap_or(FieldValue::Missing);

                let record = Record::new()
                    .with("cfel_marker", format_marker(q))
                    .with("cfel_beta", beta);
                site.push((label.clone(), tree_fields(record, tally.as_ref(), label)));
            }
            data.insert(row_idx + 1, site);
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfel_fixture() -> AnalysisResult {
        json!({
            "input": {"trees": {"0": "((A,B)Node1,(C,D)Node2)"}},
            "tested": {"0": {
                "A": "Foreground", "B": "Foreground", "Node1": "Foreground",
                "C": "Background", "D": "Background", "Node2": "Background"
            }},
            "branch attributes": {"0": {
                "A": {"Global MG94xREV": 0.1}, "B": {"Global MG94xREV": 0.2},
                "Node1": {"Global MG94xREV": 0.1},
                "C": {"Global MG94xREV": 0.5}, "D": {"Global MG94xREV": 0.5},
                "Node2": {"Global MG94xREV": 0.0}
            }},
            "fits": {"Global MG94xREV": {"Rate Distributions": {
                "non-synonymous/synonymous rate ratio for *Background*": [[0.3, 1]],
                "non-synonymous/synonymous rate ratio for *Foreground*": [[0.8, 1]]
            }}},
            "MLE": {
                "headers": [
                    ["alpha", "Synonymous substitution rate"],
                    ["beta (Foreground)", "Non-synonymous rate for Foreground"],
                    ["beta (Background)", "Non-synonymous rate for Background"],
                    ["subs (Foreground)", "Substitutions"],
                    ["subs (Background)", "Substitutions"],
                    ["P-value (overall)", "p"],
                    ["Q-value (overall)", "q"]
                ],
                "content": {"0": [
                    [1.0, 0.0, 0.5, 2, 0, 0.01, 0.05],
                    [1.0, 0.0, 0.0, 0, 1, 0.5, 0.9],
                    [1.0, 0.00001, 1500.0, 1, 1, 0.1, 0.2]
                ]}
            },
            "substitutions": {"0": {
                "0": {"root": "AAA", "Node1": "AGA"},
                "1": {"root": "TTT"}
            }}
        })
    }

    fn groups() -> ComparisonGroups {
        ComparisonGroups::detected(vec!["Foreground".into(), "Background".into()])
    }

    #[test]
    fn test_detect_groups_first_seen_order() {
        assert_eq!(Cfel.detect_groups(&cfel_fixture()), Some(groups().labels().to_vec()));
    }

    #[test]
    fn test_diff_sites_uses_q_threshold() {
        let record = Cfel.process_results(&cfel_fixture()).unwrap();
        assert_eq!(record.get("diff_sites"), Some(&FieldValue::Integer(2)));

        let no_q = json!({"MLE": {"headers": [["alpha", ""]], "content": {"0": [[1.0]]}}});
        let record = Cfel.process_results(&no_q).unwrap();
        assert_eq!(record.get("diff_sites"), Some(&FieldValue::Missing));
    }

    #[test]
    fn test_comparison_summary() {
        let data = Cfel
            .process_comparison_data(&cfel_fixture(), Some(&groups()))
            .unwrap();

        let (label, fg) = &data[0];
        assert_eq!(label, "Foreground");
        assert_eq!(fg.get("group_N"), Some(&FieldValue::Integer(3)));
        assert_eq!(fg.get("group_dN/dS"), Some(&FieldValue::Number(0.8)));
        assert_eq!(fg.get("group_nt_conserved"), Some(&FieldValue::Integer(2)));
        assert_eq!(fg.get("group_aa_conserved"), Some(&FieldValue::Integer(1)));

        let (_, bg) = &data[1];
        assert_eq!(bg.get("group_T"), Some(&FieldValue::Number(1.0)));
        assert_eq!(bg.get("group_nt_conserved"), Some(&FieldValue::Integer(1)));
        assert_eq!(bg.get("group_aa_conserved"), Some(&FieldValue::Integer(1)));
    }

    #[test]
    fn test_unreadable_beta_makes_conserved_counts_na() {
        let mut raw = cfel_fixture();
        raw["MLE"]["content"]["0"][2][1] = json!("n/a");

        let data = Cfel.process_comparison_data(&raw, Some(&groups())).unwrap();

        let (_, fg) = &data[0];
        assert_eq!(fg.get("group_nt_conserved"), Some(&FieldValue::Missing));
        assert_eq!(fg.get("group_aa_conserved"), Some(&FieldValue::Missing));
        // Background betas are all readable
        let (_, bg) = &data[1];
        assert_eq!(bg.get("group_nt_conserved"), Some(&FieldValue::Integer(1)));
    }

    #[test]
    fn test_comparison_site_markers_and_tree_fields() {
        let data = Cfel
            .process_comparison_site_data(&cfel_fixture(), Some(&groups()))
            .unwrap();
        assert_eq!(data.len(), 3);

        let site1 = &data[&1];
        let fg = &site1[0].1;
        assert_eq!(fg.get("cfel_marker"), Some(&FieldValue::from("0.050")));
        assert_eq!(fg.get("cfel_beta"), Some(&FieldValue::from("0.000")));
        assert_eq!(fg.get("composition"), Some(&FieldValue::from("R:2")));
        assert_eq!(fg.get("substitutions"), Some(&FieldValue::from("K:R:1")));
        let bg = &site1[1].1;
        assert_eq!(bg.get("cfel_beta"), Some(&FieldValue::from("0.5000")));
        assert_eq!(bg.get("composition"), Some(&FieldValue::from("K:2")));
        assert_eq!(bg.get("substitutions"), Some(&FieldValue::NotSignificant));

        let site2 = &data[&2];
        assert_eq!(site2[0].1.get("cfel_marker"), Some(&FieldValue::NotSignificant));

        // no codons recorded for the third site: tallies are empty, not missing
        let site3 = &data[&3];
        assert_eq!(site3[0].1.get("cfel_beta"), Some(&FieldValue::from("1.000e-05")));
        assert_eq!(site3[1].1.get("cfel_beta"), Some(&FieldValue::from("1.500e+03")));
        assert_eq!(site3[0].1.get("cfel_marker"), Some(&FieldValue::from("0.200")));
    }

    #[test]
    fn test_comparison_site_without_substitutions_block() {
        let mut raw = cfel_fixture();
        raw.as_object_mut().unwrap().remove("substitutions");

        let data = Cfel.process_comparison_site_data(&raw, Some(&groups())).unwrap();
        let fg = &data[&1][0].1;
        assert_eq!(fg.get("cfel_marker"), Some(&FieldValue::from("0.050")));
        assert_eq!(fg.get("composition"), Some(&FieldValue::Missing));
        assert_eq!(fg.get("majority_residue"), Some(&FieldValue::Missing));
        assert!(Cfel
            .missing_input_paths(&raw)
            .contains(&"substitutions.0".to_string()));
    }

    #[test]
    fn test_format_beta() {
        assert_eq!(format_beta(0.0), "0.000");
        assert_eq!(format_beta(0.12345), "0.1235");
        assert_eq!(format_beta(0.0001234), "1.234e-04");
        assert_eq!(format_beta(12346.0), "1.235e+04");
    }
}
