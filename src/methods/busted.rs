use crate::domain::model::{AnalysisResult, ComparisonGroups, FieldValue, Record, SiteData};
use crate::domain::ports::MethodAdapter;
use crate::methods::mle::{self, as_f64, lookup_path};
use crate::utils::error::{EtlError, Result};
use crate::utils::tree::{parse_newick, tally_site};
use serde_json::Value;

/// Tag used for every branch when BUSTED results are walked; BUSTED tests the whole tree.
const TREE_TAG: &str = "test";

#[derive(Debug, Default, Clone, Copy)]
pub struct Busted;

impl Busted {
    /// Highest-rate class of the unconstrained test distribution.
    fn omega3(raw: &AnalysisResult) -> Option<&Value> {
        match lookup_path(raw, "fits.Unconstrained model.Rate Distributions.Test")? {
            Value::Object(classes) => classes.get(&classes.len().checked_sub(1)?.to_string()),
            Value::Array(classes) => classes.last(),
            _ => None,
        }
    }

    /// Mean omega over the `global` distribution, weighted by class proportion.
    fn global_dnds(raw: &AnalysisResult) -> Option<f64> {
        let classes: Vec<&Value> =
            match lookup_path(raw, "fits.Unconstrained model.Rate Distributions.global")? {
                Value::Object(map) => map.values().collect(),
                Value::Array(items) => items.iter().collect(),
                _ => return None,
            };
        if classes.is_empty() {
            return None;
        }

        classes.iter().try_fold(0.0, |acc, class| {
            let omega = class.get("omega").and_then(as_f64)?;
            let weight = class
                .get("weight")
                .or_else(|| class.get("proportion"))
                .and_then(as_f64)?;
            Some(acc + omega * weight)
        })
    }
}

impl MethodAdapter for Busted {
    fn name(&self) -> &str {
        "BUSTED"
    }

    fn file_suffix(&self) -> &str {
        "BUSTED.json"
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        vec![
            "N",
            "T",
            "sites",
            "dN/dS",
            "BUSTED_pval",
            "BUSTED_omega3",
            "BUSTED_prop_sites_in_omega3",
        ]
    }

    fn site_fields(&self) -> Vec<&'static str> {
        vec!["composition", "substitutions", "majority_residue"]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec![
            "test results.p-value",
            "fits.Unconstrained model.Rate Distributions.Test",
            "input.trees.0",
            "substitutions.0",
        ]
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record> {
        let mut record = mle::common_fields(raw);

        record.insert(
            "dN/dS",
            Self::global_dnds(raw)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
        );
        record.insert(
            "BUSTED_pval",
            FieldValue::from_json_opt(lookup_path(raw, "test results.p-value")),
        );

        let omega3 = Self::omega3(raw);
        record.insert(
            "BUSTED_omega3",
            FieldValue::from_json_opt(omega3.and_then(|class| class.get("omega"))),
        );
        let proportion = omega3
            .and_then(|class| class.get("weight").or_else(|| class.get("proportion")))
            .and_then(as_f64)
            .map(|p| FieldValue::Number(p * 100.0))
            .unwrap_or(FieldValue::Missing);
        record.insert("BUSTED_prop_sites_in_omega3", proportion);

        Ok(record)
    }

    fn process_site_data(
        &self,
        raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<SiteData> {
        let mut sites = SiteData::new();

        let Some(substitutions) = raw.pointer("/substitutions/0").and_then(Value::as_object) else {
            return Ok(sites);
        };
        let Some(newick) = raw.pointer("/input/trees/0").and_then(Value::as_str) else {
            return Ok(sites);
        };
        let tree = parse_newick(newick).map_err(|e| EtlError::MalformedResult {
            method: self.name().to_string(),
            message: e.to_string(),
        })?;

        for (key, codons) in substitutions {
            let (Ok(idx), Some(codons)) = (key.parse::<usize>(), codons.as_object()) else {
                continue;
            };
            let tally = tally_site(&tree, codons, |_| Some(TREE_TAG.to_string()));

            let composition = tally.composition_for(TREE_TAG).filter(|c| !c.is_empty());
            let substitutions = tally.substitutions_for(TREE_TAG).filter(|s| !s.is_empty());

            let record = Record::new()
                .with(
                    "composition",
                    composition
                        .map(|c| FieldValue::Text(c.format(",")))
                        .unwrap_or(FieldValue::Missing),
                )
                .with(
                    "substitutions",
                    substitutions
                        .map(|s| FieldValue::Text(s.format(",")))
                        .unwrap_or(FieldValue::Missing),
                )
                .with(
                    "majority_residue",
                    composition
                        .and_then(|c| c.majority())
                        .map(FieldValue::from)
                        .unwrap_or(FieldValue::Missing),
                );
            sites.insert(idx + 1, record);
        }

        Ok(sites)
    }
}
