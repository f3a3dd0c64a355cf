use crate::domain::model::{AnalysisResult, ComparisonGroups, FieldValue, GroupData, Record};
use crate::domain::ports::{require_groups, MethodAdapter};
use crate::methods::mle::lookup_path;
use crate::utils::error::Result;
use serde_json::Value;

const K_PATH: &str = "test results.relaxation or intensification parameter";

#[derive(Debug, Default, Clone, Copy)]
pub struct Relax;

impl Relax {
    /// K is either a single number or, in multi-group runs, an object keyed by
    /// group label plus `overall`.
    fn k_by_group(raw: &AnalysisResult) -> Option<&serde_json::Map<String, Value>> {
        lookup_path(raw, K_PATH)?.as_object()
    }
}

impl MethodAdapter for Relax {
    fn name(&self) -> &str {
        "RELAX"
    }

    fn file_suffix(&self) -> &str {
        "RELAX.json"
    }

    fn supports_comparison_groups(&self) -> bool {
        true
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        vec!["RELAX_overall_pval", "RELAX_K"]
    }

    fn comparison_summary_fields(&self) -> Vec<&'static str> {
        vec!["group_K"]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec!["test results.p-value", K_PATH]
    }

    fn detect_groups(&self, raw: &AnalysisResult) -> Option<Vec<String>> {
        let labels: Vec<String> = Self::k_by_group(raw)?
            .keys()
            .filter(|k| k.as_str() != "overall")
            .cloned()
            .collect();
        if labels.is_empty() {
            None
        } else {
            Some(labels)
        }
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record> {
        let k = match lookup_path(raw, K_PATH) {
            Some(Value::Object(by_group)) => FieldValue::from_json_opt(by_group.get("overall")),
            other => FieldValue::from_json_opt(other),
        };

        Ok(Record::new()
            .with(
                "RELAX_overall_pval",
                FieldValue::from_json_opt(lookup_path(raw, "test results.p-value")),
            )
            .with("RELAX_K", k))
    }

    fn process_comparison_data(
        &self,
        raw: &AnalysisResult,
        groups: Option<&ComparisonGroups>,
    ) -> Result<GroupData> {
        let groups = require_groups(self.name(), groups)?;
        let Some(by_group) = Self::k_by_group(raw) else {
            return Ok(GroupData::new());
        };

        Ok(groups
            .labels()
            .iter()
            .map(|label| {
                let record =
                    Record::new().with("group_K", FieldValue::from_json_opt(by_group.get(label)));
                (label.clone(), record)
            })
            .collect())
    }
}
