use crate::domain::model::{AnalysisResult, ComparisonGroups};
use crate::domain::ports::MethodAdapter;
use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;

/// Reconciles the comparison group labels reported by each comparison-capable
/// method for one gene.
#[derive(Debug, Clone)]
pub struct ComparisonGroupDetector {
    default_groups: Vec<String>,
}

impl Default for ComparisonGroupDetector {
    fn default() -> Self {
        Self::new(vec!["test".to_string(), "reference".to_string()])
    }
}

impl ComparisonGroupDetector {
    pub fn new(default_groups: Vec<String>) -> Self {
        Self { default_groups }
    }

    pub fn default_groups(&self) -> &[String] {
        &self.default_groups
    }

    /// `results` must be in registry order. Methods that do not support
    /// comparison groups are ignored.
    pub fn detect(
        &self,
        gene: &str,
        results: &[(&dyn MethodAdapter, &AnalysisResult)],
    ) -> Result<ComparisonGroups> {
        let reported: Vec<(&str, Vec<String>)> = results
            .iter()
            .filter(|(method, _)| method.supports_comparison_groups())
            .filter_map(|(method, raw)| method.detect_groups(raw).map(|l| (method.name(), l)))
            .collect();

        let Some((_, first)) = reported.first() else {
            return Ok(ComparisonGroups::inferred(self.default_groups.clone()));
        };

        let expected: HashSet<&String> = first.iter().collect();
        let consistent = reported
            .iter()
            .all(|(_, labels)| labels.iter().collect::<HashSet<_>>() == expected);

        if !consistent {
            let detail = reported
                .iter()
                .map(|(method, labels)| format!("{} reports [{}]", method, labels.join(", ")))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EtlError::InconsistentGroups {
                gene: gene.to_string(),
                detail,
            });
        }

        let mut labels: Vec<String> = Vec::new();
        for label in first {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        Ok(ComparisonGroups::detected(labels))
    }
}
