use crate::domain::model::{
    AnalysisResult, ComparisonGroups, GeneBatch, GroupData, GroupSiteData, Record, SiteData,
    TransformResult,
};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::collections::HashMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn results_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn concurrent_genes(&self) -> usize;
    fn tabular(&self) -> bool;
    fn default_groups(&self) -> Vec<String>;
    fn method_directories(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<GeneBatch>;
    async fn transform(&self, batch: GeneBatch) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

/// One HyPhy method's view of its own JSON output.
///
/// Every extraction is guarded per field: a missing or mistyped path yields `NA`
/// for that field only. An `Err` means the whole method result is unusable for the
/// gene, except [`EtlError::MethodRequiresGroups`], which only means the group
/// specific fields are skipped.
pub trait MethodAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// File name suffix, e.g. `BUSTED.json` for `<gene>.BUSTED.json`.
    fn file_suffix(&self) -> &str;

    /// Directory holding this method's results, relative to the results root.
    fn directory(&self) -> &str {
        self.name()
    }

    fn supports_comparison_groups(&self) -> bool {
        false
    }

    fn summary_fields(&self) -> Vec<&'static str>;

    fn site_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn comparison_summary_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn comparison_site_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Dotted JSON paths this method expects in a current HyPhy output.
    fn required_paths(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Column names expected in `MLE.headers`.
    fn required_headers(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn missing_input_paths(&self, raw: &AnalysisResult) -> Vec<String> {
        let mut missing: Vec<String> = self
            .required_paths()
            .into_iter()
            .filter(|path| crate::methods::mle::lookup_path(raw, path).is_none())
            .map(str::to_string)
            .collect();

        if raw.pointer("/MLE/headers").is_some() {
            let headers = crate::methods::mle::header_indices(raw);
            missing.extend(
                self.required_headers()
                    .into_iter()
                    .filter(|h| !headers.contains_key(*h))
                    .map(|h| format!("MLE.headers:{}", h)),
            );
        }

        missing
    }

    /// Group labels this method's output carries, if any.
    fn detect_groups(&self, _raw: &AnalysisResult) -> Option<Vec<String>> {
        None
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record>;

    fn process_site_data(
        &self,
        _raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<SiteData> {
        Ok(SiteData::new())
    }

    fn process_comparison_data(
        &self,
        _raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<GroupData> {
        Ok(GroupData::new())
    }

    fn process_comparison_site_data(
        &self,
        _raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<GroupSiteData> {
        Ok(GroupSiteData::new())
    }
}

/// Shorthand for the group-dependency signal.
pub fn require_groups<'a>(
    method: &str,
    groups: Option<&'a ComparisonGroups>,
) -> Result<&'a ComparisonGroups> {
    groups.ok_or_else(|| EtlError::MethodRequiresGroups {
        method: method.to_string(),
    })
}
