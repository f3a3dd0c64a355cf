use crate::core::groups::ComparisonGroupDetector;
use crate::domain::model::{
    AnalysisResult, ComparisonGroups, DirectoryListing, FieldValue, GeneOutput, GeneWarning,
    GroupData, GroupSiteData, Record, SiteData,
};
use crate::domain::ports::MethodAdapter;
use crate::methods::MethodRegistry;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::FieldValidator;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One method's file for a gene, parsed or failed.
pub struct LoadedMethod {
    pub adapter: Arc<dyn MethodAdapter>,
    pub result: Result<AnalysisResult>,
}

impl LoadedMethod {
    pub fn new(adapter: Arc<dyn MethodAdapter>, result: Result<AnalysisResult>) -> Self {
        Self { adapter, result }
    }
}

/// Turns every method result for one gene into a [`GeneOutput`].
///
/// Holds no mutable state, so one processor is shared by all gene tasks.
#[derive(Clone)]
pub struct GeneProcessor {
    registry: Arc<MethodRegistry>,
    detector: ComparisonGroupDetector,
}

/// Accumulates one gene's merged records and warnings.
struct GeneState<'a> {
    gene: &'a str,
    summary: Record,
    sites: BTreeMap<usize, Record>,
    comparison_summary: Vec<(String, Record)>,
    comparison_sites: BTreeMap<usize, Vec<(String, Record)>>,
    warnings: Vec<GeneWarning>,
}

impl<'a> GeneState<'a> {
    fn new(gene: &'a str) -> Self {
        Self {
            gene,
            summary: Record::new(),
            sites: BTreeMap::new(),
            comparison_summary: Vec::new(),
            comparison_sites: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, warning: GeneWarning) {
        tracing::warn!("⚠️  {}: {}", self.gene, warning);
        self.warnings.push(warning);
    }

    fn method_failed(&mut self, method: &str, error: &EtlError) {
        self.warn(GeneWarning::MethodFailed {
            method: method.to_string(),
            message: error.to_string(),
        });
    }

    fn check_fields(&mut self, context: &str, record: &Record, required: &[&str]) {
        let missing = FieldValidator::validate(record, required);
        if !missing.is_empty() {
            self.warn(GeneWarning::MissingFields {
                context: context.to_string(),
                fields: missing,
            });
        }
    }
}

/// Merges `incoming` into `target`. `NA` never replaces a value; a value
/// replaces `NA`; a conflicting value replaces the old one.
fn merge_record(gene: &str, method: &str, target: &mut Record, incoming: &Record) {
    for (field, value) in incoming.iter() {
        match target.get(field) {
            None => target.insert(field, value.clone()),
            Some(existing) if existing == value || value.is_missing() => {}
            Some(existing) if existing.is_missing() => target.insert(field, value.clone()),
            Some(existing) => {
                tracing::warn!(
                    "⚠️  {}: {} overrides {} ({} -> {})",
                    gene,
                    method,
                    field,
                    existing,
                    value
                );
                target.insert(field, value.clone());
            }
        }
    }
}

fn merge_group_data(
    gene: &str,
    method: &str,
    target: &mut Vec<(String, Record)>,
    incoming: &GroupData,
) {
    for (label, record) in incoming {
        match target.iter_mut().find(|(l, _)| l == label) {
            Some((_, existing)) => merge_record(gene, method, existing, record),
            None => target.push((label.clone(), record.clone())),
        }
    }
}

/// Everything one method produced for a gene, held back until all operations succeed.
struct MethodOutput {
    summary: Record,
    sites: SiteData,
    comparison: Option<GroupData>,
    comparison_sites: Option<GroupSiteData>,
}

/// A missing-groups signal only skips the group fields; other errors fail the method.
fn skip_without_groups<T>(adapter: &dyn MethodAdapter, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(EtlError::MethodRequiresGroups { .. }) => {
            tracing::debug!("{} comparison fields skipped, no groups", adapter.name());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Only a real label mismatch counts as inconsistent; any other detector error is
/// reported on its own.
fn group_warning(error: EtlError) -> GeneWarning {
    match error {
        EtlError::InconsistentGroups { detail, .. } => GeneWarning::InconsistentGroups { detail },
        other => GeneWarning::GroupDetectionFailed {
            message: other.to_string(),
        },
    }
}

fn keyed(keys: Record, fields: &Record) -> Record {
    fields
        .iter()
        .fold(keys, |record, (field, value)| record.with(field, value.clone()))
}

impl GeneProcessor {
    pub fn new(registry: Arc<MethodRegistry>, detector: ComparisonGroupDetector) -> Self {
        Self { registry, detector }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Reads and parses every result file present for `gene`.
    pub fn load(&self, gene: &str, root: &Path, listing: &DirectoryListing) -> Vec<LoadedMethod> {
        self.registry
            .resolve_for_file(gene, root, listing)
            .into_iter()
            .map(|resolved| {
                tracing::debug!("📄 Reading {}", resolved.path.display());
                let result = std::fs::read(&resolved.path)
                    .map_err(EtlError::from)
                    .and_then(|bytes| serde_json::from_slice(&bytes).map_err(EtlError::from));
                LoadedMethod::new(resolved.adapter, result)
            })
            .collect()
    }

    pub fn process(&self, gene: &str, root: &Path, listing: &DirectoryListing) -> GeneOutput {
        let loaded = self.load(gene, root, listing);
        self.process_loaded(gene, loaded)
    }

    /// Processes already-loaded results. Pure apart from logging.
    pub fn process_loaded(&self, gene: &str, loaded: Vec<LoadedMethod>) -> GeneOutput {
        let mut state = GeneState::new(gene);
        state.summary.insert("gene", FieldValue::Text(gene.to_string()));

        let mut parsed: Vec<(&dyn MethodAdapter, &AnalysisResult)> = Vec::new();
        for method in &loaded {
            match &method.result {
                Ok(raw) => parsed.push((method.adapter.as_ref(), raw)),
                Err(e) => state.method_failed(method.adapter.name(), e),
            }
        }

        if parsed.is_empty() {
            state.warn(GeneWarning::NoResults);
        }

        for (adapter, raw) in &parsed {
            let missing = adapter.missing_input_paths(raw);
            if !missing.is_empty() {
                state.warn(GeneWarning::InputIncomplete {
                    method: adapter.name().to_string(),
                    missing,
                });
            }
        }

        let mut inconsistent = false;
        let groups: Option<ComparisonGroups> =
            if parsed.iter().any(|(m, _)| m.supports_comparison_groups()) {
                match self.detector.detect(gene, &parsed) {
                    Ok(groups) => {
                        tracing::debug!("🏷️  {}: comparison groups {:?}", gene, groups.labels());
                        Some(groups)
                    }
                    Err(e) => {
                        let warning = group_warning(e);
                        inconsistent = matches!(warning, GeneWarning::InconsistentGroups { .. });
                        state.warn(warning);
                        None
                    }
                }
            } else {
                None
            };

        for (adapter, raw) in &parsed {
            self.apply_method(&mut state, *adapter, raw, groups.as_ref(), inconsistent);
        }

        // Absent or failed methods contribute NA without overriding other methods.
        for adapter in self.registry.methods() {
            for field in adapter.summary_fields() {
                if !state.summary.contains(field) {
                    state.summary.insert(field, FieldValue::Missing);
                }
            }
        }

        self.finish(state, groups)
    }

    /// Runs every operation of one method before merging any of them. A failure
    /// in any operation discards the whole method, so its fields fall back to NA.
    fn apply_method(
        &self,
        state: &mut GeneState<'_>,
        adapter: &dyn MethodAdapter,
        raw: &AnalysisResult,
        groups: Option<&ComparisonGroups>,
        skip_comparison: bool,
    ) {
        let name = adapter.name();
        match Self::run_method(adapter, raw, groups, skip_comparison) {
            Ok(output) => Self::merge_method(state, adapter, output),
            Err(e) => state.method_failed(name, &e),
        }
    }

    fn run_method(
        adapter: &dyn MethodAdapter,
        raw: &AnalysisResult,
        groups: Option<&ComparisonGroups>,
        skip_comparison: bool,
    ) -> Result<MethodOutput> {
        let summary = adapter.process_results(raw)?;
        let sites = adapter.process_site_data(raw, groups)?;

        if skip_comparison {
            return Ok(MethodOutput {
                summary,
                sites,
                comparison: None,
                comparison_sites: None,
            });
        }

        let comparison = skip_without_groups(adapter, adapter.process_comparison_data(raw, groups))?;
        let comparison_sites =
            skip_without_groups(adapter, adapter.process_comparison_site_data(raw, groups))?;

        Ok(MethodOutput {
            summary,
            sites,
            comparison,
            comparison_sites,
        })
    }

    fn merge_method(state: &mut GeneState<'_>, adapter: &dyn MethodAdapter, output: MethodOutput) {
        let name = adapter.name();
        let gene = state.gene;

        state.check_fields(
            &format!("{} summary", name),
            &output.summary,
            &adapter.summary_fields(),
        );
        merge_record(gene, name, &mut state.summary, &output.summary);

        let required = adapter.site_fields();
        let mut missing: Vec<String> = Vec::new();
        for (site, record) in &output.sites {
            for field in FieldValidator::validate(record, &required) {
                if !missing.contains(&field) {
                    missing.push(field);
                }
            }
            merge_record(gene, name, state.sites.entry(*site).or_default(), record);
        }
        if !missing.is_empty() {
            state.warn(GeneWarning::MissingFields {
                context: format!("{} site", name),
                fields: missing,
            });
        }

        if let Some(data) = &output.comparison {
            let required = adapter.comparison_summary_fields();
            for (_, record) in data {
                state.check_fields(&format!("{} comparison summary", name), record, &required);
            }
            merge_group_data(gene, name, &mut state.comparison_summary, data);
        }

        if let Some(data) = &output.comparison_sites {
            for (site, group_data) in data {
                let target = state.comparison_sites.entry(*site).or_default();
                merge_group_data(gene, name, target, group_data);
            }
        }
    }

    fn finish(&self, state: GeneState<'_>, groups: Option<ComparisonGroups>) -> GeneOutput {
        let gene = state.gene;
        let gene_key = || Record::new().with("gene", FieldValue::Text(gene.to_string()));

        let sites = state
            .sites
            .iter()
            .map(|(site, record)| keyed(gene_key().with("site", *site), record))
            .collect();

        let comparison_summary: Vec<Record> = state
            .comparison_summary
            .iter()
            .map(|(label, record)| {
                keyed(
                    gene_key().with("comparison_group", FieldValue::Text(label.clone())),
                    record,
                )
            })
            .collect();

        let comparison_sites = state
            .comparison_sites
            .iter()
            .flat_map(|(site, group_data)| {
                group_data.iter().map(move |(label, record)| {
                    keyed(
                        gene_key()
                            .with("site", *site)
                            .with("comparison_group", FieldValue::Text(label.clone())),
                        record,
                    )
                })
            })
            .collect();

        GeneOutput {
            gene: gene.to_string(),
            summary: state.summary,
            sites,
            comparison_summary: if comparison_summary.is_empty() {
                None
            } else {
                Some(comparison_summary)
            },
            comparison_sites,
            groups,
            warnings: state.warnings,
        }
    }
}
