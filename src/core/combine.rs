use crate::domain::model::{
    CombinedTable, CombinedTables, GeneOutput, GeneWarning, Record, TableKind, MISSING,
};
use crate::methods::MethodRegistry;
use std::collections::HashMap;

/// Collects per-gene outputs in any order and builds the combined tables.
#[derive(Debug, Default)]
pub struct CombinedTableBuilder {
    outputs: Vec<GeneOutput>,
    column_order: HashMap<TableKind, Vec<String>>,
}

impl CombinedTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders declared method fields by registry order instead of first-seen order.
    pub fn for_registry(registry: &MethodRegistry) -> Self {
        Self::new()
            .with_column_order(TableKind::Summary, registry.summary_fields())
            .with_column_order(TableKind::Sites, registry.site_fields())
            .with_column_order(
                TableKind::ComparisonSummary,
                registry.comparison_summary_fields(),
            )
            .with_column_order(TableKind::ComparisonSite, registry.comparison_site_fields())
    }

    /// Preferred order for non-key columns of one table. Listed fields no record
    /// carries are left out.
    pub fn with_column_order(mut self, kind: TableKind, fields: Vec<String>) -> Self {
        self.column_order.insert(kind, fields);
        self
    }

    pub fn add(&mut self, output: GeneOutput) {
        self.outputs.push(output);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Genes whose comparison output was skipped because methods disagreed on groups.
    pub fn inconsistent_genes(&self) -> Vec<String> {
        let mut genes: Vec<String> = self
            .outputs
            .iter()
            .filter(|o| {
                o.warnings
                    .iter()
                    .any(|w| matches!(w, GeneWarning::InconsistentGroups { .. }))
            })
            .map(|o| o.gene.clone())
            .collect();
        genes.sort();
        genes
    }

    /// Rows are ordered by gene name, so completion order does not matter.
    pub fn build(mut self) -> CombinedTables {
        self.outputs.sort_by(|a, b| a.gene.cmp(&b.gene));
        let outputs = &self.outputs;
        let order = &self.column_order;
        let table = |kind: TableKind, records: Vec<&Record>| {
            build_table(kind, order.get(&kind).map(Vec::as_slice).unwrap_or(&[]), records)
        };

        let summary = table(TableKind::Summary, outputs.iter().map(|o| &o.summary).collect());
        let sites = table(
            TableKind::Sites,
            outputs.iter().flat_map(|o| o.sites.iter()).collect(),
        );

        let comparison_summary = outputs
            .iter()
            .any(|o| o.comparison_summary.as_ref().is_some_and(|rows| !rows.is_empty()))
            .then(|| {
                table(
                    TableKind::ComparisonSummary,
                    outputs
                        .iter()
                        .flat_map(|o| o.comparison_summary.iter().flatten())
                        .collect(),
                )
            });

        let comparison_site = outputs
            .iter()
            .any(|o| !o.comparison_sites.is_empty())
            .then(|| {
                table(
                    TableKind::ComparisonSite,
                    outputs.iter().flat_map(|o| o.comparison_sites.iter()).collect(),
                )
            });

        CombinedTables {
            summary,
            sites,
            comparison_summary,
            comparison_site,
        }
    }
}

/// Key columns first, then the `preferred` fields present in any record, then
/// every other field in first-seen order. Cells a record does not carry are `NA`.
fn build_table(kind: TableKind, preferred: &[String], records: Vec<&Record>) -> CombinedTable {
    let mut columns: Vec<String> = kind.key_columns().iter().map(|c| c.to_string()).collect();
    for field in preferred {
        let present = records.iter().any(|record| record.contains(field));
        if present && !columns.contains(field) {
            columns.push(field.clone());
        }
    }
    for record in &records {
        for field in record.keys() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.to_string());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| {
                    record
                        .get(column)
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| MISSING.to_string())
                })
                .collect()
        })
        .collect();

    CombinedTable {
        kind,
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(gene: &str, fields: &[(&str, i64)]) -> GeneOutput {
        let summary = fields
            .iter()
            .fold(Record::new().with("gene", gene), |r, (f, v)| r.with(f, *v));
        GeneOutput {
            gene: gene.to_string(),
            summary,
            ..Default::default()
        }
    }

    #[test]
    fn test_superset_columns_fill_na() {
        let mut builder = CombinedTableBuilder::new();
        builder.add(output("gene2", &[("b", 3), ("c", 4)]));
        builder.add(output("gene1", &[("a", 1), ("b", 2)]));

        let tables = builder.build();
        let summary = &tables.summary;

        assert_eq!(summary.columns, vec!["gene", "a", "b", "c"]);
        assert_eq!(summary.cell(0, "gene"), Some("gene1"));
        assert_eq!(summary.cell(0, "c"), Some("NA"));
        assert_eq!(summary.cell(1, "a"), Some("NA"));
        assert_eq!(summary.cell(1, "c"), Some("4"));
    }

    #[test]
    fn test_registry_order_overrides_first_seen_order() {
        let mut builder = CombinedTableBuilder::new()
            .with_column_order(TableKind::Summary, vec!["c".into(), "a".into(), "z".into()]);
        builder.add(output("gene1", &[("a", 1), ("b", 2), ("c", 3)]));

        let tables = builder.build();
        assert_eq!(tables.summary.columns, vec!["gene", "c", "a", "b"]);
    }

    #[test]
    fn test_for_registry_orders_method_fields() {
        let registry = MethodRegistry::with_defaults();
        let mut builder = CombinedTableBuilder::for_registry(&registry);
        builder.add(output("gene1", &[("diff_sites", 1), ("N", 4)]));

        let tables = builder.build();
        assert_eq!(tables.summary.columns, vec!["gene", "N", "diff_sites"]);
    }

    #[test]
    fn test_comparison_tables_omitted_when_empty() {
        let mut builder = CombinedTableBuilder::new();
        builder.add(output("gene1", &[("a", 1)]));

        let tables = builder.build();
        assert!(tables.comparison_summary.is_none());
        assert!(tables.comparison_site.is_none());
        assert_eq!(tables.iter().count(), 2);
        assert_eq!(tables.sites.columns, vec!["gene", "site"]);
        assert!(tables.sites.rows.is_empty());
    }

    #[test]
    fn test_comparison_rows_keep_key_columns_first() {
        let mut out = output("gene1", &[]);
        out.comparison_summary = Some(vec![Record::new()
            .with("group_N", 3i64)
            .with("gene", "gene1")
            .with("comparison_group", "A")]);

        let mut builder = CombinedTableBuilder::new();
        builder.add(out);
        let tables = builder.build();

        let table = tables.comparison_summary.unwrap();
        assert_eq!(table.columns, vec!["gene", "comparison_group", "group_N"]);
        assert_eq!(table.rows, vec![vec!["gene1", "A", "3"]]);
    }

    #[test]
    fn test_inconsistent_genes() {
        let mut flagged = output("g2", &[]);
        flagged.warnings.push(GeneWarning::InconsistentGroups {
            detail: "RELAX reports [A]".into(),
        });

        let mut builder = CombinedTableBuilder::new();
        builder.add(flagged);
        builder.add(output("g1", &[]));
        assert_eq!(builder.inconsistent_genes(), vec!["g2"]);
        assert_eq!(builder.len(), 2);
    }
}
