use crate::core::combine::CombinedTableBuilder;
use crate::core::gene::GeneProcessor;
use crate::core::groups::ComparisonGroupDetector;
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{CombinedTable, GeneBatch, GeneOutput, TransformResult};
use crate::methods::MethodRegistry;
use crate::utils::error::{EtlError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Reads HyPhy results per gene, processes genes on a bounded blocking pool and
/// writes the combined tables through `Storage`.
pub struct SelectionPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    processor: Arc<GeneProcessor>,
}

impl<S: Storage, C: ConfigProvider> SelectionPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        let registry = MethodRegistry::with_defaults().with_directories(config.method_directories());
        Self::with_registry(storage, config, registry)
    }

    pub fn with_registry(storage: S, config: C, registry: MethodRegistry) -> Self {
        let detector = ComparisonGroupDetector::new(config.default_groups());
        Self {
            storage,
            config,
            processor: Arc::new(GeneProcessor::new(Arc::new(registry), detector)),
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        self.processor.registry()
    }

    fn results_root(&self) -> PathBuf {
        PathBuf::from(self.config.results_path())
    }

    fn file_name(&self, table: &CombinedTable) -> String {
        let extension = if self.config.tabular() { "tab" } else { "csv" };
        format!("{}.{}", table.kind.file_stem(), extension)
    }
}

/// Serializes one table, comma- or tab-delimited, with LF line endings.
pub fn write_table(table: &CombinedTable, tabular: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(if tabular { b'\t' } else { b',' })
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for SelectionPipeline<S, C> {
    async fn extract(&self) -> Result<GeneBatch> {
        let root = self.results_root();
        tracing::debug!("Scanning results in: {}", root.display());

        let registry = self.processor.registry();
        let listing = registry.scan_directory(&root).await?;
        let genes = registry.discover_genes(&listing);

        if genes.is_empty() {
            return Err(EtlError::NoGenesFound {
                path: root.display().to_string(),
            });
        }

        for (directory, files) in &listing {
            tracing::debug!("📂 {}: {} result files", directory, files.len());
        }
        Ok(GeneBatch { genes, listing })
    }

    async fn transform(&self, batch: GeneBatch) -> Result<TransformResult> {
        let workers = self.config.concurrent_genes().max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<GeneOutput>(workers * 2);

        let mut builder = CombinedTableBuilder::for_registry(self.processor.registry());
        let collector = tokio::spawn(async move {
            while let Some(output) = rx.recv().await {
                tracing::debug!("✔️  {} collected", output.gene);
                builder.add(output);
            }
            builder
        });

        let root = Arc::new(self.results_root());
        let listing = Arc::new(batch.listing);
        let mut handles = Vec::with_capacity(batch.genes.len());

        for gene in batch.genes {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| EtlError::TaskError {
                    message: e.to_string(),
                })?;
            let processor = Arc::clone(&self.processor);
            let root = Arc::clone(&root);
            let listing = Arc::clone(&listing);
            let tx = tx.clone();

            let task_gene = gene.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let output = processor.process(&task_gene, &root, &listing);
                if tx.blocking_send(output).is_err() {
                    tracing::error!("❌ Collector closed before {} was sent", task_gene);
                }
            });
            handles.push((gene, handle));
        }
        drop(tx);

        for (gene, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("❌ Processing {} failed: {}", gene, e);
            }
        }

        let builder = collector.await.map_err(|e| EtlError::TaskError {
            message: e.to_string(),
        })?;

        let genes_processed = builder.len();
        let inconsistent_genes = builder.inconsistent_genes();
        if !inconsistent_genes.is_empty() {
            tracing::warn!(
                "⚠️  Comparison output skipped for {} gene(s) with inconsistent groups: {}",
                inconsistent_genes.len(),
                inconsistent_genes.join(", ")
            );
        }

        Ok(TransformResult {
            tables: builder.build(),
            genes_processed,
            inconsistent_genes,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        for table in result.tables.iter() {
            let file_name = self.file_name(table);
            let data = write_table(table, self.config.tabular())?;

            tracing::debug!(
                "Writing {} ({} rows, {} columns)",
                file_name,
                table.rows.len(),
                table.columns.len()
            );
            self.storage.write_file(&file_name, &data).await?;
        }

        Ok(self.config.output_path().to_string())
    }
}
