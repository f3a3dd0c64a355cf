use crate::core::Pipeline;
use crate::utils::error::Result;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting HyPhy results extraction");

        // Extract
        tracing::info!("🔍 Discovering genes...");
        let batch = self.pipeline.extract().await?;
        tracing::info!("Found {} genes", batch.genes.len());

        // Transform
        tracing::info!("⚙️  Processing genes...");
        let result = self.pipeline.transform(batch).await?;
        tracing::info!(
            "Processed {} genes ({} summary columns, {} site rows)",
            result.genes_processed,
            result.tables.summary.columns.len(),
            result.tables.sites.rows.len()
        );

        // Load
        tracing::info!("💾 Writing combined tables...");
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("Output saved to: {}", output_path);

        Ok(output_path)
    }
}
