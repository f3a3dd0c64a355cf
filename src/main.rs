use clap::Parser;
use hyphy_etl::core::{ConfigProvider, Pipeline};
use hyphy_etl::utils::error::ErrorSeverity;
use hyphy_etl::utils::{logger, validation::Validate};
use hyphy_etl::{CliConfig, EtlEngine, EtlError, LocalStorage, SelectionPipeline, TomlConfig};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting hyphy-etl");
    tracing::debug!("CLI config: {:?}", args);

    let exit_code = match args.config.clone() {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            let mut config = match TomlConfig::from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("❌ Failed to load config file '{}': {}", path, e);
                    eprintln!("💡 Make sure the file exists and is valid TOML format");
                    std::process::exit(1);
                }
            };

            // 命令列的 --tabular 優先
            if args.tabular {
                config.output.tabular = Some(true);
            }
            run(config, args.dry_run).await
        }
        None => {
            let dry_run = args.dry_run;
            run(args, dry_run).await
        }
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run<C: ConfigProvider + Validate>(config: C, dry_run: bool) -> i32 {
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        return 1;
    }

    display_config_summary(&config, dry_run);

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = SelectionPipeline::new(storage, config);

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        return match perform_dry_run(&pipeline).await {
            Ok(()) => 0,
            Err(e) => report_failure(&e),
        };
    }

    let engine = EtlEngine::new(pipeline);
    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Combined tables written");
            println!("✅ Combined tables written to: {}", output_path);
            0
        }
        Err(e) => report_failure(&e),
    }
}

fn report_failure(e: &EtlError) -> i32 {
    tracing::error!(
        "❌ hyphy-etl failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn display_config_summary<C: ConfigProvider>(config: &C, dry_run: bool) {
    println!("📋 Configuration Summary:");
    println!("  Results: {}", config.results_path());
    println!("  Output: {}", config.output_path());
    println!(
        "  Format: {}",
        if config.tabular() { "tab" } else { "csv" }
    );
    println!("  Concurrent Genes: {}", config.concurrent_genes());
    println!("  Default Groups: {}", config.default_groups().join(", "));

    let mut overrides: Vec<(String, String)> = config.method_directories().into_iter().collect();
    overrides.sort();
    for (method, directory) in overrides {
        println!("  {} results in: {}/", method, directory);
    }

    if dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

async fn perform_dry_run<S, C>(pipeline: &SelectionPipeline<S, C>) -> hyphy_etl::Result<()>
where
    S: hyphy_etl::core::Storage,
    C: ConfigProvider,
{
    let batch = pipeline.extract().await?;
    let registry = pipeline.registry();

    println!("🔍 Dry Run Analysis:");
    println!();
    println!("📂 Method directories:");
    for method in registry.methods() {
        let directory = registry.directory_for(method.as_ref());
        let count = batch.listing.get(directory).map_or(0, |files| files.len());
        println!("  {:<7} {}/ ({} files)", method.name(), directory, count);
    }

    println!();
    println!("🧬 Genes ({}):", batch.genes.len());
    let root = Path::new(".");
    for gene in &batch.genes {
        let methods: Vec<String> = registry
            .resolve_for_file(gene, root, &batch.listing)
            .iter()
            .map(|resolved| resolved.adapter.name().to_string())
            .collect();
        println!("  {}: {}", gene, methods.join(", "));
    }

    Ok(())
}
