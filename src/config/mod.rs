pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_args::CliConfig;

#[cfg(feature = "cli")]
mod cli_args {
    use crate::core::ConfigProvider;
    use crate::utils::error::Result;
    use crate::utils::validation::{
        validate_group_labels, validate_path, validate_positive_number, Validate,
    };
    use clap::Parser;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "hyphy-etl")]
    #[command(about = "Combine HyPhy selection analysis results into summary tables")]
    pub struct CliConfig {
        /// Directory holding one sub-directory per HyPhy method
        #[arg(short, long, default_value = ".")]
        pub input: String,

        /// Directory the combined tables are written to
        #[arg(short, long, default_value = ".")]
        pub output: String,

        /// Write tab-delimited .tab files instead of .csv
        #[arg(long)]
        pub tabular: bool,

        #[arg(long, default_value = "4")]
        pub concurrent_genes: usize,

        /// Group labels used when no method reports any
        #[arg(long, value_delimiter = ',', default_value = "test,reference")]
        pub default_groups: Vec<String>,

        /// TOML configuration file; replaces the path and processing flags above
        #[arg(short, long)]
        pub config: Option<String>,

        /// List the genes and methods found without writing anything
        #[arg(long)]
        pub dry_run: bool,

        #[arg(short, long, help = "Enable verbose output")]
        pub verbose: bool,

        /// Emit logs as JSON lines
        #[arg(long)]
        pub log_json: bool,
    }

    impl ConfigProvider for CliConfig {
        fn results_path(&self) -> &str {
            &self.input
        }

        fn output_path(&self) -> &str {
            &self.output
        }

        fn concurrent_genes(&self) -> usize {
            self.concurrent_genes
        }

        fn tabular(&self) -> bool {
            self.tabular
        }

        fn default_groups(&self) -> Vec<String> {
            self.default_groups.clone()
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_path("input", &self.input)?;
            validate_path("output", &self.output)?;
            validate_positive_number("concurrent_genes", self.concurrent_genes, 1)?;
            validate_group_labels("default_groups", &self.default_groups)?;
            Ok(())
        }
    }

}
