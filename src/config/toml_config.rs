use crate::core::ConfigProvider;
use crate::methods::MethodRegistry;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_group_labels, validate_non_empty_string, validate_path, validate_positive_number,
    Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_CONCURRENT_GENES: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub processing: Option<ProcessingConfig>,
    /// Method name to result directory, e.g. `CFEL = "CONTRASTFEL"`.
    pub methods: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub results_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_path: String,
    pub tabular: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub concurrent_genes: Option<usize>,
    pub default_groups: Option<Vec<String>>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${RESULTS_DIR})，未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_path("input.results_path", &self.input.results_path)?;
        validate_path("output.output_path", &self.output.output_path)?;

        if let Some(concurrent) = self.processing.as_ref().and_then(|p| p.concurrent_genes) {
            validate_positive_number("processing.concurrent_genes", concurrent, 1)?;
        }

        if let Some(groups) = self
            .processing
            .as_ref()
            .and_then(|p| p.default_groups.as_ref())
        {
            validate_group_labels("processing.default_groups", groups)?;
        }

        // 方法名稱必須是已註冊的 HyPhy 方法
        if let Some(methods) = &self.methods {
            let registry = MethodRegistry::with_defaults();
            for (name, directory) in methods {
                if registry.get(name).is_none() {
                    let known: Vec<&str> = registry.methods().iter().map(|m| m.name()).collect();
                    return Err(EtlError::InvalidConfigValueError {
                        field: "methods".to_string(),
                        value: name.clone(),
                        reason: format!("Unknown method. Known methods: {}", known.join(", ")),
                    });
                }
                validate_non_empty_string(&format!("methods.{}", name), directory)?;
            }
        }

        Ok(())
    }

    /// 是否輸出 .tab 檔
    pub fn tabular(&self) -> bool {
        self.output.tabular.unwrap_or(false)
    }

    /// 取得同時處理的基因數
    pub fn concurrent_genes(&self) -> usize {
        self.processing
            .as_ref()
            .and_then(|p| p.concurrent_genes)
            .unwrap_or(DEFAULT_CONCURRENT_GENES)
    }

    pub fn default_groups(&self) -> Vec<String> {
        self.processing
            .as_ref()
            .and_then(|p| p.default_groups.clone())
            .unwrap_or_else(|| vec!["test".to_string(), "reference".to_string()])
    }
}

impl ConfigProvider for TomlConfig {
    fn results_path(&self) -> &str {
        &self.input.results_path
    }

    fn output_path(&self) -> &str {
        &self.output.output_path
    }

    fn concurrent_genes(&self) -> usize {
        self.concurrent_genes()
    }

    fn tabular(&self) -> bool {
        self.tabular()
    }

    fn default_groups(&self) -> Vec<String> {
        self.default_groups()
    }

    fn method_directories(&self) -> HashMap<String, String> {
        self.methods.clone().unwrap_or_default()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[input]
results_path = "./results"

[output]
output_path = "./combined"
tabular = true

[processing]
concurrent_genes = 8
default_groups = ["Foreground", "Background"]

[methods]
CFEL = "contrast-fel"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.results_path(), "./results");
        assert_eq!(config.output_path(), "./combined");
        assert!(config.tabular());
        assert_eq!(config.concurrent_genes(), 8);
        assert_eq!(config.default_groups(), vec!["Foreground", "Background"]);
        assert_eq!(
            config.method_directories().get("CFEL").map(String::as_str),
            Some("contrast-fel")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let toml_content = r#"
[input]
results_path = "."

[output]
output_path = "."
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(!config.tabular());
        assert_eq!(config.concurrent_genes(), 4);
        assert_eq!(config.default_groups(), vec!["test", "reference"]);
        assert!(config.method_directories().is_empty());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("HYPHY_ETL_TEST_RESULTS", "/data/hyphy");

        let toml_content = r#"
[input]
results_path = "${HYPHY_ETL_TEST_RESULTS}"

[output]
output_path = "${HYPHY_ETL_TEST_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.input.results_path, "/data/hyphy");
        assert_eq!(config.output.output_path, "${HYPHY_ETL_TEST_UNSET_VAR}");

        std::env::remove_var("HYPHY_ETL_TEST_RESULTS");
    }

    #[test]
    fn test_config_validation() {
        let zero_workers = r#"
[input]
results_path = "."

[output]
output_path = "."

[processing]
concurrent_genes = 0
"#;
        let config = TomlConfig::from_toml_str(zero_workers).unwrap();
        assert!(config.validate().is_err());

        let unknown_method = r#"
[input]
results_path = "."

[output]
output_path = "."

[methods]
SLAC = "slac"
"#;
        let config = TomlConfig::from_toml_str(unknown_method).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EtlError::InvalidConfigValueError { .. })
        ));

        let duplicate_groups = r#"
[input]
results_path = "."

[output]
output_path = "."

[processing]
default_groups = ["test", "test"]
"#;
        let config = TomlConfig::from_toml_str(duplicate_groups).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = TomlConfig::from_toml_str("[input]\nresults_path = \".\"\n").unwrap_err();
        assert!(matches!(err, EtlError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[input]
results_path = "./from-file"

[output]
output_path = "./output"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.results_path(), "./from-file");
    }
}
