use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("{method} result is malformed: {message}")]
    MalformedResult { method: String, message: String },

    #[error("{method} needs comparison groups before it can emit group fields")]
    MethodRequiresGroups { method: String },

    #[error("Inconsistent comparison groups for {gene}: {detail}")]
    InconsistentGroups { gene: String, detail: String },

    #[error("No genes found under {path}")]
    NoGenesFound { path: String },

    #[error("Worker task failed: {message}")]
    TaskError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    InputData,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::IoError(_) | EtlError::CsvError(_) => ErrorCategory::Io,
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::SerializationError(_)
            | EtlError::MalformedResult { .. }
            | EtlError::NoGenesFound { .. } => ErrorCategory::InputData,
            EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. }
            | EtlError::MethodRequiresGroups { .. }
            | EtlError::InconsistentGroups { .. }
            | EtlError::TaskError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 只影響單一方法或單一基因，批次仍會完成
            EtlError::MethodRequiresGroups { .. } | EtlError::ValidationError { .. } => {
                ErrorSeverity::Low
            }
            EtlError::MalformedResult { .. }
            | EtlError::SerializationError(_)
            | EtlError::InconsistentGroups { .. } => ErrorSeverity::Medium,
            EtlError::ProcessingError { .. }
            | EtlError::NoGenesFound { .. }
            | EtlError::TaskError { .. }
            | EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorSeverity::High,
            EtlError::IoError(_) | EtlError::CsvError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::IoError(_) => {
                "Check that the input and output directories exist and are accessible".to_string()
            }
            EtlError::CsvError(_) => "Check free disk space and output permissions".to_string(),
            EtlError::SerializationError(_) | EtlError::MalformedResult { .. } => {
                "Re-run the HyPhy analysis or check that the JSON file is complete".to_string()
            }
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => {
                "Review the command line flags or the TOML configuration file".to_string()
            }
            EtlError::NoGenesFound { .. } => "Point --input at a directory containing method folders such as BUSTED/ or FEL/ with <gene>.<METHOD>.json files".to_string(),
            EtlError::InconsistentGroups { .. } => {
                "Make sure RELAX and Contrast-FEL were run with the same branch labels".to_string()
            }
            EtlError::MethodRequiresGroups { .. } => {
                "Label the tested branches so comparison groups can be detected".to_string()
            }
            EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. }
            | EtlError::TaskError { .. } => "Re-run with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Io => format!("Could not read or write files: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::InputData => format!("Problem with the HyPhy results: {}", self),
            ErrorCategory::Processing => format!("Processing failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
