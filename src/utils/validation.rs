use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Default comparison groups need at least one label and no duplicates.
pub fn validate_group_labels(field_name: &str, labels: &[String]) -> Result<()> {
    if labels.is_empty() {
        return Err(EtlError::ConfigValidationError {
            field: field_name.to_string(),
            message: "At least one group label is required".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for label in labels {
        validate_non_empty_string(field_name, label)?;
        if !seen.insert(label.as_str()) {
            return Err(EtlError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: label.clone(),
                reason: "Duplicate group label".to_string(),
            });
        }
    }
    Ok(())
}

/// Checks records against a declared schema.
pub struct FieldValidator;

impl FieldValidator {
    /// Names from `required` that `record` does not carry, in `required` order.
    pub fn validate<S: AsRef<str>>(record: &Record, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|field| !record.contains(field))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("results_path", "./results").is_ok());
        assert!(validate_path("results_path", "").is_err());
        assert!(validate_path("results_path", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("concurrent_genes", 4, 1).is_ok());
        assert!(validate_positive_number("concurrent_genes", 0, 1).is_err());
    }

    #[test]
    fn test_validate_group_labels() {
        let ok = vec!["test".to_string(), "reference".to_string()];
        assert!(validate_group_labels("default_groups", &ok).is_ok());
        assert!(validate_group_labels("default_groups", &[]).is_err());

        let dup = vec!["test".to_string(), "test".to_string()];
        assert!(validate_group_labels("default_groups", &dup).is_err());
        assert!(validate_group_labels("default_groups", &[" ".to_string()]).is_err());
    }

    #[test]
    fn test_field_validator_reports_missing_in_order() {
        let record = Record::new().with("gene", "g1").with("N", 4i64);
        let missing = FieldValidator::validate(&record, &["gene", "T", "N", "sites"]);
        assert_eq!(missing, vec!["T", "sites"]);
        assert!(FieldValidator::validate(&record, &["gene"]).is_empty());
    }
}
