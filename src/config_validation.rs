//! Field-level validation for suite configuration files.
//!
//! Validators return a [`ValidationError`] naming the offending field;
//! [`ValidationContext`] collects them under a dotted path so one pass can
//! report every problem in a file.

use std::time::Duration;
use thiserror::Error;

/// Longest worker deadline a run accepts.
pub const MAX_WORKER_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Config file format versions this build understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Validation error with context about which field failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}': {message}")]
    FieldError { field: String, message: String },

    #[error("Field '{field}': value {value} is out of range ({min} to {max})")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}': invalid format - {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation context for building error messages.
pub struct ValidationContext {
    field_path: Vec<String>,
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self {
            field_path: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Enter a nested field context.
    pub fn enter(&mut self, field: &str) {
        self.field_path.push(field.to_string());
    }

    /// Exit the current field context.
    pub fn exit(&mut self) {
        self.field_path.pop();
    }

    pub fn current_path(&self) -> String {
        self.field_path.join(".")
    }

    /// Record the error of `result`, if any, under the current path.
    pub fn check(&mut self, result: ValidationResult<()>) {
        if let Err(e) = result {
            self.field_error(e.to_string());
        }
    }

    /// Add a field error with automatic path.
    pub fn field_error(&mut self, message: String) {
        self.errors.push(ValidationError::FieldError {
            field: self.current_path(),
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Consume the context and return a result.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
            Err(ValidationError::Multiple(messages.join("; ")))
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct VersionValidator;

impl VersionValidator {
    pub fn validate(version: &str) -> ValidationResult<()> {
        if SUPPORTED_VERSIONS.contains(&version.trim()) {
            Ok(())
        } else {
            Err(ValidationError::InvalidFormat {
                field: "version".to_string(),
                message: format!(
                    "unsupported version '{}'. Supported versions: {}",
                    version,
                    SUPPORTED_VERSIONS.join(", ")
                ),
            })
        }
    }
}

pub struct UrlValidator;

impl UrlValidator {
    pub fn validate(url: &str) -> ValidationResult<()> {
        if url.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: format!("URL must start with http:// or https://, got: {}", url),
            });
        }

        if url.contains(' ') {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: "URL cannot contain spaces".to_string(),
            });
        }

        Ok(())
    }
}

pub struct DurationValidator;

impl DurationValidator {
    pub fn validate(duration_str: &str) -> ValidationResult<()> {
        crate::utils::parse_duration_string(duration_str)
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidFormat {
                field: "duration".to_string(),
                message: format!("Invalid duration format '{}': {}", duration_str, e),
            })
    }
}

pub struct RangeValidator;

impl RangeValidator {
    pub fn validate_f64(value: f64, min: f64, max: f64, field: &str) -> ValidationResult<()> {
        if !(min..=max).contains(&value) {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_max_duration(value: Duration, max: Duration, field: &str) -> ValidationResult<()> {
        if value > max {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: format!("{:?}", value),
                min: "0s".to_string(),
                max: format!("{:?}", max),
            });
        }
        Ok(())
    }

    pub fn validate_positive_u64(value: u64, field: &str) -> ValidationResult<()> {
        if value == 0 {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: "0".to_string(),
                min: "1".to_string(),
                max: "unlimited".to_string(),
            });
        }
        Ok(())
    }
}

/// Validator for escalation level lists.
pub struct LevelsValidator;

impl LevelsValidator {
    pub fn validate(levels: &[usize]) -> ValidationResult<()> {
        if levels.is_empty() {
            return Err(ValidationError::FieldError {
                field: "levels".to_string(),
                message: "at least one level is required".to_string(),
            });
        }
        if levels[0] == 0 || levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ValidationError::FieldError {
                field: "levels".to_string(),
                message: format!("levels must be positive and strictly increasing, got {:?}", levels),
            });
        }
        Ok(())
    }
}
