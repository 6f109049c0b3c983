//! API handlers module

pub mod chat;
pub mod health;
pub mod knowledge_bases;
pub mod retrieve;

use kbridge_common::errors::AppError;
use validator::ValidationErrors;

/// Map `validator` failures onto the API error type
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

/// Reject limits above the configured ceiling
pub(crate) fn check_result_limit(limit: Option<usize>, max: usize) -> Result<(), AppError> {
    match limit {
        Some(limit) if limit > max => Err(AppError::Validation {
            message: format!("resultLimit must be at most {}", max),
            field: Some("resultLimit".to_string()),
        }),
        _ => Ok(()),
    }
}
