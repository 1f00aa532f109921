use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

use crate::models::ErrorResponse;
use crate::pipeline::{FieldIssue, PipelineError};

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Race input failed schema or transform validation
    ValidationError(String, Vec<FieldIssue>),
    /// Malformed request outside the pipeline's checks
    BadRequest(String),
    /// Server is running without a loaded artifact
    ModelUnavailable,
    /// Model failed to produce scores
    PredictionError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg, _) => write!(f, "Validation error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ModelUnavailable => write!(f, "Model unavailable: no pipeline artifact loaded"),
            AppError::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err.as_validation() {
            // the message keeps the batch position, the details keep the issues
            Some(validation) => AppError::ValidationError(err.to_string(), validation.issues.clone()),
            None => AppError::PredictionError(err.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(..) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PredictionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message, details) = match self {
            AppError::ValidationError(msg, issues) => {
                ("validation_error", msg.clone(), issues.clone())
            }
            AppError::BadRequest(msg) => ("bad_request", msg.clone(), Vec::new()),
            AppError::ModelUnavailable => ("model_unavailable", self.to_string(), Vec::new()),
            AppError::PredictionError(msg) => ("prediction_error", msg.clone(), Vec::new()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        })
    }
}

/// Validation functions
pub fn validate_batch_size(count: usize, max: usize) -> Result<(), AppError> {
    if count == 0 {
        return Err(AppError::BadRequest("Batch must contain at least one race".to_string()));
    }
    if count > max {
        return Err(AppError::BadRequest(format!(
            "Batch of {} races exceeds the limit of {}",
            count, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Problem, ValidationError};

    fn validation() -> ValidationError {
        ValidationError::new(vec![FieldIssue::entrant(
            "grid",
            1,
            "sainz",
            Problem::Missing,
        )])
    }

    #[test]
    fn test_validate_batch_size() {
        assert!(validate_batch_size(1, 4).is_ok());
        assert!(validate_batch_size(4, 4).is_ok());
        assert!(validate_batch_size(0, 4).is_err());
        assert!(validate_batch_size(5, 4).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::BadRequest("test error".to_string());
        assert!(err.to_string().contains("Bad request"));
        assert!(AppError::ModelUnavailable.to_string().contains("no pipeline artifact"));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::from(PipelineError::Validation(validation())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ModelUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::PredictionError("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_pipeline_error() {
        let err: AppError = PipelineError::Validation(validation()).into();
        match err {
            AppError::ValidationError(msg, issues) => {
                assert!(msg.starts_with("invalid race input"));
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "grid");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err: AppError = PipelineError::Batch {
            index: 3,
            source: Box::new(PipelineError::Validation(validation())),
        }
        .into();
        match err {
            AppError::ValidationError(msg, issues) => {
                assert!(msg.starts_with("race 3: "));
                assert_eq!(issues.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let err: AppError = PipelineError::Inference("nan score".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
