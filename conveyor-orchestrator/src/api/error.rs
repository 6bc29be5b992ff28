//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::{job_service::JobError, pipeline_service::PipelineError, run_service::RunError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            JobError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => ApiError::NotFound(format!("Pipeline {} not found", id)),
            PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(id) => ApiError::NotFound(format!("Pipeline run {} not found", id)),
            RunError::PipelineNotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            RunError::EmptyPipeline(id) => {
                ApiError::BadRequest(format!("Pipeline {} has no jobs to run", id))
            }
            RunError::InvalidState(msg) => ApiError::Conflict(msg),
            RunError::DatabaseError(err) => ApiError::DatabaseError(err),
            RunError::CoordinatorError(err) => ApiError::InternalError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (ApiError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::Conflict("x".to_string()), StatusCode::CONFLICT),
            (
                ApiError::DatabaseError(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::InternalError("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_run_error_mapping() {
        let id = Uuid::new_v4();

        let empty = ApiError::from(RunError::EmptyPipeline(id));
        assert_eq!(empty.into_response().status(), StatusCode::BAD_REQUEST);

        let invalid = ApiError::from(RunError::InvalidState("finished".to_string()));
        assert_eq!(invalid.into_response().status(), StatusCode::CONFLICT);

        let missing = ApiError::from(RunError::NotFound(id));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let invalid = ApiError::from(PipelineError::ValidationError("bad".to_string()));
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let busy = ApiError::from(PipelineError::Conflict("busy".to_string()));
        assert_eq!(busy.into_response().status(), StatusCode::CONFLICT);
    }
}
