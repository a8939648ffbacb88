//! API Error Handling
//!
//! Every service error converts into an [`ApiError`], rendered as
//! `{"error": "..."}` with a matching status code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::deployment_service::DeploymentError;
use crate::service::log_service::LogError;
use crate::service::pipeline_service::PipelineError;
use crate::service::run_service::RunError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Conflict(msg) => msg,
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal server error".to_string()
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

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => ApiError::NotFound(format!("Pipeline {} not found", id)),
            PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(id) => ApiError::NotFound(format!("Run {} not found", id)),
            RunError::PipelineNotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            RunError::InvalidState(msg) => ApiError::Conflict(msg),
            RunError::AlreadyReported(stage) => {
                ApiError::Conflict(format!("Stage {} already reported", stage))
            }
            RunError::ValidationError(msg) => ApiError::BadRequest(msg),
            RunError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<LogError> for ApiError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::RunNotFound(id) => ApiError::NotFound(format!("Run {} not found", id)),
            LogError::ValidationError(msg) => ApiError::BadRequest(msg),
            LogError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::ValidationError(msg) => ApiError::BadRequest(msg),
            DeploymentError::NotInconsistent(msg) => ApiError::Conflict(msg),
            DeploymentError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_run_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(RunError::NotFound(id)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RunError::InvalidState("not queued".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RunError::AlreadyReported("test".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RunError::ValidationError("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_acknowledging_a_consistent_environment_conflicts() {
        assert_eq!(
            ApiError::from(DeploymentError::NotInconsistent("production".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_database_errors_hide_details() {
        let response = ApiError::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
