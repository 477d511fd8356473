use crate::auth::TokenError;
use crate::pipeline::PipelineError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use log::error;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::Conflict(err.to_string()),
            e if e.is_validation() => ApiError::BadRequest(e.to_string()),
            e => {
                error!("User store failure: {}", e);
                ApiError::Internal
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        error!("{}", err);
        ApiError::Internal
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::DetectorUnavailable => ApiError::Unavailable(err.to_string()),
            PipelineError::UnknownClass(_) | PipelineError::Media(_) => {
                ApiError::BadRequest(err.to_string())
            }
            PipelineError::Detection(e) => {
                error!("Detection failed: {}", e);
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::from(StoreError::Duplicate).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::InvalidEmail).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::DetectorUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Internal.to_string(), "Internal server error");
    }
}
