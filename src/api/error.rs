use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::conversation::orchestrator::TurnError;

/// Errors that cross the HTTP boundary. Everything else in the pipeline is
/// absorbed into fallbacks before it gets here; the conversational channel
/// never carries a raw error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidImage(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidImage(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::EmptyMessage => Self::InvalidInput(err.to_string()),
            TurnError::InvalidImage => Self::InvalidImage(err.to_string()),
        }
    }
}
