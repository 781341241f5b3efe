use crate::error::StoreError;
use crate::types::{MatchId, MatchStatus};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

pub type ServiceResult<T> = Result<T, AppError>;
pub type ServiceResponse<T> = ServiceResult<Json<T>>;

#[derive(Debug)]
pub enum AppError {
    Unexpected,
    DecodingRequestFailed(String),
    ValidationFailed(String),

    MatchesNotFound(MatchId),
    MatchesInvalidTransition { from: MatchStatus, to: MatchStatus },
}

impl From<StoreError> for AppError {
    #[track_caller]
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(message) => AppError::ValidationFailed(message),
            StoreError::MatchNotFound(match_id) => AppError::MatchesNotFound(match_id),
            StoreError::InvalidTransition { from, to } => {
                AppError::MatchesInvalidTransition { from, to }
            }
            other => {
                let caller = std::panic::Location::caller();
                error!("An unexpected error has occurred at {caller}: {other}");
                AppError::Unexpected
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::DecodingRequestFailed(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::DecodingRequestFailed(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::DecodingRequestFailed(rejection.body_text())
    }
}

impl AppError {
    pub const fn code(&self) -> &'static str {
        match self {
            AppError::Unexpected => "unexpected",
            AppError::DecodingRequestFailed(_) => "request.decoding_failed",
            AppError::ValidationFailed(_) => "validation_failed",

            AppError::MatchesNotFound(_) => "matches.not_found",
            AppError::MatchesInvalidTransition { .. } => "matches.invalid_transition",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Unexpected => "An unexpected error has occurred.".to_string(),
            AppError::DecodingRequestFailed(detail) => format!("Failed to decode request: {detail}"),
            AppError::ValidationFailed(message) => message.clone(),

            AppError::MatchesNotFound(match_id) => format!("Match {match_id} could not be found."),
            AppError::MatchesInvalidTransition { from, to } => {
                format!("A {from} match cannot become {to}.")
            }
        }
    }

    pub const fn http_status_code(&self) -> StatusCode {
        match self {
            AppError::DecodingRequestFailed(_) | AppError::ValidationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::MatchesNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MatchesInvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn response_parts(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.http_status_code();
        let response = ErrorResponse {
            code: self.code(),
            message: self.message(),
        };
        (status, Json(response))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.response_parts().into_response()
    }
}
