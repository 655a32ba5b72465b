use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// ApiError
///
/// The abstract outcome taxonomy shared by the access pipeline and every handler.
/// Each variant maps to exactly one HTTP status. Messages carried by `NotFound` and
/// `Internal` are fixed strings chosen by the caller, never the text of an
/// underlying collaborator error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential, or a credential the identity resolver rejected.
    #[error("authentication required")]
    Unauthenticated,
    /// Coarse policy deny, ownership deny, or any failure while evaluating either.
    #[error("permission denied")]
    PermissionDenied,
    /// Malformed identifier or out-of-range parameter.
    #[error("{0}")]
    InvalidArgument(String),
    /// Only produced after authorization has succeeded.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Collaborator failure unrelated to authorization.
    #[error("{0}")]
    Internal(&'static str),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidArgument(message.into())
    }

    /// Logs the collaborator error with its context and returns the generic outcome.
    pub fn internal<E: std::fmt::Debug>(context: &'static str, err: E) -> Self {
        tracing::error!(error = ?err, "{}", context);
        ApiError::Internal(context)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
