pub use anyhow::anyhow;
use crate::{
    init_data::InitDataError, ledger::LedgerError, purchase::PayloadError, repository::RepoError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub enum AppError {
    BadRequest(anyhow::Error),
    NotFound(anyhow::Error),
    UnsupportedMedia(anyhow::Error),
    ServerError(anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(anyhow!(message.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e),
            Self::UnsupportedMedia(e) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, e),
            Self::ServerError(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        };

        let body = Json(json!({
            "error": error.to_string()
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if err.is::<InitDataError>() || err.is::<PayloadError>() || err.is::<LedgerError>() {
            return Self::BadRequest(err);
        }
        match err.downcast_ref::<RepoError>() {
            Some(RepoError::UserNotFound(_)) => Self::NotFound(err),
            Some(RepoError::Ledger(_) | RepoError::TaskAlreadyClaimed(_)) => {
                Self::BadRequest(err)
            }
            _ => Self::ServerError(err),
        }
    }
}
