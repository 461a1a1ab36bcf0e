use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Everything a room request can fail with.
///
/// `Unauthorized` deliberately covers both "no such room" and "token not
/// registered" at the guard so that callers cannot probe for room existence.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("room not found")]
    RoomNotFound,

    #[error("room is full")]
    RoomFull,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RoomNotFound => StatusCode::NOT_FOUND,
            Self::RoomFull => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Unauthorized => "Unauthorized".to_owned(),
            Self::RoomNotFound => "Room not found".to_owned(),
            Self::RoomFull => "Room is full".to_owned(),
            Self::BadRequest(reason) => reason.clone(),
            Self::Store(err) => {
                tracing::error!(error = %err, "room store failure");
                "Internal server error".to_owned()
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal failure");
                "Internal server error".to_owned()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::BadRequest(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::BadRequest(err.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::RoomNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::RoomFull.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::from("nope").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Store(sqlx::Error::PoolClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn store_failures_do_not_leak_details() {
        let response = AppError::Store(sqlx::Error::Protocol("secret table layout".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(!body.contains("secret"));
        assert!(body.contains("Internal server error"));
    }
}
