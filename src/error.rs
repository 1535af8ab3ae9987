//! Error types shared by the stores, the session layer and the HTTP handlers.
//!
//! Handlers return `Result<T, AppError>`; [`AppError`] implements
//! [`actix_web::ResponseError`] so every failure becomes a JSON body of the
//! form `{"error": "..."}`. Store failures are logged in full but only a
//! generic message reaches the client.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::relay::RelayError;

/// Failure reading or writing one of the persistent stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials.
    #[error("{0}")]
    Auth(String),

    /// Registration of a username that already exists.
    #[error("{0}")]
    DuplicateUser(String),

    /// Authenticated, but the role does not allow the operation.
    #[error("{0}")]
    Authorization(String),

    /// No token, an invalid token, or a browser session that has ended.
    #[error("{0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("chat service error: {0}")]
    Relay(#[from] RelayError),

    #[error("{0}")]
    BadRequest(String),

    /// A reply is already pending for this session.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// A server-side fault unrelated to storage, such as token signing.
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::DuplicateUser(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Relay(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Store(e) => {
                error!(error = %e, "store error");
                "internal server error".to_owned()
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn store_errors_hide_details() {
        let err = AppError::Store(StoreError::Corrupt("row 7: expected value".into()));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "internal server error");
    }

    #[actix_web::test]
    async fn internal_errors_are_server_faults() {
        let err = AppError::Internal("could not sign token: InvalidKeyFormat".into());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "internal server error");
    }

    #[actix_web::test]
    async fn relay_errors_carry_the_reason() {
        let err = AppError::Relay(RelayError::MissingField("outputs".into()));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].as_str().unwrap().contains("outputs"));
    }

    #[test]
    fn authorization_is_forbidden() {
        let err = AppError::Authorization("Access denied".into());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::DuplicateUser("Username already exists".into()).status_code(),
            StatusCode::CONFLICT
        );
    }
}
