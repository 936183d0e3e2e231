use axum::{
    BoxError, Json,
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("IntegrityError: {0}")]
    Integrity(String),

    #[error("Unavailable")]
    Unavailable(#[source] libsql::Error),

    #[error("DecodeError: {0}")]
    Decode(String),
}

/// Primary result code for UNIQUE, FOREIGN KEY, NOT NULL and CHECK violations.
/// Extended codes carry it in the low byte.
const SQLITE_CONSTRAINT: i32 = 19;

impl From<libsql::Error> for DbError {
    fn from(error: libsql::Error) -> Self {
        match error {
            libsql::Error::SqliteFailure(code, msg) if code & 0xff == SQLITE_CONSTRAINT => DbError::Integrity(msg),
            other => DbError::Unavailable(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("NotFound")]
    NotFound,

    #[error("ValidationError: {0}")]
    Validation(String),

    #[error("Timeout")]
    Timeout,

    #[error("InternalError: {0}")]
    Internal(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_param("query", &rejection.body_text())
    }
}

/// Error handler for the middleware stack: request timeouts and anything else a
/// layer fails with.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    pub fn invalid_param(param: &str, reason: &str) -> Self {
        ApiError::Validation(format!("{}: {}", param, reason))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) | ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::NotFound => "Not found.".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Timeout => "Request timed out.".to_string(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                "A server error occurred.".to_string()
            }
            ApiError::Db(e) => {
                tracing::error!(error = %crate::unpack_error(e), "request failed");
                "A server error occurred.".to_string()
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::invalid_param("date", "enter a valid date").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DbError::Integrity("UNIQUE constraint failed: book_club.url".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unavailable_logs_libsql_message_once() {
        // 14 is SQLITE_CANTOPEN
        let err = DbError::from(libsql::Error::SqliteFailure(14, "unable to open database file".into()));
        assert!(matches!(err, DbError::Unavailable(_)), "got {err:?}");

        let unpacked = crate::unpack_error(&err);
        assert!(unpacked.starts_with("Unavailable: "), "got {unpacked}");
        assert_eq!(unpacked.matches("unable to open").count(), 1, "got {unpacked}");
    }

    #[test]
    fn test_constraint_code_maps_to_integrity() {
        // 2067 is SQLITE_CONSTRAINT_UNIQUE
        let err = DbError::from(libsql::Error::SqliteFailure(2067, "UNIQUE constraint failed: book_club.url".into()));
        assert!(matches!(err, DbError::Integrity(ref m) if m.contains("book_club.url")), "got {err:?}");

        // 1 is SQLITE_ERROR
        let err = DbError::from(libsql::Error::SqliteFailure(1, "no such table: book_club".into()));
        assert!(matches!(err, DbError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_elapsed_maps_to_timeout() {
        let err: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(handle_middleware_error(err).await, ApiError::Timeout));

        let err: BoxError = "layer broke".into();
        let mapped = handle_middleware_error(err).await;
        assert_eq!(mapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_param_names_the_parameter() {
        let err = ApiError::invalid_param("integration", "expected an integer id");
        assert_eq!(err.to_string(), "ValidationError: integration: expected an integer id");
    }
}
