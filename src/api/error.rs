use std::error::Error as _;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use validator::ValidationErrors;

use super::envelope::Envelope;

/// Body text of every server error that reaches a production client.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Error type returned by handlers and extractors.
///
/// Every variant renders as an [`Envelope`] with `success: false`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("Too many requests, please try again later.")]
    TooManyRequests,
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// What actually went wrong behind a 500 response.
///
/// Attached as a response extension; the error handler middleware decides
/// whether it reaches the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub causes: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            causes,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let report = ErrorReport::from_error(&self);
            tracing::error!(
                error = %report.message,
                source = ?self.source().map(ToString::to_string),
                "Request failed"
            );

            let mut response = (status, Json(Envelope::failure(INTERNAL_ERROR_MESSAGE))).into_response();
            response.extensions_mut().insert(report);
            return response;
        }

        let envelope = match self {
            Self::Validation(errors) => {
                Envelope::failure("Validation failed").with_details(serde_json::json!(errors))
            }
            other => Envelope::failure(other.to_string()),
        };

        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::TooManyRequests.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Database(DbErr::Custom("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn server_errors_carry_a_report() {
        let response = ApiError::Database(DbErr::Custom("disk full".into())).into_response();

        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.message.starts_with("Database error"));
        assert!(report.message.contains("disk full"));
    }

    #[test]
    fn client_errors_carry_no_report() {
        let response = ApiError::NotFound("missing".into()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }
}
