use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Standard body for every JSON response: `{ success, data | error, timestamp }`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra error information (validation failures, development diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            timestamp: Utc::now(),
        }
    }
}

impl Envelope {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Successful handler result wrapped in an [`Envelope`].
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    status: StatusCode,
    data: T,
}

impl<T> ApiResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    pub const fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::success(self.data))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_envelope_omits_error_fields() {
        let value = serde_json::to_value(Envelope::success(json!({ "id": 1 }))).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"], json!({ "id": 1 }));
        assert!(value.get("error").is_none());
        assert!(value.get("details").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn failure_envelope_omits_data() {
        let value = serde_json::to_value(
            Envelope::failure("boom").with_details(json!({ "field": "name" })),
        )
        .unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("boom"));
        assert_eq!(value["details"]["field"], json!("name"));
        assert!(value.get("data").is_none());
    }
}
