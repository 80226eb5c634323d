use std::any::Any;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{
    envelope::Envelope,
    error::{ApiError, ErrorReport},
};
use crate::environment::Environment;

/// Exposes the cause of server errors outside production.
///
/// Handlers render 500s with a generic message and an [`ErrorReport`]
/// extension. In development and test the body is rewritten to carry the
/// real message and its source chain.
pub async fn error_handler(
    State(environment): State<Environment>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if environment.is_production() {
        return response;
    }

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let envelope = Envelope::failure(report.message).with_details(json!({
        "causes": report.causes,
    }));
    let Ok(body) = serde_json::to_vec(&envelope) else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body))
}

/// Turns a handler panic into a 500 envelope.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    ApiError::Internal(format!("Handler panicked: {message}")).into_response()
}
