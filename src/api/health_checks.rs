use axum::{
    extract::State,
    http::{Method, Uri},
};
use serde::Serialize;
use tracing::warn;

use super::{envelope::ApiResponse, error::ApiError};
use crate::app::App;

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: &'static str,
    pub environment: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub service: String,
    pub version: &'static str,
    pub environment: String,
    pub uptime_seconds: u64,
}

pub async fn root(State(app): State<App>) -> ApiResponse<ServiceInfo> {
    ApiResponse::ok(ServiceInfo {
        message: format!("{} is running", app.config.service.name),
        service: app.config.service.name.clone(),
        version: app.app_info.version,
        environment: app.environment.to_string(),
    })
}

/// Reports healthy only when the database answers a ping.
pub async fn health(State(app): State<App>) -> Result<ApiResponse<HealthReport>, ApiError> {
    if let Err(error) = app.db.health_check().await {
        warn!(%error, "Health check failed");
        return Err(ApiError::ServiceUnavailable(
            "Database connection failed".to_string(),
        ));
    }

    Ok(ApiResponse::ok(HealthReport {
        status: "healthy",
        database: "connected",
        service: app.config.service.name.clone(),
        version: app.app_info.version,
        environment: app.environment.to_string(),
        uptime_seconds: app.uptime().as_secs(),
    }))
}

pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {method} {} not found", uri.path()))
}
