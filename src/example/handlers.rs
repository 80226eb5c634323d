use axum::extract::{rejection::QueryRejection, Path, Query, State};
use sea_orm::{
    ActiveModelTrait as _, ColumnTrait as _, EntityTrait as _, NotSet, QueryFilter as _,
    QueryOrder as _, QuerySelect as _, Set,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::entity::{self, ExampleStatus};
use crate::{
    api::{ApiError, ApiResponse, ValidatedJson},
    app::App,
};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<ExampleStatus>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExample {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub status: Option<ExampleStatus>,
    pub metadata: Option<serde_json::Value>,
}

/// Newest records first, optionally filtered by status.
pub async fn list(
    State(app): State<App>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<entity::Model>>, ApiError> {
    let Query(params) = params?;

    let mut query = entity::Entity::find().order_by_desc(entity::Column::CreatedAt);
    if let Some(status) = params.status {
        query = query.filter(entity::Column::Status.eq(status));
    }

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = query.limit(limit).all(app.connection()).await?;

    Ok(ApiResponse::ok(records))
}

pub async fn show(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<ApiResponse<entity::Model>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid id '{id}'")))?;

    entity::Entity::find_by_id(id)
        .one(app.connection())
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Example record {id} not found")))
}

pub async fn create(
    State(app): State<App>,
    ValidatedJson(payload): ValidatedJson<CreateExample>,
) -> Result<ApiResponse<entity::Model>, ApiError> {
    if payload.metadata.as_ref().is_some_and(|metadata| !metadata.is_object()) {
        return Err(ApiError::BadRequest(
            "metadata must be a JSON object".to_string(),
        ));
    }

    let record = entity::ActiveModel {
        name: Set(payload.name),
        description: Set(payload.description),
        status: payload.status.map_or(NotSet, Set),
        metadata: payload.metadata.map_or(NotSet, Set),
        ..Default::default()
    }
    .insert(app.connection())
    .await?;

    Ok(ApiResponse::created(record))
}
