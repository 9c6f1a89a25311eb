//! Introspection endpoints under `/_sandbox`.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use db::ItemRepository;
use sandbox_core::{ProjectManifest, TableSpec};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct TablesResponse {
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemResponse {
    pub partition: String,
    pub sort: Option<String>,
    #[schema(value_type = Object)]
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

impl From<db::Item> for ItemResponse {
    fn from(item: db::Item) -> Self {
        Self {
            partition: item.partition,
            sort: item.sort,
            value: item.value,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemsResponse {
    pub table: String,
    pub items: Vec<ItemResponse>,
}

async fn items(state: &AppState) -> Result<ItemRepository, AppError> {
    state
        .items()
        .await
        .ok_or_else(|| AppError::ServiceUnavailable("Data store is not running".to_string()))
}

#[utoipa::path(
    get,
    path = "/_sandbox/manifest",
    responses(
        (status = 200, description = "Project manifest in effect", body = ProjectManifest)
    ),
    tag = "sandbox"
)]
pub async fn get_manifest(State(state): State<AppState>) -> Json<ProjectManifest> {
    Json(state.manifest.as_ref().clone())
}

#[utoipa::path(
    get,
    path = "/_sandbox/tables",
    responses(
        (status = 200, description = "Tables registered in the data store", body = TablesResponse),
        (status = 503, description = "Data store is not running")
    ),
    tag = "sandbox"
)]
pub async fn list_tables(State(state): State<AppState>) -> Result<Json<TablesResponse>, AppError> {
    let tables = items(&state).await?.tables().await?;
    Ok(Json(TablesResponse { tables }))
}

#[utoipa::path(
    get,
    path = "/_sandbox/tables/{name}/items",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Items stored in the table", body = ItemsResponse),
        (status = 404, description = "Table not found"),
        (status = 503, description = "Data store is not running")
    ),
    tag = "sandbox"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = items(&state).await?.list(&name).await?;
    Ok(Json(ItemsResponse {
        table: name,
        items: items.into_iter().map(ItemResponse::from).collect(),
    }))
}
