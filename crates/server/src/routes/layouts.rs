use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    error::ApiError,
    extract::{ApiJson, ApiQuery},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/save_layout", post(save_layout))
        .route("/get_layouts", get(list_layouts))
        .route("/load_layout", get(load_layout))
        .route("/delete_layout", delete(delete_layout))
        .route("/rename_layout", post(rename_layout))
}

#[derive(Debug, Deserialize)]
struct SaveLayout {
    layout_name: String,
    layout_data: Value,
}

#[derive(Debug, Deserialize)]
struct LayoutName {
    layout_name: String,
}

#[derive(Debug, Deserialize)]
struct RenameLayout {
    old_name: String,
    new_name: String,
}

async fn save_layout(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SaveLayout>,
) -> Result<Json<Value>, ApiError> {
    state
        .layouts()
        .save(&payload.layout_name, &payload.layout_data)
        .await?;
    Ok(Json(json!({
        "message": format!("Layout '{}' saved successfully", payload.layout_name)
    })))
}

async fn list_layouts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let layouts = state.layouts().list().await?;
    Ok(Json(json!({ "layouts": layouts })))
}

async fn load_layout(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LayoutName>,
) -> Result<Json<Value>, ApiError> {
    let layout_data = state.layouts().load(&params.layout_name).await?;
    Ok(Json(json!({ "layout_data": layout_data })))
}

async fn delete_layout(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LayoutName>,
) -> Result<Json<Value>, ApiError> {
    state.layouts().delete(&payload.layout_name).await?;
    Ok(Json(json!({
        "message": format!("Layout '{}' deleted successfully", payload.layout_name)
    })))
}

async fn rename_layout(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RenameLayout>,
) -> Result<Json<Value>, ApiError> {
    state
        .layouts()
        .rename(&payload.old_name, &payload.new_name)
        .await?;
    Ok(Json(json!({
        "message": format!(
            "Layout '{}' renamed to '{}'",
            payload.old_name, payload.new_name
        )
    })))
}
