use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::venv::CreateVenv;

use crate::{AppState, error::ApiError, extract::ApiJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/get_env", get(environments))
        .route("/create_venv", post(create_venv))
        .route("/delete_env/{name}", delete(delete_env))
        .route("/get_py_versions", get(python_versions))
}

async fn environments(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.venvs().environments().await?))
}

#[derive(Debug, Deserialize)]
struct CreateVenvForm {
    #[serde(rename = "envName")]
    env_name: Option<String>,
    description: Option<String>,
    #[serde(rename = "pyVersion")]
    python: Option<String>,
    #[serde(rename = "GCCversion")]
    gcc: Option<String>,
}

async fn create_venv(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<CreateVenvForm>,
) -> Result<Json<Value>, ApiError> {
    let message = state
        .venvs()
        .create(CreateVenv {
            env_name: form.env_name,
            description: form.description,
            python: form.python,
            gcc: form.gcc,
        })
        .await?;
    Ok(Json(json!({ "message": message })))
}

async fn delete_env(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let message = state.venvs().delete(&name).await?;
    Ok(Json(json!({ "message": message })))
}

/// `{python module: gcc module}`, newest first as `toolchains` lists them.
async fn python_versions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let toolchains = state.venvs().toolchains().await?;
    Ok(Json(json!(toolchains)))
}
