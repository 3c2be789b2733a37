use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde_json::{Value, json};

use super::with_debug;
use crate::{AppState, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", get(user_groups))
        .route("/groups/{group}/directory", get(group_directory))
}

async fn user_groups(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let fetched = state.cluster().user_groups(&state.config().user).await?;
    Ok(with_debug(&state, json!({ "groups": fetched.data }), fetched.traces))
}

async fn group_directory(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let fetched = state
        .cluster()
        .group_directory(&group, &state.config().group_root)
        .await?;
    Ok(with_debug(&state, json!(fetched.data), fetched.traces))
}
