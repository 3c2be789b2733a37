use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use services::services::cluster::CommandTrace;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod chat;
pub mod cluster;
pub mod groups;
pub mod layouts;
pub mod requests;
pub mod venvs;

/// Every route is served both at the root and under `/api`.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health))
        .merge(cluster::router())
        .merge(groups::router())
        .merge(layouts::router())
        .merge(venvs::router())
        .merge(requests::router())
        .merge(chat::router());

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cluster": state.config().cluster_name,
        "tools": state.cluster().tool_status(),
    }))
}

/// Attach the executed commands and their raw output when debug output is
/// enabled. Only object bodies can carry them.
pub(crate) fn with_debug(state: &AppState, mut body: Value, traces: Vec<CommandTrace>) -> Json<Value> {
    if state.config().debug_output {
        if let Value::Object(map) = &mut body {
            map.insert("debug".into(), json!(traces));
        }
    }
    Json(body)
}
