use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use services::services::requests::RequestKind;

use crate::{AppState, error::ApiError, extract::FormFields};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quota", post(quota))
        .route("/software", post(software))
        .route("/group", post(group))
        .route("/help", post(help))
        .route("/guidedhelp", post(guided_help))
        .route("/account", post(account))
        .route("/submit_acknowledgement", post(acknowledgement))
}

async fn submit(state: &AppState, kind: RequestKind, form: FormFields) -> Result<Json<Value>, ApiError> {
    let message = state.requests().submit(kind, form.0).await?;
    tracing::info!(request = kind.label(), "support request submitted");
    Ok(Json(json!({ "message": message })))
}

async fn quota(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Quota, form).await
}

async fn software(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Software, form).await
}

async fn group(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Group, form).await
}

async fn help(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Help, form).await
}

async fn guided_help(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::GuidedHelp, form).await
}

async fn account(State(state): State<AppState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Account, form).await
}

async fn acknowledgement(
    State(state): State<AppState>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    submit(&state, RequestKind::Acknowledgement, form).await
}
