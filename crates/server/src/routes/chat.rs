use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::chatbot::{ChatError, Feedback};

use crate::{AppState, error::ApiError, extract::ApiJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/feedback", post(feedback))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    conversation_id: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let client = state.chat().ok_or(ChatError::NotConfigured)?;
    let reply = client
        .send_query(&request.message, request.conversation_id.as_deref())
        .await?;
    Ok(Json(json!(reply)))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    rating: Option<i64>,
    #[serde(default)]
    exchange_id: String,
    comments: Option<String>,
}

async fn feedback(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<FeedbackRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let client = state.chat().ok_or(ChatError::NotConfigured)?;
    let feedback = Feedback::new(
        request.rating.unwrap_or_default(),
        &request.exchange_id,
        request.comments.as_deref(),
    )?;
    client.send_feedback(&feedback).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Feedback submitted successfully" })),
    ))
}
