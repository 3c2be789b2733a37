use axum::{
    Json,
    extract::{
        multipart::MultipartError,
        rejection::{FormRejection, JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use services::services::{
    chatbot::ChatError, cluster::ClusterError, layouts::LayoutError, requests::RequestError,
    venv::VenvError,
};
use thiserror::Error;
use utils::validate::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Venv(#[from] VenvError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("{0}")]
    BadRequest(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Cluster(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

fn cluster_status(err: &ClusterError) -> (StatusCode, String) {
    match err {
        ClusterError::InvalidArgument(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        ClusterError::Process(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.user_message()),
        ClusterError::UnexpectedFormat(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unexpected output format".to_string(),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut extra: Option<(&str, Value)> = None;
        let (status, message) = match &self {
            ApiError::Cluster(err) => cluster_status(err),
            ApiError::Layout(err) => match err {
                LayoutError::InvalidName(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                LayoutError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                LayoutError::AlreadyExists(_) => (StatusCode::CONFLICT, err.to_string()),
                LayoutError::Corrupt { .. } | LayoutError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Venv(err) => match err {
                VenvError::NoMetadata => {
                    extra = Some(("code", Value::from("NO_METADATA")));
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                VenvError::UnknownToolchain { .. } | VenvError::MissingParameters(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                VenvError::Cluster(err) => cluster_status(err),
                VenvError::Corrupt(_) | VenvError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Request(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Chat(err) => match err {
                ChatError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
                ChatError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            },
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        let mut body = json!({ "error": message });
        if let Some((key, value)) = extra {
            body[key] = value;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use utils::process::ProcessError;

    use super::*;

    async fn body_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn timeouts_are_server_errors() {
        let err = ApiError::from(ClusterError::from(ProcessError::Timeout {
            command: "squeue".into(),
            timeout: Duration::from_secs(1),
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn missing_metadata_carries_a_code() {
        let response = ApiError::from(VenvError::NoMetadata).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await["code"], "NO_METADATA");
    }

    #[test]
    fn layout_conflicts_map_to_409() {
        let response = ApiError::from(LayoutError::AlreadyExists("a".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
