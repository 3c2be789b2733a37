//! Extractors that reject with [`ApiError`] so malformed input gets the
//! same `{"error": ...}` body as every other failure.

use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Multipart, Request, multipart::MultipartRejection},
    http::header::CONTENT_TYPE,
};
use serde_json::Value;
use services::services::requests::RequestForm;

use crate::error::ApiError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Flat form fields from a multipart, JSON or url-encoded body, in the
/// order the client sent them.
#[derive(Debug)]
pub struct FormFields(pub RequestForm);

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state).await?;
            let mut form = RequestForm::new();
            while let Some(field) = multipart.next_field().await? {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let value = field.text().await?;
                form.insert(name, Value::from(value));
            }
            return Ok(FormFields(form));
        }

        if content_type.starts_with("application/json") {
            let Json(value) = Json::<Value>::from_request(req, state).await?;
            return match value {
                Value::Object(form) => Ok(FormFields(form)),
                _ => Err(ApiError::BadRequest("expected a JSON object".into())),
            };
        }

        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state).await?;
        Ok(FormFields(
            pairs
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect(),
        ))
    }
}
