//! Client for the hosted conversational search API behind the chat widget.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode, Url};
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://login.pryon.net/oauth/token";
pub const DEFAULT_API_URL: &str = "https://api.pryon.net/";

const AUDIENCE: &str = "https://pryon/api";
const EXCHANGE_PATH: &str = "api/conversation/v1/exchange-events/sse";
const RATING_PATH: &str = "api/conversation/v1/generative-ratings";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat is not configured on this server")]
    NotConfigured,
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("chat stream failed: {0}")]
    Stream(String),
    #[error("unexpected response from chat service: {0}")]
    InvalidResponse(String),
    #[error("chat service answered with status {0}")]
    Upstream(StatusCode),
}

#[derive(Debug)]
pub struct ChatConfig {
    pub username: String,
    pub password: SecretString,
    pub collection_id: String,
    pub login_url: Url,
    pub api_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub exchange_id: String,
    pub response_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    rating: u8,
    exchange_id: String,
    comments: String,
}

impl Feedback {
    pub fn new(rating: i64, exchange_id: &str, comments: Option<&str>) -> Result<Self, ChatError> {
        let rating = u8::try_from(rating)
            .ok()
            .filter(|rating| (1..=5).contains(rating))
            .ok_or_else(|| ChatError::InvalidRequest("Rating must be between 1 and 5".into()))?;
        if exchange_id.trim().is_empty() {
            return Err(ChatError::InvalidRequest("Exchange ID is required".into()));
        }
        Ok(Self {
            rating,
            exchange_id: exchange_id.to_string(),
            comments: comments.unwrap_or_default().to_string(),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Folds the exchange event stream into one reply.
#[derive(Debug, Default)]
pub struct ExchangeAccumulator {
    text: String,
    sources: Vec<String>,
    exchange_id: Option<String>,
    conversation_id: Option<String>,
    events: usize,
}

impl ExchangeAccumulator {
    pub fn apply(&mut self, event: &Value) {
        self.events += 1;
        let generative = |key: &str| {
            event
                .pointer(&format!("/generative_exchange_conversation_data/data/{key}"))
                .and_then(Value::as_str)
        };
        match event.get("state").and_then(Value::as_str) {
            Some("EXCHANGE_RESPONSE_COMPLETE") => {
                let data = event.get("exchange_response_data");
                let outputs = data
                    .and_then(|data| data.get("output"))
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for (index, output) in outputs.iter().enumerate() {
                    let Some(source) = source_of(output) else {
                        continue;
                    };
                    // vendor-hosted documents are not useful to users
                    if source.contains("pryon") {
                        continue;
                    }
                    self.sources.push(format!("[{}]: {source}", index + 1));
                }
                if let Some(id) = data
                    .and_then(|data| data.get("conversation_id"))
                    .and_then(Value::as_str)
                {
                    self.conversation_id = Some(id.to_string());
                }
            }
            Some("GENERATIVE_EXCHANGE_RESPONSE_DELTA") => {
                if let Some(text) = generative("text") {
                    self.text.push_str(text);
                }
            }
            Some("GENERATIVE_EXCHANGE_RESPONSE_COMPLETE") => {
                if let Some(id) = generative("generative_exchange_id") {
                    self.exchange_id = Some(id.to_string());
                }
            }
            _ => {}
        }
    }

    pub fn finish(self) -> Result<ChatReply, ChatError> {
        if self.events == 0 {
            return Err(ChatError::InvalidResponse("stream ended without events".into()));
        }
        let mut sources = self.sources.join("\n");
        if !sources.is_empty() {
            sources.push('\n');
        }
        Ok(ChatReply {
            exchange_id: self.exchange_id.unwrap_or_default(),
            response_message: format!("{}\n\n{sources}", self.text),
            conversation_id: self.conversation_id,
        })
    }
}

fn source_of(output: &Value) -> Option<&str> {
    let attachments = output.get("attachments")?;
    attachments
        .get("content_origin_source_location")
        .filter(|location| !location.is_null())
        .or_else(|| attachments.get("content_source_location"))?
        .get("content")?
        .as_str()
}

#[derive(Debug)]
pub struct ChatClient {
    client: Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        self.config
            .api_url
            .join(path)
            .map_err(|err| ChatError::InvalidResponse(format!("invalid API url: {err}")))
    }

    async fn login(&self) -> Result<String, ChatError> {
        let response = self
            .client
            .post(self.config.login_url.clone())
            .timeout(Duration::from_secs(30))
            .json(&json!({
                "client_id": self.config.username,
                "client_secret": self.config.password.expose_secret(),
                "audience": AUDIENCE,
                "grant_type": "client_credentials",
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChatError::Upstream(response.status()));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Ask a question, optionally continuing an earlier conversation.
    pub async fn send_query(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::InvalidRequest("No message provided".into()));
        }
        let token = self.login().await?;

        let mut body = json!({
            "input": {
                "option": {"collection_id": self.config.collection_id},
                "raw_text": message,
            }
        });
        if let Some(id) = conversation_id {
            body["conversation_id"] = Value::from(id);
        }

        let request = self
            .client
            .post(self.endpoint(EXCHANGE_PATH)?)
            .bearer_auth(token)
            .json(&body);
        let mut events =
            EventSource::new(request).map_err(|err| ChatError::Stream(err.to_string()))?;

        let mut accumulator = ExchangeAccumulator::default();
        let outcome = loop {
            match events.next().await {
                None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => break Ok(()),
                Some(Ok(Event::Open)) => {}
                Some(Ok(Event::Message(message))) => {
                    match serde_json::from_str::<Value>(message.data.trim()) {
                        Ok(event) => accumulator.apply(&event),
                        Err(err) => {
                            tracing::warn!(error = %err, "skipping undecodable chat event");
                        }
                    }
                }
                Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, _))) => {
                    break Err(ChatError::Upstream(status));
                }
                Some(Err(err)) => break Err(ChatError::Stream(err.to_string())),
            }
        };
        events.close();
        outcome?;
        accumulator.finish()
    }

    pub async fn send_feedback(&self, feedback: &Feedback) -> Result<(), ChatError> {
        let token = self.login().await?;
        let response = self
            .client
            .post(self.endpoint(RATING_PATH)?)
            .timeout(Duration::from_secs(30))
            .bearer_auth(token)
            .json(&json!({
                "data": {
                    "generative_exchange_id": feedback.exchange_id,
                    "rank": feedback.rating,
                    "message": feedback.comments,
                }
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChatError::Upstream(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<Value> {
        vec![
            json!({
                "state": "EXCHANGE_RESPONSE_COMPLETE",
                "exchange_response_data": {
                    "conversation_id": "conv-1",
                    "output": [
                        {"attachments": {"content_origin_source_location": {"content": "https://hprc.example/wiki/Quota"}}},
                        {"attachments": {"content_source_location": {"content": "https://files.pryon.net/doc.pdf"}}},
                        {"attachments": {"content_origin_source_location": null, "content_source_location": {"content": "https://hprc.example/wiki/Slurm"}}},
                        {}
                    ]
                }
            }),
            json!({"state": "GENERATIVE_EXCHANGE_RESPONSE_DELTA", "generative_exchange_conversation_data": {"data": {"text": "Use "}}}),
            json!({"state": "GENERATIVE_EXCHANGE_RESPONSE_DELTA", "generative_exchange_conversation_data": {"data": {"text": "showquota."}}}),
            json!({"state": "GENERATIVE_EXCHANGE_RESPONSE_COMPLETE", "generative_exchange_conversation_data": {"data": {"generative_exchange_id": "ex-9"}}}),
        ]
    }

    #[test]
    fn events_fold_into_text_with_numbered_sources() {
        let mut accumulator = ExchangeAccumulator::default();
        for event in events() {
            accumulator.apply(&event);
        }
        let reply = accumulator.finish().unwrap();
        assert_eq!(reply.exchange_id, "ex-9");
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(
            reply.response_message,
            "Use showquota.\n\n[1]: https://hprc.example/wiki/Quota\n[3]: https://hprc.example/wiki/Slurm\n"
        );
    }

    #[test]
    fn unknown_states_are_ignored() {
        let mut accumulator = ExchangeAccumulator::default();
        accumulator.apply(&json!({"state": "HEARTBEAT"}));
        let reply = accumulator.finish().unwrap();
        assert_eq!(reply.response_message, "\n\n");
        assert_eq!(reply.exchange_id, "");
    }

    #[test]
    fn empty_stream_is_an_invalid_response() {
        assert!(matches!(
            ExchangeAccumulator::default().finish(),
            Err(ChatError::InvalidResponse(_))
        ));
    }

    #[test]
    fn feedback_rating_is_bounded() {
        assert!(Feedback::new(5, "ex-9", None).is_ok());
        assert!(matches!(Feedback::new(0, "ex-9", None), Err(ChatError::InvalidRequest(_))));
        assert!(Feedback::new(6, "ex-9", Some("great")).is_err());
        assert!(Feedback::new(-1, "ex-9", None).is_err());
        assert!(Feedback::new(3, " ", None).is_err());
    }
}
