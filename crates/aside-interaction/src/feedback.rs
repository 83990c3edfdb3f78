//! Feedback side-channel for assistant responses.
//!
//! Ratings and free-form feedback are annotations correlated by an opaque
//! rating identifier; they never touch the conversation state machine.

use crate::EngineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// A thumbs-up/down rating of one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingPayload {
    /// Id of the rated turn.
    pub turn_id: String,
    /// Whether the response was liked.
    pub is_liked: bool,
    /// Text of the rated turn, for context on the receiving side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_text: Option<String>,
}

/// Free-form feedback, optionally correlated with an earlier rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackPayload {
    /// Feedback category label.
    pub category: String,
    /// Free-form feedback text.
    pub feedback: String,
    /// Rating identifier returned by an earlier `rate_message` call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_id: Option<String>,
}

/// Side-channel client for response ratings and feedback.
#[async_trait]
pub trait FeedbackClient: Send + Sync {
    /// Records a rating.
    ///
    /// Returns an opaque rating identifier for later correlation.
    async fn rate_message(&self, payload: RatingPayload) -> Result<String, EngineError>;

    /// Sends free-form feedback.
    async fn send_feedback(&self, payload: FeedbackPayload) -> Result<(), EngineError>;
}

/// HTTP implementation of [`FeedbackClient`].
#[derive(Clone)]
pub struct HttpFeedbackClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpFeedbackClient {
    /// Creates a new client against the given feedback endpoint.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct RatingResponse {
    id: String,
}

#[async_trait]
impl FeedbackClient for HttpFeedbackClient {
    async fn rate_message(&self, payload: RatingPayload) -> Result<String, EngineError> {
        let url = format!("{}/feedback/rating", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| EngineError::Connection {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Other(format!(
                "Feedback endpoint returned {}",
                response.status()
            )));
        }

        let parsed: RatingResponse = response
            .json()
            .await
            .map_err(|err| EngineError::Other(format!("Failed to parse rating response: {err}")))?;

        Ok(parsed.id)
    }

    async fn send_feedback(&self, payload: FeedbackPayload) -> Result<(), EngineError> {
        let url = format!("{}/feedback", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| EngineError::Connection {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Other(format!(
                "Feedback endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_payload_serialization() {
        let payload = RatingPayload {
            turn_id: "turn-1".to_string(),
            is_liked: true,
            turn_text: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"is_liked\":true"));
        assert!(!json.contains("turn_text"));
    }
}
