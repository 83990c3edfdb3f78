//! HttpCompletionEngine - REST implementation of the completion boundary.
//!
//! Streams newline-delimited JSON events from the completion endpoint.
//! Configuration priority: ~/.config/aside/secret.json > environment variables

use crate::config::load_secret_config;
use crate::{CompletionEngine, CompletionRequest, EngineError, EngineEventStream};
use aside_core::conversation::TurnEvent;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_ENDPOINT: &str = "https://engine.aside.dev/v1";
const ENGINE_NAME: &str = "completion-v1";

/// Buffered events per in-flight stream before backpressure applies.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Completion engine implementation that talks to the Aside HTTP API.
#[derive(Clone)]
pub struct HttpCompletionEngine {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionEngine {
    /// Creates a new engine with the provided API key and default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Loads configuration from ~/.config/aside/secret.json or environment
    /// variables.
    ///
    /// Priority:
    /// 1. ~/.config/aside/secret.json
    /// 2. Environment variables (ASIDE_API_KEY, ASIDE_ENGINE_ENDPOINT)
    pub fn try_from_env() -> Result<Self, EngineError> {
        if let Ok(secret_config) = load_secret_config() {
            if let Some(engine_secret) = secret_config.engine {
                let mut engine = Self::new(engine_secret.api_key);
                if let Some(endpoint) = engine_secret.endpoint {
                    engine = engine.with_endpoint(endpoint);
                }
                return Ok(engine);
            }
        }

        let api_key = env::var("ASIDE_API_KEY").map_err(|_| {
            EngineError::InvalidRequest(
                "ASIDE_API_KEY not found in ~/.config/aside/secret.json or environment variables"
                    .into(),
            )
        })?;

        let mut engine = Self::new(api_key);
        if let Ok(endpoint) = env::var("ASIDE_ENGINE_ENDPOINT") {
            engine = engine.with_endpoint(endpoint);
        }
        Ok(engine)
    }

    /// Overrides the endpoint after construction.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl CompletionEngine for HttpCompletionEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn submit(&self, request: CompletionRequest) -> Result<EngineEventStream, EngineError> {
        let url = format!("{}/completions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read engine error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(map_transport_error(err))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].to_string();
                    buffer.drain(..=newline);
                    match parse_event_line(&line) {
                        Some(Ok(event)) => {
                            if tx.send(Ok(event)).await.is_err() {
                                // Receiver dropped: submission superseded.
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        None => {}
                    }
                }
            }

            if let Some(Ok(event)) = parse_event_line(&buffer) {
                let _ = tx.send(Ok(event)).await;
            }
            // Dropping the sender closes the stream, signalling completion.
        });

        Ok(rx)
    }

    async fn generate_questions(&self, page_content: &str) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/suggestions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&SuggestionsRequest { page_content })
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read engine error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: SuggestionsResponse = response
            .json()
            .await
            .map_err(|err| EngineError::Other(format!("Failed to parse suggestions: {err}")))?;

        Ok(parsed.questions)
    }
}

#[derive(serde::Serialize)]
struct SuggestionsRequest<'a> {
    page_content: &'a str,
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    questions: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    r#type: String,
    message: String,
}

/// Parses one line of the event stream.
///
/// Lines may carry an optional `data: ` prefix; blank lines and the
/// terminal `[DONE]` marker yield `None`.
fn parse_event_line(line: &str) -> Option<Result<TurnEvent, EngineError>> {
    let payload = line.trim();
    let payload = payload.strip_prefix("data:").map(str::trim).unwrap_or(payload);
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<TurnEvent>(payload)
            .map_err(|err| EngineError::Other(format!("Malformed engine event: {err}"))),
    )
}

fn map_transport_error(err: reqwest::Error) -> EngineError {
    EngineError::Connection {
        message: err.to_string(),
    }
}

fn map_http_error(status: StatusCode, body: String, retry_after: Option<Duration>) -> EngineError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.clone());

    match status {
        StatusCode::TOO_MANY_REQUESTS => EngineError::RateLimited { retry_after },
        StatusCode::PAYLOAD_TOO_LARGE => EngineError::ContextLimit,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            EngineError::InvalidRequest(message)
        }
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => EngineError::Connection { message },
        _ => EngineError::Other(message),
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Retry-After HTTP-date parsing is omitted for simplicity
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_line_plain_json() {
        let line = r#"{"type":"completion","text":"Hi"}"#;
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(
            event,
            TurnEvent::Completion {
                text: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_parse_event_line_data_prefix() {
        let line = r#"data: {"type":"search_in_progress","in_progress":true}"#;
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(event, TurnEvent::SearchInProgress { in_progress: true });
    }

    #[test]
    fn test_parse_event_line_skips_blank_and_done() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_event_line_malformed_is_error() {
        let result = parse_event_line("{not json").unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_map_http_error_rate_limit() {
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            String::new(),
            Some(Duration::from_secs(30)),
        );
        match err {
            EngineError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_map_http_error_context_limit() {
        let err = map_http_error(StatusCode::PAYLOAD_TOO_LARGE, String::new(), None);
        assert!(matches!(err, EngineError::ContextLimit));
    }

    #[test]
    fn test_map_http_error_extracts_message() {
        let body = r#"{"error":{"type":"invalid_request","message":"missing model"}}"#;
        let err = map_http_error(StatusCode::BAD_REQUEST, body.to_string(), None);
        match err {
            EngineError::InvalidRequest(message) => assert_eq!(message, "missing model"),
            other => panic!("Expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let header = HeaderValue::from_static("15");
        assert_eq!(
            parse_retry_after(Some(&header)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(parse_retry_after(None), None);
    }
}
