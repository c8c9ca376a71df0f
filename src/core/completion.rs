/// Text-generation collaborator — the narrow seam the orchestrator calls.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::{Credentials, EssayConfig};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API credential configured (set OPENAI_API_KEY)")]
    MissingCredential,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// One generation call: a fixed role instruction plus the task.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub task: &'a str,
    pub model: &'a str,
    pub temperature: f32,
}

/// Generated text plus whatever usage accounting the service reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<serde_json::Value>,
}

/// Anything that can turn a prompt into text. An empty `text` is a valid
/// (if degenerate) result.
pub trait TextCompletion {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError>;
}

impl<T: TextCompletion + ?Sized> TextCompletion for &T {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        (**self).complete(request)
    }
}

impl<T: TextCompletion + ?Sized> TextCompletion for Box<T> {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        (**self).complete(request)
    }
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: [InputMessage<'a>; 2],
    temperature: f32,
}

#[derive(Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Blocking client for an OpenAI-style `/responses` endpoint.
#[derive(Debug, Clone)]
pub struct ResponsesClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    credentials: Credentials,
}

impl ResponsesClient {
    pub fn new(config: &EssayConfig, credentials: Credentials) -> Result<Self, CompletionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/responses", config.api_base.trim_end_matches('/')),
            credentials,
        })
    }
}

impl TextCompletion for ResponsesClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        let key = self
            .credentials
            .api_key()
            .ok_or(CompletionError::MissingCredential)?;

        let payload = ResponsesRequest {
            model: request.model,
            input: [
                InputMessage {
                    role: "system",
                    content: request.system,
                },
                InputMessage {
                    role: "user",
                    content: request.task,
                },
            ],
            temperature: request.temperature,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&payload)
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_response(&body)
    }
}

/// Concatenate every `output_text` part of every message in a
/// `/responses` body, trimmed.
pub(crate) fn parse_response(body: &str) -> Result<Completion, CompletionError> {
    let parsed: ResponsesBody =
        serde_json::from_str(body).map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    let text: String = parsed
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text.as_deref())
        .collect();

    Ok(Completion {
        text: text.trim().to_string(),
        usage: parsed.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_output_text() {
        let body = r#"{
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "  The war began in 1861. "},
                    {"type": "output_text", "text": "It ended in 1865.\n"}
                ]}
            ],
            "usage": {"input_tokens": 52, "output_tokens": 12}
        }"#;
        let completion = parse_response(body).unwrap();
        assert_eq!(completion.text, "The war began in 1861. It ended in 1865.");
        assert_eq!(completion.usage.unwrap()["output_tokens"], 12);
    }

    #[test]
    fn parse_response_tolerates_empty_output() {
        let completion = parse_response(r#"{"output": []}"#).unwrap();
        assert_eq!(completion.text, "");
        assert!(completion.usage.is_none());
    }

    #[test]
    fn parse_response_rejects_garbage() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_credential_fails_before_network() {
        let client = ResponsesClient::new(&EssayConfig::default(), Credentials::default()).unwrap();
        let err = client
            .complete(&CompletionRequest {
                system: "s",
                task: "t",
                model: "m",
                temperature: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, CompletionError::MissingCredential));
    }
}
