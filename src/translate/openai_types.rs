//! Type definitions for the OpenAI-compatible surface of the proxy.
//!
//! These types represent the inbound request format (what clients send us)
//! and the response formats we emit, both aggregated and streamed.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what clients send TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    // Accepted for compatibility; the upstream service has no use for them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    // Catch-all for unknown fields
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Response types (what we send BACK)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u64,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

/// The upstream service reports no token counts, so usage is always zeroed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl ChatCompletionResponse {
    /// Build a complete aggregated response around `content`.
    pub fn aggregated(model: &str, content: String) -> Self {
        Self {
            id: fresh_id(),
            object: "chat.completion".to_string(),
            created: now_epoch(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: ChatUsage::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u64,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// A mid-stream chunk carrying one content delta.
    pub fn delta(model: &str, content: &str) -> Self {
        Self::build(model, Some(content.to_string()), None)
    }

    /// The terminal chunk: empty delta, `finish_reason = "stop"`.
    pub fn stop(model: &str) -> Self {
        Self::build(model, None, Some("stop".to_string()))
    }

    fn build(model: &str, content: Option<String>, finish_reason: Option<String>) -> Self {
        Self {
            id: fresh_id(),
            object: "chat.completion.chunk".to_string(),
            created: now_epoch(),
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta { content },
                finish_reason,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.into(),
            },
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request_error", message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new("authentication_error", message)
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new("api_error", message)
    }
}

fn fresh_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_response_shape() {
        let resp = ChatCompletionResponse::aggregated("gemini-2.5-flash", "Hello".into());
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["model"], "gemini-2.5-flash");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["message"]["content"], "Hello");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["usage"]["prompt_tokens"], 0);
        assert_eq!(json["usage"]["completion_tokens"], 0);
        assert_eq!(json["usage"]["total_tokens"], 0);
        assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert!(json["created"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_delta_chunk_shape() {
        let chunk = ChatCompletionChunk::delta("m", "Hel");
        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(json["choices"][0]["finish_reason"], serde_json::Value::Null);
    }

    #[test]
    fn test_stop_chunk_has_empty_delta() {
        let chunk = ChatCompletionChunk::stop("m");
        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(json["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_request_tolerates_unknown_fields() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"gpt-4o-mini","messages":[{"role":"user","content":"hi"}],"top_p":0.9,"n":1}"#,
        )
        .unwrap();
        assert_eq!(req.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(req.messages.len(), 1);
        assert!(req.extra.contains_key("top_p"));
    }
}
