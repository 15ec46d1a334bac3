// Completion Protocol Types
//
// Request/response shapes of the OpenAI-compatible `/v1/completions` API.
// Response types are lenient: usage fields that are missing or of the
// wrong type deserialize to zero rather than failing the whole payload.

use serde::{Deserialize, Deserializer, Serialize};

/// Path of the completion endpoint relative to the base URL
pub const COMPLETIONS_PATH: &str = "/v1/completions";

/// Path of the model listing endpoint used by the connectivity probe
pub const MODELS_PATH: &str = "/v1/models";

/// Completion request body
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

/// Asks the server to append a usage object to the final stream chunk
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Completion response (non-streaming) and stream chunk (streaming).
///
/// `choices` is required; a body without it is treated as malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    #[serde(default, deserialize_with = "lenient_usage")]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl CompletionResponse {
    /// Whether this chunk carries generated text
    pub fn has_text(&self) -> bool {
        self.choices
            .iter()
            .any(|c| c.text.as_deref().is_some_and(|t| !t.is_empty()))
    }

    /// Whether the server sent a usage object with any non-zero count
    pub fn has_usage(&self) -> bool {
        self.usage != Usage::default()
    }
}

/// Marker the server sends as the last SSE data payload
pub const STREAM_DONE: &str = "[DONE]";

fn lenient_usage<'de, D>(deserializer: D) -> Result<Usage, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(usage_from_value).unwrap_or_default())
}

fn usage_from_value(value: &serde_json::Value) -> Usage {
    let count = |field: &str| value.get(field).and_then(|v| v.as_u64()).unwrap_or(0);
    Usage {
        prompt_tokens: count("prompt_tokens"),
        completion_tokens: count("completion_tokens"),
    }
}
