// Request and record types
//
// RequestSpec describes one completion request; RequestRecord is the
// immutable result of issuing it. Exactly one record exists per issued spec.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// One completion request. Immutable once constructed.
#[derive(Clone)]
pub struct RequestSpec {
    prompt: String,
    max_output_tokens: u32,
    target: Url,
    credential: String,
}

impl RequestSpec {
    pub fn new(
        prompt: impl Into<String>,
        max_output_tokens: u32,
        target: Url,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens,
            target,
            credential: credential.into(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Same request with a different output budget (used for prefill calibration)
    pub fn with_max_output_tokens(&self, max_output_tokens: u32) -> Self {
        Self {
            max_output_tokens,
            ..self.clone()
        }
    }
}

// The credential never shows up in logs.
impl std::fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSpec")
            .field("prompt_len", &self.prompt.len())
            .field("max_output_tokens", &self.max_output_tokens)
            .field("target", &self.target.as_str())
            .finish_non_exhaustive()
    }
}

/// Why a request was recorded as failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FailureReason {
    /// Grouping key for the failure breakdown
    pub fn key(&self) -> String {
        match self {
            FailureReason::Transport(_) => "transport".to_string(),
            FailureReason::Timeout => "timeout".to_string(),
            FailureReason::Status { status, .. } => format!("status:{}", status),
            FailureReason::Malformed(_) => "malformed".to_string(),
        }
    }
}

/// Request outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(FailureReason),
}

/// Timing and token usage of one issued request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub outcome: Outcome,
    /// Wall clock from just before the network call to the last body byte
    /// (or to failure detection)
    pub total_latency: Duration,
    /// Time to the first generated token; `None` for non-streaming requests
    pub time_to_first_byte: Option<Duration>,
    /// Intervals between consecutive generated tokens after the first
    pub inter_token_times: Vec<Duration>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl RequestRecord {
    pub fn success(
        total_latency: Duration,
        time_to_first_byte: Option<Duration>,
        inter_token_times: Vec<Duration>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Self {
        Self {
            outcome: Outcome::Success,
            total_latency,
            time_to_first_byte,
            inter_token_times,
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn failed(reason: FailureReason, total_latency: Duration) -> Self {
        Self {
            outcome: Outcome::Failed(reason),
            total_latency,
            time_to_first_byte: None,
            inter_token_times: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed(reason) => Some(reason),
        }
    }

    /// Measured time per output token: `(total - ttft) / completion_tokens`.
    ///
    /// Only defined for successful streaming records with at least one token.
    pub fn time_per_output_token(&self) -> Option<Duration> {
        let ttft = self.time_to_first_byte?;
        self.per_token(ttft)
    }

    /// Estimated time per output token for non-streaming records:
    /// `(total - prefill_estimate) / completion_tokens`.
    ///
    /// Returns `None` for streaming records, which have a measured value.
    pub fn estimated_time_per_output_token(&self, prefill_estimate: Duration) -> Option<Duration> {
        if self.time_to_first_byte.is_some() {
            return None;
        }
        self.per_token(prefill_estimate)
    }

    fn per_token(&self, prefill: Duration) -> Option<Duration> {
        if !self.is_success() || self.completion_tokens == 0 {
            return None;
        }
        let decode = self.total_latency.saturating_sub(prefill);
        let nanos = decode.as_nanos() / u128::from(self.completion_tokens);
        Some(Duration::from_nanos(nanos as u64))
    }
}
