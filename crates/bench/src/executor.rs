// Timed Request Executor
//
// Issues one completion request and turns whatever happens into exactly one
// RequestRecord. Nothing here returns an error to the caller: transport
// failures, timeouts, non-2xx statuses and unparseable bodies all become
// `Outcome::Failed`.
//
// Streaming responses are consumed as SSE (the same eventsource decoding the
// chat providers use); the first text-bearing event marks time-to-first-token
// and every following one contributes an inter-token interval.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};

use crate::error::Result;
use crate::protocol::{CompletionRequest, CompletionResponse, StreamOptions, Usage, STREAM_DONE};
use crate::record::{FailureReason, RequestRecord, RequestSpec};
use crate::sink::RecordSink;

/// Longest error body kept in a failure reason
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Executes a single request and measures it
#[async_trait]
pub trait Executor: Send + Sync {
    /// Issue the request. Never fails; failures are part of the record.
    async fn execute(&self, spec: &RequestSpec) -> RequestRecord;

    /// Issue the request and append its record to `sink`
    async fn execute_into(&self, spec: &RequestSpec, sink: &RecordSink) {
        let record = self.execute(spec).await;
        sink.push(record);
    }
}

/// Settings shared by every request of a run
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Model identifier sent in the request body
    pub model: String,
    /// Request a streamed (SSE) response
    pub stream: bool,
    /// Per-request timeout, covering the whole body
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            stream: true,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Executor backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    config: ExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&user_agent) {
            headers.insert(USER_AGENT, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    async fn read_body(&self, response: Response, start: Instant) -> RequestRecord {
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return RequestRecord::failed(classify(&e), start.elapsed()),
        };
        let total_latency = start.elapsed();

        match serde_json::from_slice::<CompletionResponse>(&bytes) {
            Ok(body) => RequestRecord::success(
                total_latency,
                None,
                Vec::new(),
                body.usage.prompt_tokens,
                body.usage.completion_tokens,
            ),
            Err(e) => RequestRecord::failed(FailureReason::Malformed(e.to_string()), total_latency),
        }
    }

    async fn read_stream(&self, response: Response, start: Instant) -> RequestRecord {
        let mut events = response.bytes_stream().eventsource();
        let mut time_to_first_byte = None;
        let mut last_token_at: Option<Instant> = None;
        let mut inter_token_times = Vec::new();
        let mut usage = Usage::default();
        let mut chunks = 0usize;

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(EventStreamError::Transport(e)) => {
                    return RequestRecord::failed(classify(&e), start.elapsed())
                }
                Err(e) => {
                    return RequestRecord::failed(
                        FailureReason::Malformed(format!("Stream error: {}", e)),
                        start.elapsed(),
                    )
                }
            };

            // Keep draining after [DONE] so the timer stops at the last byte
            if event.data == STREAM_DONE {
                continue;
            }

            let chunk = match serde_json::from_str::<CompletionResponse>(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    return RequestRecord::failed(
                        FailureReason::Malformed(format!("Failed to parse chunk: {}", e)),
                        start.elapsed(),
                    )
                }
            };

            chunks += 1;
            if chunk.has_usage() {
                usage = chunk.usage;
            }

            if chunk.has_text() {
                let now = Instant::now();
                match last_token_at {
                    None => time_to_first_byte = Some(now.duration_since(start)),
                    Some(previous) => inter_token_times.push(now.duration_since(previous)),
                }
                last_token_at = Some(now);
            }
        }

        let total_latency = start.elapsed();
        if chunks == 0 {
            return RequestRecord::failed(
                FailureReason::Malformed("stream carried no completion chunks".to_string()),
                total_latency,
            );
        }
        if usage == Usage::default() {
            tracing::debug!("Stream finished without usage; token counts recorded as zero");
        }

        RequestRecord::success(
            total_latency,
            time_to_first_byte,
            inter_token_times,
            usage.prompt_tokens,
            usage.completion_tokens,
        )
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, spec: &RequestSpec) -> RequestRecord {
        let body = CompletionRequest {
            model: &self.config.model,
            prompt: spec.prompt(),
            max_tokens: spec.max_output_tokens(),
            stream: self.config.stream,
            stream_options: self.config.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        };

        let mut request = self.client.post(spec.target().clone()).json(&body);
        if !spec.credential().is_empty() {
            request = request.bearer_auth(spec.credential());
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let record = RequestRecord::failed(classify(&e), start.elapsed());
                log_record(&record);
                return record;
            }
        };

        let status = response.status();
        let record = if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            RequestRecord::failed(
                FailureReason::Status {
                    status: status.as_u16(),
                    body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                },
                start.elapsed(),
            )
        } else if self.config.stream {
            self.read_stream(response, start).await
        } else {
            self.read_body(response, start).await
        };

        log_record(&record);
        record
    }
}

fn classify(error: &reqwest::Error) -> FailureReason {
    if error.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::Transport(error.to_string())
    }
}

fn log_record(record: &RequestRecord) {
    match record.failure() {
        None => tracing::debug!(
            latency_ms = record.total_latency.as_millis() as u64,
            ttft_ms = record.time_to_first_byte.map(|d| d.as_millis() as u64),
            completion_tokens = record.completion_tokens,
            "Request completed"
        ),
        Some(reason) => tracing::debug!(
            latency_ms = record.total_latency.as_millis() as u64,
            error = %reason,
            "Request failed"
        ),
    }
}

/// Best-effort prefill estimate for non-streaming runs.
///
/// Issues one request limited to a single output token; its latency is
/// dominated by prompt processing. A failed calibration yields zero.
pub async fn estimate_prefill(executor: &dyn Executor, template: &RequestSpec) -> Duration {
    let record = executor.execute(&template.with_max_output_tokens(1)).await;
    match record.failure() {
        None => {
            tracing::info!(
                prefill_ms = record.total_latency.as_millis() as u64,
                "Prefill calibration complete"
            );
            record.total_latency
        }
        Some(reason) => {
            tracing::warn!(error = %reason, "Prefill calibration failed, using zero estimate");
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    struct FixedExecutor(RequestRecord);

    #[async_trait]
    impl Executor for FixedExecutor {
        async fn execute(&self, _spec: &RequestSpec) -> RequestRecord {
            self.0.clone()
        }
    }

    fn spec() -> RequestSpec {
        RequestSpec::new(
            "prompt",
            32,
            Url::parse("http://localhost:1/v1/completions").unwrap(),
            "",
        )
    }

    #[tokio::test]
    async fn test_execute_into_appends_one_record() {
        let executor = FixedExecutor(RequestRecord::failed(
            FailureReason::Timeout,
            Duration::from_secs(1),
        ));
        let sink = RecordSink::new();

        executor.execute_into(&spec(), &sink).await;

        let records = sink.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure(), Some(&FailureReason::Timeout));
    }

    #[tokio::test]
    async fn test_estimate_prefill_uses_calibration_latency() {
        let ok = FixedExecutor(RequestRecord::success(
            Duration::from_millis(250),
            None,
            vec![],
            12,
            1,
        ));
        assert_eq!(
            estimate_prefill(&ok, &spec()).await,
            Duration::from_millis(250)
        );

        let failing = FixedExecutor(RequestRecord::failed(
            FailureReason::Transport("refused".into()),
            Duration::from_millis(3),
        ));
        assert_eq!(estimate_prefill(&failing, &spec()).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_recorded_as_failure() {
        let executor = HttpExecutor::new(ExecutorConfig {
            model: "m".to_string(),
            stream: false,
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let record = executor.execute(&spec()).await;
        assert!(!record.is_success());
        assert_eq!(record.completion_tokens, 0);
    }
}
