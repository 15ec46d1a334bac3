// Run orchestration
//
// probe -> (prefill calibration) -> patterns -> RunOutcome
//
// Only the probe can fail the run. Once patterns start, every problem is
// recorded per request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use uuid::Uuid;

use crate::driver::{Driver, RunOutcome};
use crate::error::Result;
use crate::executor::{estimate_prefill, Executor, ExecutorConfig, HttpExecutor};
use crate::plan::RunPlan;
use crate::probe::{endpoint_url, probe_endpoint};
use crate::protocol::COMPLETIONS_PATH;
use crate::record::RequestSpec;

/// Timeout of the pre-flight probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub stream: bool,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Stop dispatching after this long; in-flight requests still finish
    pub run_timeout: Option<Duration>,
}

/// Probe the endpoint, then run every pattern of the plan in order
pub async fn execute_run(config: &RunConfig, plan: &RunPlan) -> Result<RunOutcome> {
    plan.validate()?;

    let base_url = probe_endpoint(&config.base_url, &config.api_key, PROBE_TIMEOUT).await?;
    let target = endpoint_url(&base_url, COMPLETIONS_PATH)?;
    tracing::info!(
        endpoint = %target,
        model = %config.model,
        stream = config.stream,
        requests = plan.declared_requests(),
        "Endpoint reachable, starting run"
    );

    let executor: Arc<dyn Executor> = Arc::new(HttpExecutor::new(ExecutorConfig {
        model: config.model.clone(),
        stream: config.stream,
        timeout: config.request_timeout,
    })?);
    let template = RequestSpec::new(
        config.prompt.clone(),
        config.max_output_tokens,
        target.clone(),
        config.api_key.clone(),
    );

    let started_at = Utc::now();
    let prefill_estimate = if config.stream {
        None
    } else {
        Some(estimate_prefill(executor.as_ref(), &template).await)
    };

    let mut driver = Driver::new(executor, template);
    if let Some(timeout) = config.run_timeout {
        driver = driver.with_run_timeout(timeout);
    }
    let patterns = driver.run(&plan.patterns).await;

    Ok(RunOutcome {
        run_id: Uuid::now_v7(),
        started_at,
        model: config.model.clone(),
        endpoint: target.to_string(),
        streaming: config.stream,
        prefill_estimate,
        patterns,
    })
}
