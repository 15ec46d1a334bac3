// End-to-end run tests: probe, calibration, patterns and report

use std::time::Duration;

use inferbench::report::{TPOT_EST_MS, TPOT_MS, TTFT_MS};
use inferbench::{
    execute_run, probe_endpoint, LoadPattern, NamedPattern, RunConfig, RunPlan, RunReport,
};
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"text\":\"a\"}]}\n\n",
    "data: {\"choices\":[{\"text\":\"b\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\n",
    "data: [DONE]\n\n",
);

fn config(server: &MockServer, stream: bool) -> RunConfig {
    RunConfig {
        base_url: Url::parse(&server.uri()).unwrap(),
        api_key: "secret".to_string(),
        model: "test-model".to_string(),
        prompt: "Hello".to_string(),
        max_output_tokens: 32,
        stream,
        request_timeout: Duration::from_secs(5),
        run_timeout: None,
    }
}

fn plan() -> RunPlan {
    RunPlan::new(vec![
        NamedPattern::new("burst", LoadPattern::burst(3)),
        NamedPattern::new("sweep", LoadPattern::sweep(vec![1, 2])),
    ])
}

async fn mount_models(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"data": []})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_probe_accepts_ok_and_unauthorized() {
    for status in [200, 401] {
        let server = MockServer::start().await;
        mount_models(&server, status).await;

        let base = Url::parse(&server.uri()).unwrap();
        let resolved = probe_endpoint(&base, "", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(resolved, base);
    }
}

#[tokio::test]
async fn test_probe_rejects_server_error() {
    let server = MockServer::start().await;
    mount_models(&server, 500).await;

    let base = Url::parse(&server.uri()).unwrap();
    let err = probe_endpoint(&base, "secret", Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_probe_rejects_unreachable_endpoint() {
    let base = Url::parse("http://127.0.0.1:1").unwrap();
    let err = probe_endpoint(&base, "", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn test_probe_rejects_redirect_that_is_not_an_https_upgrade() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("Location", "http://other.invalid/v1/models"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let err = probe_endpoint(&base, "", Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
    let message = err.to_string();
    assert!(message.contains("unexpected redirect"), "{}", message);
    assert!(message.contains("http://other.invalid/v1/models"), "{}", message);
}

#[tokio::test]
async fn test_probe_rejects_redirect_without_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(302))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let err = probe_endpoint(&base, "", Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
    assert!(err.to_string().contains("unexpected redirect"));
}

#[tokio::test]
async fn test_failed_probe_runs_no_patterns() {
    let server = MockServer::start().await;
    mount_models(&server, 500).await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = execute_run(&config(&server, true), &plan())
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
}

#[test_log::test(tokio::test)]
async fn test_streaming_run_end_to_end() {
    let server = MockServer::start().await;
    mount_models(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({"model": "test-model", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(6)
        .mount(&server)
        .await;

    let outcome = execute_run(&config(&server, true), &plan()).await.unwrap();

    assert!(outcome.streaming);
    assert_eq!(outcome.prefill_estimate, None);
    assert_eq!(outcome.patterns.len(), 2);
    assert_eq!(outcome.patterns[1].phases.len(), 2);
    assert!(outcome.endpoint.ends_with("/v1/completions"));

    let report = RunReport::build(&outcome);
    assert_eq!(report.overall.total, 6);
    assert_eq!(report.overall.success, 6);
    assert_eq!(report.overall.completion_tokens, 12);
    assert_eq!(report.overall.metric(TTFT_MS).unwrap().count, 6);
    assert_eq!(report.overall.metric(TPOT_MS).unwrap().count, 6);
    assert!(report.overall.metric(TPOT_EST_MS).is_none());
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_non_streaming_run_calibrates_prefill() {
    let server = MockServer::start().await;
    mount_models(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({"max_tokens": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "a"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({"max_tokens": 32, "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "abc"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 32}
        })))
        .expect(6)
        .mount(&server)
        .await;

    let outcome = execute_run(&config(&server, false), &plan()).await.unwrap();

    assert!(!outcome.streaming);
    assert!(outcome.prefill_estimate.is_some());

    let report = RunReport::build(&outcome);
    assert_eq!(report.overall.success, 6);
    assert!(report.overall.metric(TTFT_MS).is_none());
    assert!(report.overall.metric(TPOT_MS).is_none());
    assert_eq!(report.overall.metric(TPOT_EST_MS).unwrap().count, 6);
}

#[tokio::test]
async fn test_request_failures_do_not_fail_the_run() {
    let server = MockServer::start().await;
    mount_models(&server, 401).await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .expect(6)
        .mount(&server)
        .await;

    let outcome = execute_run(&config(&server, true), &plan()).await.unwrap();
    let report = RunReport::build(&outcome);

    assert_eq!(report.overall.total, 6);
    assert_eq!(report.overall.failed, 6);
    assert_eq!(report.failures.get("status:401"), Some(&6));
}

#[tokio::test]
async fn test_invalid_plan_is_rejected_before_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let plan = RunPlan::new(vec![NamedPattern::new("empty", LoadPattern::sweep(vec![]))]);
    let err = execute_run(&config(&server, true), &plan)
        .await
        .unwrap_err();

    assert!(!err.is_connectivity());
}
