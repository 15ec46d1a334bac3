//! Report builder
//!
//! Turns a [`RunOutcome`] into aggregated counts, metric summaries and
//! throughput, per run, per pattern and per phase. Building is a pure
//! function of its input; rendering writes to any `io::Write`.
//!
//! Throughput always divides by the measured wall clock of the phase (or
//! the sum of non-overlapping phases), never by summed request latency.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

use crate::driver::{PatternResult, PhaseResult, RunOutcome};
use crate::error::Result;
use crate::record::RequestRecord;
use crate::stats::{millis, Summary};

/// End-to-end latency of successful requests
pub const LATENCY_MS: &str = "latency_ms";
/// Measured time to first token (streaming only)
pub const TTFT_MS: &str = "ttft_ms";
/// Measured interval between consecutive tokens (streaming only)
pub const ITL_MS: &str = "itl_ms";
/// Measured time per output token: (latency - ttft) / completion tokens
pub const TPOT_MS: &str = "tpot_ms";
/// Estimated time per output token for non-streaming requests:
/// (latency - prefill estimate) / completion tokens
pub const TPOT_EST_MS: &str = "tpot_est_ms";

/// Counts, metrics and throughput over a set of records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Percentage of recorded requests that succeeded
    pub success_rate: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_secs: f64,
    pub requests_per_sec: f64,
    pub output_tokens_per_sec: f64,
    /// Keyed by metric name; metrics without samples are omitted
    pub metrics: BTreeMap<String, Summary>,
}

impl Totals {
    fn from_records<'a>(
        records: impl IntoIterator<Item = &'a RequestRecord>,
        duration: Duration,
        abandoned: usize,
        prefill_estimate: Option<Duration>,
    ) -> Self {
        let mut samples = Samples::default();
        let mut total = 0;
        let mut success = 0;
        let mut prompt_tokens = 0;
        let mut completion_tokens = 0;

        for record in records {
            total += 1;
            if !record.is_success() {
                continue;
            }
            success += 1;
            prompt_tokens += record.prompt_tokens;
            completion_tokens += record.completion_tokens;
            samples.add(record, prefill_estimate);
        }

        let duration_secs = duration.as_secs_f64();
        let per_sec = |n: f64| {
            if duration_secs > 0.0 {
                n / duration_secs
            } else {
                0.0
            }
        };

        Self {
            total,
            success,
            failed: total - success,
            abandoned,
            success_rate: if total > 0 {
                success as f64 * 100.0 / total as f64
            } else {
                0.0
            },
            prompt_tokens,
            completion_tokens,
            duration_secs,
            requests_per_sec: per_sec(success as f64),
            output_tokens_per_sec: per_sec(completion_tokens as f64),
            metrics: samples.summarize(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<&Summary> {
        self.metrics.get(name)
    }
}

#[derive(Default)]
struct Samples {
    latency: Vec<f64>,
    ttft: Vec<f64>,
    itl: Vec<f64>,
    tpot: Vec<f64>,
    tpot_est: Vec<f64>,
}

impl Samples {
    fn add(&mut self, record: &RequestRecord, prefill_estimate: Option<Duration>) {
        self.latency.push(millis(record.total_latency));
        if let Some(ttft) = record.time_to_first_byte {
            self.ttft.push(millis(ttft));
        }
        self.itl
            .extend(record.inter_token_times.iter().copied().map(millis));
        if let Some(tpot) = record.time_per_output_token() {
            self.tpot.push(millis(tpot));
        }
        if let Some(prefill) = prefill_estimate {
            if let Some(tpot) = record.estimated_time_per_output_token(prefill) {
                self.tpot_est.push(millis(tpot));
            }
        }
    }

    fn summarize(self) -> BTreeMap<String, Summary> {
        [
            (LATENCY_MS, self.latency),
            (TTFT_MS, self.ttft),
            (ITL_MS, self.itl),
            (TPOT_MS, self.tpot),
            (TPOT_EST_MS, self.tpot_est),
        ]
        .into_iter()
        .filter(|(_, samples)| !samples.is_empty())
        .map(|(name, samples)| (name.to_string(), Summary::from_samples(&samples)))
        .collect()
    }
}

/// One phase (a sweep level, or the single phase of other patterns)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub label: String,
    pub concurrency: Option<usize>,
    pub start_offset_secs: f64,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub name: String,
    pub kind: String,
    pub description: String,
    #[serde(flatten)]
    pub totals: Totals,
    pub phases: Vec<PhaseReport>,
}

/// Aggregated result of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub model: String,
    pub endpoint: String,
    pub streaming: bool,
    pub prefill_estimate_ms: Option<f64>,
    pub overall: Totals,
    /// Failure counts keyed by failure kind
    pub failures: BTreeMap<String, usize>,
    pub patterns: Vec<PatternReport>,
}

impl RunReport {
    pub fn build(outcome: &RunOutcome) -> Self {
        let prefill = outcome.prefill_estimate;

        let patterns: Vec<PatternReport> = outcome
            .patterns
            .iter()
            .map(|p| pattern_report(p, prefill))
            .collect();

        let all_phases = || outcome.patterns.iter().flat_map(|p| p.phases.iter());
        let overall = Totals::from_records(
            all_phases().flat_map(|phase| phase.records.iter()),
            all_phases().map(|phase| phase.duration).sum(),
            all_phases().map(|phase| phase.abandoned).sum(),
            prefill,
        );

        let mut failures = BTreeMap::new();
        for reason in all_phases()
            .flat_map(|phase| phase.records.iter())
            .filter_map(RequestRecord::failure)
        {
            *failures.entry(reason.key()).or_insert(0) += 1;
        }

        Self {
            run_id: outcome.run_id.to_string(),
            started_at: outcome.started_at.to_rfc3339(),
            model: outcome.model.clone(),
            endpoint: outcome.endpoint.clone(),
            streaming: outcome.streaming,
            prefill_estimate_ms: prefill.map(millis),
            overall,
            failures,
            patterns,
        }
    }

    pub fn pattern(&self, name: &str) -> Option<&PatternReport> {
        self.patterns.iter().find(|p| p.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable report
    pub fn render_text(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Run {}  started {}", self.run_id, self.started_at)?;
        writeln!(out, "Model:    {}", self.model)?;
        writeln!(out, "Endpoint: {}", self.endpoint)?;
        if self.streaming {
            writeln!(out, "Mode:     streaming (TTFT and TPOT measured)")?;
        } else {
            writeln!(out, "Mode:     non-streaming (TTFT not available)")?;
            if let Some(prefill) = self.prefill_estimate_ms {
                writeln!(
                    out,
                    "Note:     {} is an ESTIMATE using a calibrated prefill of {:.1}ms",
                    TPOT_EST_MS, prefill
                )?;
            }
        }

        writeln!(out)?;
        writeln!(out, "== Overall ==")?;
        render_totals(out, &self.overall, "  ")?;

        if !self.failures.is_empty() {
            writeln!(out)?;
            writeln!(out, "== Failures ==")?;
            for (kind, count) in &self.failures {
                writeln!(out, "  {:<16} {}", kind, count)?;
            }
        }

        for pattern in &self.patterns {
            writeln!(out)?;
            writeln!(out, "== Pattern: {} [{}] ==", pattern.name, pattern.description)?;
            render_totals(out, &pattern.totals, "  ")?;

            if pattern.phases.len() > 1 {
                writeln!(out)?;
                writeln!(
                    out,
                    "  {:<12} {:>7} {:>7} {:>9} {:>10} {:>10} {:>12}",
                    "Phase", "OK", "Failed", "Time(s)", "Req/s", "Tok/s", "P50 lat(ms)"
                )?;
                for phase in &pattern.phases {
                    let p50 = phase
                        .totals
                        .metric(LATENCY_MS)
                        .map(|s| s.p50)
                        .unwrap_or(0.0);
                    writeln!(
                        out,
                        "  {:<12} {:>7} {:>7} {:>9.2} {:>10.2} {:>10.1} {:>12.1}",
                        phase.label,
                        phase.totals.success,
                        phase.totals.failed,
                        phase.totals.duration_secs,
                        phase.totals.requests_per_sec,
                        phase.totals.output_tokens_per_sec,
                        p50
                    )?;
                }
            }
        }

        Ok(())
    }
}

fn pattern_report(pattern: &PatternResult, prefill: Option<Duration>) -> PatternReport {
    let phases = pattern
        .phases
        .iter()
        .map(|phase| phase_report(phase, prefill))
        .collect();

    PatternReport {
        name: pattern.name.clone(),
        kind: pattern.pattern.kind().to_string(),
        description: pattern.pattern.to_string(),
        totals: Totals::from_records(
            pattern.records(),
            pattern.duration(),
            pattern.phases.iter().map(|p| p.abandoned).sum(),
            prefill,
        ),
        phases,
    }
}

fn phase_report(phase: &PhaseResult, prefill: Option<Duration>) -> PhaseReport {
    PhaseReport {
        label: phase.label.clone(),
        concurrency: phase.concurrency,
        start_offset_secs: phase.start_offset.as_secs_f64(),
        totals: Totals::from_records(&phase.records, phase.duration, phase.abandoned, prefill),
    }
}

fn render_totals(out: &mut impl Write, totals: &Totals, indent: &str) -> io::Result<()> {
    writeln!(
        out,
        "{}Requests:   {} total, {} ok, {} failed ({:.2}% success)",
        indent, totals.total, totals.success, totals.failed, totals.success_rate
    )?;
    if totals.abandoned > 0 {
        writeln!(
            out,
            "{}Abandoned:  {} (run deadline reached)",
            indent, totals.abandoned
        )?;
    }
    writeln!(
        out,
        "{}Tokens:     {} prompt, {} completion",
        indent, totals.prompt_tokens, totals.completion_tokens
    )?;
    writeln!(
        out,
        "{}Throughput: {:.2} req/s, {:.1} output tok/s over {:.2}s measured",
        indent, totals.requests_per_sec, totals.output_tokens_per_sec, totals.duration_secs
    )?;

    if totals.metrics.is_empty() {
        return Ok(());
    }

    writeln!(
        out,
        "{}{:<20} {:>6} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        indent, "Metric", "Count", "Mean", "P50", "P90", "P95", "P99", "Max"
    )?;
    for (name, summary) in &totals.metrics {
        let label = if name == TPOT_EST_MS {
            format!("{} (estimated)", name)
        } else {
            name.clone()
        };
        writeln!(
            out,
            "{}{:<20} {:>6} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
            indent,
            label,
            summary.count,
            summary.mean,
            summary.p50,
            summary.p90,
            summary.p95,
            summary.p99,
            summary.max
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Dispatch, LoadPattern};
    use crate::record::FailureReason;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn streaming_record(total_ms: u64, ttft_ms: u64, tokens: u64) -> RequestRecord {
        RequestRecord::success(
            Duration::from_millis(total_ms),
            Some(Duration::from_millis(ttft_ms)),
            vec![],
            20,
            tokens,
        )
    }

    fn phase(label: &str, start_s: u64, duration_s: u64, records: Vec<RequestRecord>) -> PhaseResult {
        PhaseResult {
            label: label.to_string(),
            concurrency: Some(records.len()),
            start_offset: Duration::from_secs(start_s),
            duration: Duration::from_secs(duration_s),
            declared: records.len(),
            abandoned: 0,
            records,
        }
    }

    fn outcome(patterns: Vec<PatternResult>, prefill: Option<Duration>) -> RunOutcome {
        RunOutcome {
            run_id: Uuid::nil(),
            started_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            model: "test-model".to_string(),
            endpoint: "http://localhost:8000/v1/completions".to_string(),
            streaming: prefill.is_none(),
            prefill_estimate: prefill,
            patterns,
        }
    }

    #[test]
    fn test_tpot_scenario_five_sequential_requests() {
        let records = (0..5).map(|_| streaming_record(2000, 400, 50)).collect();
        let run = outcome(
            vec![PatternResult {
                name: "sequential".to_string(),
                pattern: LoadPattern::bounded_burst(1, 5, Dispatch::Sliding),
                phases: vec![phase("c=1", 0, 10, records)],
            }],
            None,
        );

        let report = RunReport::build(&run);
        let tpot = report.overall.metric(TPOT_MS).unwrap();
        assert_eq!(tpot.count, 5);
        assert_eq!(tpot.mean, 32.0);
        assert_eq!(tpot.p50, 32.0);
        assert!(report.overall.metric(TPOT_EST_MS).is_none());
        assert_eq!(report.overall.metric(TTFT_MS).unwrap().mean, 400.0);
    }

    #[test]
    fn test_sweep_throughput_uses_own_phase_duration() {
        let level1 = vec![streaming_record(1000, 100, 100)];
        let level4 = (0..4).map(|_| streaming_record(2000, 100, 100)).collect();
        let run = outcome(
            vec![PatternResult {
                name: "sweep".to_string(),
                pattern: LoadPattern::sweep(vec![1, 4]),
                phases: vec![phase("c=1", 0, 1, level1), phase("c=4", 1, 2, level4)],
            }],
            None,
        );

        let report = RunReport::build(&run);
        let sweep = report.pattern("sweep").unwrap();
        assert_eq!(sweep.phases[0].totals.output_tokens_per_sec, 100.0);
        assert_eq!(sweep.phases[1].totals.output_tokens_per_sec, 200.0);
        assert_eq!(sweep.phases[1].totals.requests_per_sec, 2.0);
        // 500 tokens over 3 measured seconds, not over summed latency (9s)
        assert!((sweep.totals.output_tokens_per_sec - 500.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.overall.duration_secs, 3.0);
    }

    #[test]
    fn test_failures_counted_and_excluded_from_metrics() {
        let records = vec![
            streaming_record(1000, 200, 10),
            RequestRecord::failed(
                FailureReason::Status {
                    status: 503,
                    body: "busy".into(),
                },
                Duration::from_millis(5),
            ),
            RequestRecord::failed(FailureReason::Timeout, Duration::from_secs(120)),
            RequestRecord::failed(
                FailureReason::Status {
                    status: 503,
                    body: "busy".into(),
                },
                Duration::from_millis(7),
            ),
        ];
        let run = outcome(
            vec![PatternResult {
                name: "burst".to_string(),
                pattern: LoadPattern::burst(4),
                phases: vec![phase("c=4", 0, 1, records)],
            }],
            None,
        );

        let report = RunReport::build(&run);
        assert_eq!(report.overall.total, 4);
        assert_eq!(report.overall.success, 1);
        assert_eq!(report.overall.failed, 3);
        assert_eq!(report.overall.success_rate, 25.0);
        assert_eq!(report.failures.get("status:503"), Some(&2));
        assert_eq!(report.failures.get("timeout"), Some(&1));
        assert_eq!(report.overall.metric(LATENCY_MS).unwrap().count, 1);
        assert_eq!(report.overall.metric(LATENCY_MS).unwrap().max, 1000.0);
    }

    #[test]
    fn test_non_streaming_reports_estimate_under_its_own_label() {
        let records = vec![
            RequestRecord::success(Duration::from_millis(1100), None, vec![], 10, 100),
            RequestRecord::success(Duration::from_millis(2100), None, vec![], 10, 100),
        ];
        let run = outcome(
            vec![PatternResult {
                name: "burst".to_string(),
                pattern: LoadPattern::burst(2),
                phases: vec![phase("c=2", 0, 3, records)],
            }],
            Some(Duration::from_millis(100)),
        );

        let report = RunReport::build(&run);
        assert!(report.overall.metric(TTFT_MS).is_none());
        assert!(report.overall.metric(TPOT_MS).is_none());
        let estimate = report.overall.metric(TPOT_EST_MS).unwrap();
        assert_eq!(estimate.mean, 15.0);
        assert_eq!(report.prefill_estimate_ms, Some(100.0));

        let mut text = Vec::new();
        report.render_text(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("tpot_est_ms (estimated)"));
        assert!(text.contains("ESTIMATE"));
        assert!(!text.contains("ttft_ms"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let records: Vec<RequestRecord> = (1..=7)
            .map(|i| streaming_record(100 * i, 10 * i, 5 * i))
            .collect();
        let run = outcome(
            vec![PatternResult {
                name: "burst".to_string(),
                pattern: LoadPattern::burst(7),
                phases: vec![phase("c=7", 0, 1, records)],
            }],
            None,
        );

        let first = RunReport::build(&run);
        let second = RunReport::build(&run);
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_empty_run_has_zero_sentinels() {
        let run = outcome(
            vec![PatternResult {
                name: "burst".to_string(),
                pattern: LoadPattern::burst(1),
                phases: vec![phase("c=0", 0, 0, vec![])],
            }],
            None,
        );

        let report = RunReport::build(&run);
        assert_eq!(report.overall.total, 0);
        assert_eq!(report.overall.success_rate, 0.0);
        assert_eq!(report.overall.requests_per_sec, 0.0);
        assert!(report.overall.metrics.is_empty());
    }

    #[test]
    fn test_json_contains_metric_keys() {
        let run = outcome(
            vec![PatternResult {
                name: "burst".to_string(),
                pattern: LoadPattern::burst(1),
                phases: vec![phase("c=1", 0, 1, vec![streaming_record(500, 50, 10)])],
            }],
            None,
        );

        let json: serde_json::Value =
            serde_json::from_str(&RunReport::build(&run).to_json().unwrap()).unwrap();
        assert_eq!(json["overall"]["metrics"]["ttft_ms"]["mean"], 50.0);
        assert_eq!(json["patterns"][0]["name"], "burst");
        assert_eq!(json["patterns"][0]["phases"][0]["label"], "c=1");
        assert_eq!(json["run_id"], "00000000-0000-0000-0000-000000000000");
    }
}
