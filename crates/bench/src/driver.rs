//! Load pattern driver
//!
//! Runs [`LoadPattern`]s over an [`Executor`]. The driver only schedules:
//! it never looks at record contents. Every dispatched request yields one
//! record; requests not dispatched because the run deadline passed are
//! counted as abandoned.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::executor::Executor;
use crate::pattern::{Dispatch, LoadPattern, NamedPattern};
use crate::record::{FailureReason, RequestRecord, RequestSpec};
use crate::sink::RecordSink;

/// One measured phase of a pattern.
///
/// Burst and Sustained patterns have a single phase; a sweep has one per
/// level. Offsets are relative to the start of the run.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub label: String,
    /// Concurrency cap, `None` for sustained (open-loop) phases
    pub concurrency: Option<usize>,
    pub start_offset: Duration,
    /// Wall clock from first dispatch until the last request completed
    pub duration: Duration,
    pub declared: usize,
    pub abandoned: usize,
    pub records: Vec<RequestRecord>,
}

impl PhaseResult {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }

    pub fn dispatched(&self) -> usize {
        self.declared - self.abandoned
    }

    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.records.len() - self.successes()
    }
}

/// All phases of one named pattern
#[derive(Debug, Clone)]
pub struct PatternResult {
    pub name: String,
    pub pattern: LoadPattern,
    pub phases: Vec<PhaseResult>,
}

impl PatternResult {
    pub fn records(&self) -> impl Iterator<Item = &RequestRecord> {
        self.phases.iter().flat_map(|p| p.records.iter())
    }

    /// Sum of phase durations; phases never overlap
    pub fn duration(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

/// Everything a report is built from
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub model: String,
    pub endpoint: String,
    pub streaming: bool,
    /// Calibrated prefill latency, only for non-streaming runs
    pub prefill_estimate: Option<Duration>,
    pub patterns: Vec<PatternResult>,
}

/// Run-relative time reference
#[derive(Debug, Clone, Copy)]
struct RunClock {
    origin: Instant,
    deadline: Option<Instant>,
}

impl RunClock {
    fn start(timeout: Option<Duration>) -> Self {
        let origin = Instant::now();
        Self {
            origin,
            deadline: timeout.map(|t| origin + t),
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn expired_at(&self, at: Instant) -> bool {
        self.deadline.is_some_and(|d| at >= d)
    }
}

/// Runs load patterns over an executor
pub struct Driver {
    executor: Arc<dyn Executor>,
    template: RequestSpec,
    run_timeout: Option<Duration>,
}

impl Driver {
    /// Every request of the run is a copy of `template`
    pub fn new(executor: Arc<dyn Executor>, template: RequestSpec) -> Self {
        Self {
            executor,
            template,
            run_timeout: None,
        }
    }

    /// Stop dispatching new requests once `timeout` has elapsed since the
    /// run started. In-flight requests still complete and are recorded.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Run patterns in order, one after another
    pub async fn run(&self, patterns: &[NamedPattern]) -> Vec<PatternResult> {
        let clock = RunClock::start(self.run_timeout);
        let mut results = Vec::with_capacity(patterns.len());

        for named in patterns {
            results.push(self.run_with_clock(named, clock).await);
        }

        results
    }

    /// Run a single pattern as its own run
    pub async fn run_pattern(&self, named: &NamedPattern) -> PatternResult {
        self.run_with_clock(named, RunClock::start(self.run_timeout))
            .await
    }

    async fn run_with_clock(&self, named: &NamedPattern, clock: RunClock) -> PatternResult {
        tracing::info!(pattern = %named.name, spec = %named.pattern, "Starting pattern");

        let phases = match &named.pattern {
            LoadPattern::Burst {
                concurrency,
                count,
                dispatch,
            } => {
                let label = format!("c={}", concurrency);
                vec![
                    self.burst(&clock, label, *concurrency, *count, *dispatch)
                        .await,
                ]
            }
            LoadPattern::Sustained { count, interval } => {
                vec![self.sustained(&clock, *count, *interval).await]
            }
            LoadPattern::ConcurrencySweep { levels, rounds } => {
                let mut phases = Vec::with_capacity(levels.len());
                for level in levels {
                    let label = format!("c={}", level);
                    let phase = self
                        .burst(&clock, label, *level, level * rounds, Dispatch::Sliding)
                        .await;
                    phases.push(phase);
                }
                phases
            }
        };

        for phase in &phases {
            tracing::info!(
                pattern = %named.name,
                phase = %phase.label,
                success = phase.successes(),
                failed = phase.failures(),
                abandoned = phase.abandoned,
                duration_ms = phase.duration.as_millis() as u64,
                "Phase complete"
            );
        }

        PatternResult {
            name: named.name.clone(),
            pattern: named.pattern.clone(),
            phases,
        }
    }

    async fn burst(
        &self,
        clock: &RunClock,
        label: String,
        concurrency: usize,
        count: usize,
        dispatch: Dispatch,
    ) -> PhaseResult {
        let sink = RecordSink::with_capacity(count);
        let start = Instant::now();
        let mut dispatched = 0;

        match dispatch {
            Dispatch::Sliding => {
                let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
                let mut tasks = JoinSet::new();

                while dispatched < count {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    if clock.expired() {
                        break;
                    }
                    self.spawn_request(&mut tasks, &sink, Some(permit));
                    dispatched += 1;
                }

                drain_tasks(&mut tasks, &sink).await;
            }
            Dispatch::Batches => {
                while dispatched < count && !clock.expired() {
                    let batch = concurrency.max(1).min(count - dispatched);
                    let mut tasks = JoinSet::new();
                    for _ in 0..batch {
                        self.spawn_request(&mut tasks, &sink, None);
                    }
                    dispatched += batch;
                    drain_tasks(&mut tasks, &sink).await;
                }
            }
        }

        finish_phase(clock, label, Some(concurrency), start, count, dispatched, sink)
    }

    async fn sustained(&self, clock: &RunClock, count: usize, interval: Duration) -> PhaseResult {
        let sink = RecordSink::with_capacity(count);
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        for i in 0..count {
            // Absolute schedule so slow spawns don't accumulate drift
            let at = start + interval.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
            if clock.expired_at(at) {
                break;
            }
            tokio::time::sleep_until(at).await;
            self.spawn_request(&mut tasks, &sink, None);
            dispatched += 1;
        }

        drain_tasks(&mut tasks, &sink).await;

        let label = format!("every {}ms", interval.as_millis());
        finish_phase(clock, label, None, start, count, dispatched, sink)
    }

    fn spawn_request(
        &self,
        tasks: &mut JoinSet<()>,
        sink: &RecordSink,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let executor = Arc::clone(&self.executor);
        let spec = self.template.clone();
        let sink = sink.clone();

        tasks.spawn(async move {
            executor.execute_into(&spec, &sink).await;
            drop(permit);
        });
    }
}

/// Wait for every in-flight request. A task that died without recording
/// still gets its one record.
async fn drain_tasks(tasks: &mut JoinSet<()>, sink: &RecordSink) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Request task failed");
            sink.push(RequestRecord::failed(
                FailureReason::Transport(format!("request task failed: {}", e)),
                Duration::ZERO,
            ));
        }
    }
}

fn finish_phase(
    clock: &RunClock,
    label: String,
    concurrency: Option<usize>,
    start: Instant,
    declared: usize,
    dispatched: usize,
    sink: RecordSink,
) -> PhaseResult {
    let duration = start.elapsed();
    let abandoned = declared - dispatched;
    if abandoned > 0 {
        tracing::warn!(phase = %label, abandoned, "Run deadline reached, requests abandoned");
    }

    PhaseResult {
        label,
        concurrency,
        start_offset: start.duration_since(clock.origin),
        duration,
        declared,
        abandoned,
        records: sink.drain(),
    }
}
