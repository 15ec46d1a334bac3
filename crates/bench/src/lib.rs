// Inference load-test harness
//
// Drives an OpenAI-compatible completion endpoint with declarative load
// patterns and reports latency decomposed into time-to-first-token,
// inter-token latency and time-per-output-token.
//
// Layering, leaf-first:
//   stats     - percentile aggregation
//   protocol  - completion wire types
//   record    - request spec and per-request record
//   executor  - one timed request -> one RequestRecord
//   sink      - append-only record collection shared by in-flight requests
//   pattern   - load pattern definitions
//   driver    - runs patterns over an executor
//   probe     - pre-flight connectivity check
//   plan      - named pattern lists (YAML)
//   report    - aggregation and rendering
//   run       - probe, calibration and patterns end to end

pub mod driver;
pub mod error;
pub mod executor;
pub mod pattern;
pub mod plan;
pub mod probe;
pub mod protocol;
pub mod record;
pub mod report;
pub mod run;
pub mod sink;
pub mod stats;

pub use driver::{Driver, PatternResult, PhaseResult, RunOutcome};
pub use error::{BenchError, Result};
pub use executor::{estimate_prefill, Executor, ExecutorConfig, HttpExecutor};
pub use pattern::{Dispatch, LoadPattern, NamedPattern};
pub use plan::RunPlan;
pub use probe::probe_endpoint;
pub use record::{FailureReason, Outcome, RequestRecord, RequestSpec};
pub use report::{PatternReport, PhaseReport, RunReport, Totals};
pub use run::{execute_run, RunConfig};
pub use sink::RecordSink;
pub use stats::{mean, millis, percentile, Summary};
