// inferbench CLI
//
// Design Decision: Use clap derive with env fallbacks; a .env file in the
// working directory is loaded first so shell-script style configuration works.
// Design Decision: Logs go to stderr, the report to stdout.
// Design Decision: Exit non-zero only when the run cannot start (probe or
// configuration); failed requests are part of the report.

mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inferbench::{execute_run, probe_endpoint, RunConfig, RunPlan, RunReport};
use reqwest::Url;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PROMPT: &str =
    "Write a short story about a lighthouse keeper who discovers a message in a bottle.";

#[derive(Parser)]
#[command(name = "inferbench")]
#[command(about = "Load-test an OpenAI-compatible completion endpoint")]
#[command(version)]
pub struct Cli {
    /// Endpoint base URL (without /v1/completions)
    #[arg(
        long,
        env = "INFERBENCH_BASE_URL",
        default_value = "http://localhost:8000",
        global = true
    )]
    pub base_url: Url,

    /// Bearer token
    #[arg(
        long,
        env = "INFERBENCH_API_KEY",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    pub api_key: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"], global = true)]
    pub output: String,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(clap::Args, Clone)]
pub struct RunArgs {
    /// Model identifier
    #[arg(long, env = "INFERBENCH_MODEL", global = true)]
    pub model: Option<String>,

    /// Prompt sent with every request
    #[arg(long, default_value = DEFAULT_PROMPT, global = true)]
    pub prompt: String,

    /// max_tokens for every request
    #[arg(long, default_value = "128", global = true)]
    pub max_tokens: u32,

    /// Use blocking responses; TTFT is then unavailable and TPOT is estimated
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "120", global = true)]
    pub timeout: u64,

    /// Stop dispatching new requests after this many seconds
    #[arg(long, global = true)]
    pub deadline: Option<u64>,

    /// YAML plan file (default plan if omitted)
    #[arg(long, global = true)]
    pub plan: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the load plan (default)
    Run,

    /// Only check that the endpoint is reachable
    Probe,

    /// Print the plan that would run, as YAML
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded .env from {:?}", path);
    }

    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.base_url, &cli.api_key, cli.run, output_format).await,
        Commands::Probe => {
            let resolved = probe_endpoint(&cli.base_url, &cli.api_key, Duration::from_secs(10))
                .await
                .context("Endpoint is not reachable")?;
            println!("reachable: {}", resolved);
            Ok(())
        }
        Commands::Plan => {
            let plan = load_plan(cli.run.plan.as_deref())?;
            print!("{}", serde_yaml::to_string(&plan)?);
            Ok(())
        }
    }
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet {
        "warn"
    } else {
        "inferbench=info,inferbench_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_plan(path: Option<&std::path::Path>) -> Result<RunPlan> {
    match path {
        Some(path) => RunPlan::from_file(path)
            .with_context(|| format!("Failed to load plan from {}", path.display())),
        None => Ok(RunPlan::default_plan()),
    }
}

async fn run(
    base_url: &Url,
    api_key: &str,
    args: RunArgs,
    output_format: output::OutputFormat,
) -> Result<()> {
    let model = args
        .model
        .context("--model (or INFERBENCH_MODEL) is required")?;
    let plan = load_plan(args.plan.as_deref())?;

    let config = RunConfig {
        base_url: base_url.clone(),
        api_key: api_key.to_string(),
        model,
        prompt: args.prompt,
        max_output_tokens: args.max_tokens,
        stream: !args.no_stream,
        request_timeout: Duration::from_secs(args.timeout),
        run_timeout: args.deadline.map(Duration::from_secs),
    };

    let outcome = execute_run(&config, &plan)
        .await
        .context("Run aborted before any pattern executed")?;

    let report = RunReport::build(&outcome);
    output_format.print_report(&report)?;
    Ok(())
}
