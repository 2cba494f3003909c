//! Foreman host builder - create a batch of hosts from a YAML template.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::builder::TypedValueParser as _;
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use foreman_host_builder::config::{self, ConfigError};
use foreman_host_builder::pool::DEFAULT_WORKERS;
use foreman_host_builder::template::{self, TemplateError};
use foreman_host_builder::{
    ForemanClient, HostJobProcessor, JobQueue, ShutdownCoordinator, WorkerPool,
};

/// Foreman host builder - create hosts listed in a YAML template.
#[derive(Parser, Debug)]
#[command(name = "foreman-host-builder")]
#[command(about = "Create Foreman hosts concurrently from a YAML template")]
struct Cli {
    /// Credentials file; created with defaults if missing.
    #[arg(long, default_value = "foreman-host-builder.toml")]
    config: PathBuf,

    /// YAML template listing the hosts to create.
    #[arg(long, default_value = "foreman-host-builder.yaml")]
    template: PathBuf,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS, value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    threads: usize,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Exit code for a startup failure, 1 unless the error says otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TemplateError>() {
        e.exit_code()
    } else {
        1
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let started = Instant::now();
    info!("Starting Foreman host builder");
    debug!(?cli, "Options");

    let config = config::load_or_create(&cli.config)?;
    debug!(?config, "Client configuration");

    let jobs = template::load_jobs(&cli.template)?;
    let names: Vec<&str> = jobs.iter().map(|j| j.name()).collect();
    info!(count = jobs.len(), hosts = ?names, "Hosts");

    let queue: Arc<JobQueue> = Arc::new(jobs.into_iter().collect());

    let client = ForemanClient::new(&config).context("Failed to create Foreman client")?;
    let processor = HostJobProcessor::new(Arc::new(client));
    let pool = WorkerPool::new(cli.threads, queue, processor);

    let shutdown = ShutdownCoordinator::new();
    shutdown
        .listen()
        .context("Failed to install signal handlers")?;

    let summary = pool.run(&shutdown.token()).await;

    info!(
        created = summary.tally.created,
        already_exists = summary.tally.already_exists,
        failed = summary.tally.failed,
        errored = summary.tally.errored,
        remaining = summary.remaining,
        interrupted = summary.interrupted(),
        took = format!("{:.2}s", started.elapsed().as_secs_f64()),
        "Done!"
    );

    Ok(summary.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = format!("{e:#}"), "Host builder failed");
            ExitCode::from(exit_code(&e))
        }
    }
}
