//! textagg - section result aggregator
//!
//! Consumes per-section text analytics delivered at-least-once and out
//! of order, merges them into one result per job, and reports on them.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, input, output, etc.)
//!   2 - Incomplete jobs remain and --fail-on-incomplete was set

mod aggregation;
mod cli;
mod config;
mod error;
mod ingest;
mod models;
mod report;
mod store;

use aggregation::AggregationEngine;
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{FsResultSink, ResultStore};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(args.log_level(config.general.verbose));

    info!("textagg v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .textagg.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity flags.
fn init_logging(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Ingest, optionally expire, then report. Returns exit code (0 or 2).
async fn run(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);
    config.validate()?;

    let sink = FsResultSink::new(&config.store.results_dir);
    info!("Durable records in {}", sink.dir().display());
    let engine = Arc::new(AggregationEngine::new(ResultStore::new(
        config.store.capacity,
        Box::new(sink),
    )));
    debug!("Cache capacity {}", engine.store().capacity());

    let reader = open_input(&args).await?;
    let progress = if args.quiet { None } else { Some(ingest_spinner()) };
    let summary = ingest::ingest(
        reader,
        Arc::clone(&engine),
        config.general.consumers,
        progress,
    )
    .await?;

    info!(
        "Read {} lines: {} decoded, {} undecodable in {:.1}s",
        summary.lines,
        summary.decoded,
        summary.undecodable,
        start_time.elapsed().as_secs_f64()
    );
    debug!(
        "Cache holds {} of {} finalized results",
        engine.store().len(),
        engine.store().capacity()
    );

    if let Some(max_idle) = config.aggregation.idle_expiry() {
        let expired = engine.expire_idle(max_idle);
        if !expired.is_empty() {
            info!("Expired {} idle jobs", expired.len());
        }
    }

    let live = engine.live_jobs();
    if !live.is_empty() {
        warn!(
            "{} jobs are still incomplete and remain in memory: {}",
            live.len(),
            live.join(", ")
        );
    }

    let job_ids = if args.jobs.is_empty() {
        let mut ids = engine.cached_jobs();
        ids.extend(live.iter().cloned());
        ids
    } else {
        args.jobs.clone()
    };

    let report = report::Report {
        stats: engine.stats(),
        jobs: job_ids
            .into_iter()
            .map(|job_id| {
                let view = engine.get(&job_id, config.query.top_n);
                report::JobEntry { job_id, view }
            })
            .collect(),
    };

    let finalized = report
        .jobs
        .iter()
        .filter(|j| j.view.as_ref().is_some_and(|v| v.is_finalized()))
        .count();
    info!(
        "Reporting {} jobs ({} finalized)",
        report.jobs.len(),
        finalized
    );

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report saved to {}", path.display());
        }
        None => print!("{}", output),
    }

    if args.fail_on_incomplete && !engine.live_jobs().is_empty() {
        eprintln!("Incomplete jobs remain. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Open the partial-result source named by --input.
async fn open_input(args: &Args) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if args.reads_stdin() {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }

    let path = args.input.as_ref().context("No input given")?;
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input: {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn ingest_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} partials read")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Where the configuration came from. Logged once logging is set up,
/// since the log level itself depends on the configuration.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Defaults,
    Fallback(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigSource::Defaults => debug!("No config file found, using defaults"),
            ConfigSource::Fallback(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::Defaults)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(e))),
    }
}
