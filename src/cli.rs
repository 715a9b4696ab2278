//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// textagg - merge per-section text analytics into job reports
///
/// Reads partial results (one JSON object per line), merges them per job
/// with duplicate and out-of-order delivery tolerated, writes one durable
/// record per finalized job, and prints a report.
///
/// Examples:
///   textagg --input results.jsonl
///   textagg --input - --job J1,J2 --format json
///   textagg --input results.jsonl --capacity 50 --results-dir out/
///   textagg --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// File of newline-delimited partial results, or '-' for stdin
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Jobs to report on (comma-separated); defaults to every known job
    #[arg(short, long = "job", value_name = "IDS", value_delimiter = ',')]
    pub jobs: Vec<String>,

    /// Ranking size for jobs still in progress
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Output file path for the report (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Finalized results kept in memory
    #[arg(long, value_name = "COUNT", env = "TEXTAGG_CAPACITY")]
    pub capacity: Option<usize>,

    /// Directory for durable job records
    #[arg(long, value_name = "DIR", env = "TEXTAGG_RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Number of concurrent consumers
    #[arg(long, value_name = "NUM")]
    pub consumers: Option<usize>,

    /// Expire incomplete jobs idle for this many seconds after ingest
    #[arg(long, value_name = "SECS")]
    pub expire_idle: Option<u64>,

    /// Exit with code 2 if any job is still incomplete
    #[arg(long)]
    pub fail_on_incomplete: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .textagg.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .textagg.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether input comes from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_deref().is_some_and(|p| p.as_os_str() == "-")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.top_n == Some(0) {
            return Err("--top-n must be at least 1".to_string());
        }
        if self.capacity == Some(0) {
            return Err("--capacity must be at least 1".to_string());
        }
        if self.consumers == Some(0) {
            return Err("--consumers must be at least 1".to_string());
        }

        if self.jobs.iter().any(|j| j.trim().is_empty()) {
            return Err("Job ids must not be empty".to_string());
        }

        if let Some(ref input) = self.input {
            if !self.reads_stdin() && !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings. `--quiet` wins
    /// over a config file that asks for verbose output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: Some(PathBuf::from("-")),
            jobs: Vec::new(),
            top_n: None,
            output: None,
            format: OutputFormat::Markdown,
            capacity: None,
            results_dir: None,
            consumers: None,
            expire_idle: None,
            fail_on_incomplete: false,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "textagg", "--input", "-", "--job", "J1,J2", "--top-n", "3", "--format", "json",
        ])
        .unwrap();
        assert!(args.reads_stdin());
        assert_eq!(args.jobs, vec!["J1", "J2"]);
        assert_eq!(args.top_n, Some(3));
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_input_required_unless_init_config() {
        assert!(Args::try_parse_from(["textagg"]).is_err());
        assert!(Args::try_parse_from(["textagg", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        assert!(args.validate().is_ok());

        args.capacity = Some(0);
        assert!(args.validate().is_err());

        args.capacity = None;
        args.top_n = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_input_file() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("/definitely/not/here.jsonl"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
