// apptopo - sync CSV-declared business applications into platform topology

mod exit_codes;
mod logging;
mod signals;
mod source;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_CONFIG, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "apptopo")]
#[command(about = "Sync business applications from a CSV into platform topology definitions")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the CSV, match members to VMs and create/update BusinessApplications
    #[command(after_help = "\
Environment:
  TURBO_ADDRESS, TURBO_USERNAME, TURBO_PASSWORD   platform endpoint and login
  TURBO_INSECURE_TLS=1                            accept self-signed certificates
  APPTOPO_LOG                                     tracing filter, overrides LOG_LEVEL

Examples:
  apptopo sync run.json
  apptopo sync run.json --dry-run --json
  apptopo sync run.json --output last-run.json")]
    Sync {
        /// Run configuration (JSON)
        config: PathBuf,

        /// Plan only; read everything but write no topology definitions
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Also write the JSON run report to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Check the config and credentials without contacting anything
    #[command(after_help = "\
Examples:
  apptopo validate run.json")]
    Validate {
        /// Run configuration (JSON)
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  apptopo-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    signals::install();

    let result = match cli.command {
        Commands::Sync {
            config,
            dry_run,
            json,
            output,
        } => sync::cmd_sync(config, dry_run, json, output),
        Commands::Validate { config } => sync::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
