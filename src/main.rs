//! tagrelay CLI entry point.
//!
//! ```bash
//! tagrelay example > relay.toml
//! tagrelay check relay.toml
//! tagrelay run relay.toml -v
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tagrelay::core::logging::{init_tracing, LogSettings, RelayLogConfig, TracingLogHandler};
use tagrelay::core::tag::TagType;
use tagrelay::relay::{RelayConfig, Supervisor};
use tagrelay::{RelayError, Result};

/// Store-and-forward relay for industrial controller tag readings
#[derive(Parser, Debug)]
#[command(name = "tagrelay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll every configured host until Ctrl+C
    Run {
        /// Configuration file path
        config: PathBuf,

        /// Emit logs as JSON lines
        #[arg(long)]
        log_json: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a configuration file and resolve every host
    Check {
        /// Configuration file path
        config: PathBuf,
    },

    /// Print an example configuration
    Example,

    /// List supported tag types
    ListTypes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_json,
            verbose,
        } => run(config, log_json, verbose).await,
        Commands::Check { config } => check(config),
        Commands::Example => {
            print!("{}", RelayConfig::example());
            Ok(())
        }
        Commands::ListTypes => {
            list_types();
            Ok(())
        }
    }
}

async fn run(path: PathBuf, log_json: bool, verbose: bool) -> Result<()> {
    init_tracing(LogSettings {
        verbose,
        json: log_json,
    })
    .map_err(RelayError::Config)?;

    let config = RelayConfig::load(&path)?;
    info!(
        relay = %config.relay.name,
        hosts = config.hosts.len(),
        fallback_file = %config.relay.fallback_file.display(),
        "Loaded configuration"
    );

    let log_config = if verbose {
        RelayLogConfig::all()
    } else {
        RelayLogConfig::default()
    };

    let mut supervisor = Supervisor::from_config(&config, None)?
        .with_logging(Arc::new(TracingLogHandler), log_config);

    if supervisor.start(&config) == 0 {
        return Err(RelayError::Config("no host could be started".to_string()));
    }

    info!("Relay started. Press Ctrl+C to stop.");
    let summaries = supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl+C, shutting down");
            }
        })
        .await;

    let delivered: u64 = summaries.iter().map(|s| s.diagnostics.delivered()).sum();
    info!(hosts = summaries.len(), delivered = delivered, "Relay stopped");
    Ok(())
}

fn check(path: PathBuf) -> Result<()> {
    let config = RelayConfig::load(&path)?;

    println!("Configuration '{}' is valid.", config.relay.name);
    println!();

    let mut failures = 0;
    for host in &config.hosts {
        let status = if host.enabled { "" } else { " (disabled)" };
        match config.host_descriptor(host) {
            Ok(desc) => {
                println!(
                    "  {}{}: {} tags, every {}s, timeout {}ms",
                    desc.target,
                    status,
                    desc.tags.len(),
                    desc.poll_interval.as_secs(),
                    desc.comm_timeout.as_millis()
                );
            }
            Err(e) => {
                if host.enabled {
                    failures += 1;
                }
                println!("  {}:{}{}: ERROR {}", host.address, host.port, status, e);
            }
        }
    }

    if failures > 0 {
        return Err(RelayError::Config(format!(
            "{} enabled host(s) have invalid settings",
            failures
        )));
    }
    Ok(())
}

fn list_types() {
    println!("Supported tag types:");
    println!();
    for t in TagType::ALL {
        println!("  {:<7} {:>2} bits  {}", t.name(), t.bit_width(), t.description());
    }
}
