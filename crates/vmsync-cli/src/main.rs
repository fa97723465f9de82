//! vmsync - Keep a RackTables CMDB in sync with vCenter
//!
//! One invocation performs one reconciliation pass. It is meant to be run
//! from a scheduler; overlapping invocations are refused by the run lock.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vmsync_connectors::{RackTablesClient, RackTablesCmdb, VCenterClient};
use vmsync_engine::{RunController, RunOptions, RunOutcome, SyncConfig, SyncError};

mod credentials;
mod error;
mod output;

use credentials::Credentials;
use error::{CliError, CliResult};

/// vmsync CLI application
#[derive(Parser)]
#[command(name = "vmsync")]
#[command(about = "Sync VMs from vCenter into RackTables", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Skip the run if the set of VMs is unchanged since the last run
    #[arg(short, long)]
    simple: bool,

    /// Fetch and diff only, write nothing (implies -vv)
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Configuration file path
    #[arg(short, long, env = "VMSYNC_CONFIG")]
    config: Option<String>,

    /// Credentials file path (default ~/.vmwrtpw)
    #[arg(long, env = "VMSYNC_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Log filter for the given flags. `RUST_LOG` still wins when set.
fn log_level(verbose: u8, dry_run: bool, configured: &str) -> String {
    if dry_run || verbose >= 2 {
        "debug".to_string()
    } else if verbose == 1 {
        "info".to_string()
    } else {
        configured.to_string()
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = SyncConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(
        &log_level(cli.verbose, cli.dry_run, &config.logging.level),
        config.logging.json,
    );
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let credentials_path = match cli.credentials.or_else(|| config.run.credentials_path.clone()) {
        Some(path) => path,
        None => Credentials::default_path()?,
    };
    let credentials = Credentials::load(&credentials_path)?;
    tracing::debug!(path = %credentials_path.display(), "Credentials loaded");

    let vcenter = VCenterClient::connect(
        &config.vcenter.url,
        &credentials.vcenter_username,
        &credentials.vcenter_password,
        Duration::from_secs(config.vcenter.request_timeout_secs),
    )
    .await
    .map_err(|source| SyncError::Connection {
        backend: "vcenter",
        source,
    })?;

    let racktables = RackTablesClient::new(
        &config.cmdb.api_url,
        credentials.cmdb_username.clone(),
        credentials.cmdb_password.clone(),
        Duration::from_secs(config.cmdb.request_timeout_secs),
    )
    .map_err(|source| SyncError::Connection {
        backend: "cmdb",
        source,
    })?;

    let options = RunOptions {
        simple_check: cli.simple,
        dry_run: cli.dry_run,
    };
    let mut controller = RunController::new(
        config,
        Arc::new(vcenter),
        Arc::new(RackTablesCmdb::new(racktables)),
    );

    match controller.run(options).await? {
        RunOutcome::Unchanged => {
            if !cli.json {
                output::print_info("No VMs added or removed since the last run");
            }
        }
        RunOutcome::Completed(summary) => {
            if cli.json {
                output::print_json(&summary)?;
            } else {
                output::print_summary(&summary);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::parse_from(["vmsync", "-vv", "-s", "--credentials", "/etc/vmsync/pw"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.simple);
        assert!(!cli.dry_run);
        assert_eq!(cli.credentials, Some(PathBuf::from("/etc/vmsync/pw")));

        let cli = Cli::parse_from(["vmsync", "-n", "--json"]);
        assert!(cli.dry_run);
        assert!(cli.json);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(0, false, "warn"), "warn");
        assert_eq!(log_level(1, false, "warn"), "info");
        assert_eq!(log_level(2, false, "warn"), "debug");
        assert_eq!(log_level(0, true, "warn"), "debug");
    }

    #[test]
    fn test_exit_codes() {
        let held = CliError::Sync(SyncError::AlreadyRunning(PathBuf::from("/tmp/vmsync.lock")));
        assert_eq!(held.exit_code(), 3);
        assert_eq!(CliError::Config("bad".into()).exit_code(), 2);
    }
}
