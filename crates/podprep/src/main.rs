//! podprep CLI - drives the provisioning engine.
//!
//! Stands in for the external UI layer: each `advance` is one
//! evaluate-and-advance cycle; `run` re-invokes until the workflow
//! reaches a terminal point (ready, restart pending, or failure).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use podprep::classifier::classify;
use podprep::flag_store::{FlagStore, SETUP_COMPLETE_KEY};
use podprep::probe;
use podprep::provisioner::Provisioner;
use podprep_common::{
    DistroIdentity, EngineStatusSignal, HostRunner, ProvisionConfig, ProvisioningState,
    UserCredential,
};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::info;

/// Environment variable consulted for the operating user's password.
const PASSWORD_ENV: &str = "PODPREP_PASSWORD";

#[derive(Parser)]
#[command(name = "podprep", version, about = "Provision a WSL distro for containers")]
struct Cli {
    /// Config file path (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the engine and print the current provisioning state.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one evaluate-and-advance cycle.
    Advance {
        /// Read the operating user's password from stdin instead of
        /// the environment.
        #[arg(long)]
        password_stdin: bool,
    },
    /// Re-run cycles until ready, a restart is pending, or an error.
    Run {
        #[arg(long)]
        password_stdin: bool,
    },
    /// Clear the persisted completion flag.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(ProvisionConfig::default_path);
    let config = ProvisionConfig::load(&config_path);

    match cli.command {
        Command::Status { json } => status(&config, json).await,
        Command::Advance { password_stdin } => {
            let credential = credential(&config, password_stdin)?;
            advance(config, credential, false).await
        }
        Command::Run { password_stdin } => {
            let credential = credential(&config, password_stdin)?;
            advance(config, credential, true).await
        }
        Command::Reset => reset(&config),
    }
}

async fn status(config: &ProvisionConfig, json: bool) -> Result<()> {
    let runner = HostRunner::new();
    let distro = DistroIdentity::new(config.distro.clone());
    let signals = probe::gather_signals(&runner, &distro).await;
    let state = classify(&signals, &distro);

    if json {
        let report = serde_json::json!({
            "state": state,
            "description": state.description(),
            "distro": distro.as_str(),
            "installed_distros": signals.installed_distros,
            "engine_status_available": matches!(
                signals.engine_status,
                EngineStatusSignal::Text(_)
            ),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", state, state.description());
    }
    Ok(())
}

async fn advance(config: ProvisionConfig, credential: UserCredential, to_completion: bool) -> Result<()> {
    let flag_path = config
        .flag_path
        .clone()
        .unwrap_or_else(FlagStore::default_path);
    let flags = FlagStore::open(flag_path)?;

    let (ui_tx, mut ui_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut provisioner =
        Provisioner::new(HostRunner::new(), config, flags).with_ui_channel(ui_tx);

    loop {
        let outcome = provisioner.evaluate_and_advance(&credential).await?;
        while let Ok(target) = ui_rx.try_recv() {
            info!("UI notification: {}", target.as_str());
        }

        match outcome.state_after {
            ProvisioningState::Ready => {
                if outcome.flag_written {
                    println!("Provisioning complete; completion flag written.");
                    return Ok(());
                }
                if outcome.state_before == ProvisioningState::Ready {
                    println!("Already provisioned.");
                    return Ok(());
                }
                // Remediation just reached Ready; one more cycle records it.
                if to_completion {
                    continue;
                }
                println!("Provisioning verified; re-run to record completion.");
                return Ok(());
            }
            ProvisioningState::NeedsRestart => {
                println!(
                    "Host restart required to finish enabling the virtualization \
                     platform. Restart, then run podprep again."
                );
                return Ok(());
            }
            state => {
                println!("State after cycle: {} - {}", state, state.description());
                if !to_completion {
                    return Ok(());
                }
            }
        }
    }
}

fn reset(config: &ProvisionConfig) -> Result<()> {
    let flag_path = config
        .flag_path
        .clone()
        .unwrap_or_else(FlagStore::default_path);
    let mut flags = FlagStore::open(flag_path)?;
    if flags.delete(SETUP_COMPLETE_KEY)? {
        println!("Completion flag cleared.");
    } else {
        println!("No completion flag was set.");
    }
    Ok(())
}

fn credential(config: &ProvisionConfig, password_stdin: bool) -> Result<UserCredential> {
    let password = if password_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else if let Ok(password) = std::env::var(PASSWORD_ENV) {
        password
    } else {
        bail!("no password provided: set {} or pass --password-stdin", PASSWORD_ENV);
    };

    if password.is_empty() {
        bail!("password must not be empty");
    }

    Ok(UserCredential::new(config.username.clone(), password))
}
