//! keydra: HashiCorp Vault auto-unsealer
//!
//! - `keydra run` - Keep every configured Vault node unsealed until SIGINT/SIGTERM
//! - `keydra status` - Probe every configured node once and print its seal status
//! - `keydra validate` - Check the configuration file and exit

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keydra::config::{Config, DEFAULT_CONFIG_PATH};
use keydra::error::Result;
use keydra::readiness::PodReadinessGate;
use keydra::rest_api;
use keydra::unsealer::{probe_seal_status, shutdown_channel, KeyShareSet, Scheduler};
use keydra::vault::{self, VaultApi};

#[derive(Parser)]
#[command(name = "keydra")]
#[command(about = "Auto-unsealer for HashiCorp Vault on Kubernetes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "KEYDRA_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the configured Vault nodes unsealed (default)
    Run,
    /// Print the seal status of every configured node
    Status {
        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Validate the configuration file and exit
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing(&config.app.log_level);
            run_unsealer(config).await
        }
        Commands::Status { output } => {
            let statuses = collect_status(&config).await?;
            print_status(&statuses, &output)?;
            Ok(())
        }
        Commands::Validate => {
            println!(
                "Configuration OK: {} node(s), {} unseal key(s), check interval {:?}",
                config.vault.nodes.len(),
                config.vault.keys.len(),
                config.app.check_interval
            );
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build every client once, then run the scheduler until a shutdown signal
async fn run_unsealer(config: Config) -> anyhow::Result<()> {
    info!("Starting Keydra - HashiCorp Vault Auto-Unsealer");

    let clients =
        vault::clients_from_config(&config.vault).context("failed to create Vault clients")?;
    let gate = PodReadinessGate::connect(&config.k8s)
        .await
        .context("failed to create Kubernetes client")?;

    let scheduler = Scheduler::new(
        clients,
        KeyShareSet::new(config.vault.keys.clone()),
        Arc::new(gate),
        config.app.check_interval,
    )?;

    let (trigger, shutdown) = shutdown_channel();

    let server = match config.metrics_addr()? {
        Some(addr) => {
            let listener = rest_api::bind(addr).await?;
            Some(tokio::spawn(rest_api::run_server(listener, shutdown.clone())))
        }
        None => None,
    };

    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    scheduler.run(shutdown).await;

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Metrics server failed: {}", e),
            Err(e) => error!("Metrics server task panicked: {}", e),
        }
    }

    info!("Keydra shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down gracefully"),
        Err(e) => {
            error!("Cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Seal status of one node as printed by `keydra status`
#[derive(Debug, Serialize)]
struct NodeStatus {
    node: String,
    sealed: Option<bool>,
    progress: Option<u32>,
    threshold: Option<u32>,
    error: Option<String>,
}

async fn collect_status(config: &Config) -> Result<Vec<NodeStatus>> {
    let clients = vault::clients_from_config(&config.vault)?;
    let probes = clients.iter().map(|client| probe_node(client.as_ref()));
    Ok(futures::future::join_all(probes).await)
}

async fn probe_node(client: &dyn VaultApi) -> NodeStatus {
    let node = client.endpoint().to_string();
    match probe_seal_status(client).await {
        Ok(status) => NodeStatus {
            node,
            sealed: Some(status.sealed),
            progress: Some(status.progress),
            threshold: Some(status.threshold),
            error: None,
        },
        Err(e) => NodeStatus {
            node,
            sealed: None,
            progress: None,
            threshold: None,
            error: Some(e.status_message()),
        },
    }
}

fn print_status(statuses: &[NodeStatus], output: &str) -> Result<()> {
    match output {
        "json" => println!("{}", format_status_json(statuses)?),
        "yaml" => println!("{}", format_status_yaml(statuses)?),
        _ => print!("{}", format_status_table(statuses)),
    }
    Ok(())
}

fn format_status_json(statuses: &[NodeStatus]) -> Result<String> {
    Ok(serde_json::to_string_pretty(statuses)?)
}

fn format_status_yaml(statuses: &[NodeStatus]) -> Result<String> {
    Ok(serde_yaml::to_string(statuses)?)
}

fn format_status_table(statuses: &[NodeStatus]) -> String {
    let mut out = format!("{:<45} {:<10} {:<10} {}\n", "NODE", "SEALED", "PROGRESS", "ERROR");
    out.push_str(&"-".repeat(80));
    out.push('\n');

    for status in statuses {
        let sealed = status
            .sealed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let progress = match (status.progress, status.threshold) {
            (Some(p), Some(t)) => format!("{}/{}", p, t),
            _ => "-".to_string(),
        };
        out.push_str(&format!(
            "{:<45} {:<10} {:<10} {}\n",
            status.node,
            sealed,
            progress,
            status.error.as_deref().unwrap_or("")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<NodeStatus> {
        vec![
            NodeStatus {
                node: "https://vault-0:8200".to_string(),
                sealed: Some(true),
                progress: Some(1),
                threshold: Some(3),
                error: None,
            },
            NodeStatus {
                node: "https://vault-1:8200".to_string(),
                sealed: None,
                progress: None,
                threshold: None,
                error: Some("HTTP request failed: connection refused".to_string()),
            },
        ]
    }

    #[test]
    fn test_format_status_table() {
        let table = format_status_table(&sample());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NODE"));
        assert!(lines[2].contains("1/3"));
        assert!(lines[3].contains("unknown"));
        assert!(lines[3].contains("connection refused"));
    }

    #[test]
    fn test_format_status_json() {
        let json = format_status_json(&sample()).unwrap();
        assert!(json.contains("\"node\": \"https://vault-0:8200\""));
        assert!(json.contains("\"sealed\": true"));
        assert!(json.contains("\"sealed\": null"));
    }

    #[test]
    fn test_format_status_yaml() {
        let yaml = format_status_yaml(&sample()).unwrap();
        assert!(yaml.contains("vault-0:8200"));
        assert!(yaml.contains("threshold: 3"));
    }

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["keydra"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let cli = Cli::try_parse_from(["keydra", "status", "-o", "json", "-c", "/tmp/k.yaml"])
            .unwrap();
        assert!(matches!(cli.command, Some(Commands::Status { ref output }) if output == "json"));
        assert_eq!(cli.config, PathBuf::from("/tmp/k.yaml"));
    }
}
