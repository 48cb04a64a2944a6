//! SMSGuard CLI
//!
//! Annotates and filters SMS-like messages from the command line.
//!
//! Messages are taken from the positional argument or, when it is absent,
//! one per line from stdin. Every result is written to stdout as one JSON
//! document per line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use smsguard_annotators::{
    build_registry_from_config, Connectivity, Environment, MessageFilter, ModelLifecycle,
    Orchestrator, PreferencesStore, RegistrySnapshot, ToxicityScorer,
};
use smsguard_core::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod config;

#[derive(Parser, Debug)]
#[command(name = "smsguard")]
#[command(about = "SMS entity annotation and filtering", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "smsguard.yaml", env = "SMSGUARD_CONFIG")]
    config: String,

    /// Provider mode: auto, off, or a source id
    #[arg(short, long, env = "SMSGUARD_MODE")]
    mode: Option<String>,

    /// Per-provider timeout in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Run all selected providers concurrently and merge their results
    #[arg(long)]
    tiered: bool,

    /// Remote annotation endpoint (enables the cloud source)
    #[arg(long, env = "SMSGUARD_CLOUD_ENDPOINT")]
    cloud_endpoint: Option<String>,

    /// Treat the network as unavailable
    #[arg(long)]
    offline: bool,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect entities and print the annotation result
    Annotate {
        /// Message text (reads stdin lines when omitted)
        text: Option<String>,
    },

    /// Annotate, score toxicity, and print a verdict with redacted text
    Filter {
        /// Message text (reads stdin lines when omitted)
        text: Option<String>,
    },

    /// Show registered sources and their readiness
    Status,
}

/// One source in the status report
#[derive(Serialize)]
struct SourceStatus {
    #[serde(flatten)]
    snapshot: RegistrySnapshot,
    readiness: String,
}

#[derive(Serialize)]
struct StatusReport {
    mode: String,
    network_available: bool,
    wifi_only_download: bool,
    model_size_bytes: u64,
    sources: Vec<SourceStatus>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let metrics_handle = if cli.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    let config = config::load(&cli.config, &cli)?;
    debug!(
        execution = ?config.execution,
        timeout_ms = config.timeout_ms,
        "configuration loaded"
    );

    let environment = Arc::new(Environment::from_config(
        &config.environment_config(),
        config.mode.clone(),
    ));
    let registry = Arc::new(
        build_registry_from_config(&config, None).context("Failed to build provider registry")?,
    );
    let orchestrator = Arc::new(Orchestrator::from_environment(
        &config,
        registry,
        Arc::clone(&environment),
    ));
    info!(mode = %environment.selected_mode(), "SMSGuard ready");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupt received, cancelling in-flight request");
        trigger.cancel();
    });

    match cli.command {
        Command::Annotate { text } => {
            for message in messages(text).await? {
                let result = orchestrator.resolve_cancellable(&message, &cancel).await;
                match unless_cancelled(result)? {
                    Some(result) => print_json(&result)?,
                    None => break,
                }
            }
        }
        Command::Filter { text } => {
            let filter = MessageFilter::new(
                Arc::clone(&orchestrator),
                ToxicityScorer::new()?,
                config.filter.clone(),
            );
            for message in messages(text).await? {
                let verdict = filter.check_cancellable(&message, &cancel).await;
                match unless_cancelled(verdict)? {
                    Some(verdict) => print_json(&verdict)?,
                    None => break,
                }
            }
        }
        Command::Status => {
            print_json(&status_report(&orchestrator, &environment))?;
        }
    }

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(())
}

/// Messages from the argument, or one per non-empty stdin line
async fn messages(text: Option<String>) -> Result<Vec<String>> {
    if let Some(text) = text {
        return Ok(vec![text]);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            messages.push(line);
        }
    }
    Ok(messages)
}

fn status_report(orchestrator: &Orchestrator, environment: &Environment) -> StatusReport {
    let policy = orchestrator.policy();
    let sources = policy
        .registry()
        .snapshot()
        .into_iter()
        .map(|snapshot| {
            let readiness = policy
                .readiness(&snapshot.descriptor.source_id)
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            SourceStatus {
                snapshot,
                readiness,
            }
        })
        .collect();

    StatusReport {
        mode: environment.selected_mode().to_string(),
        network_available: environment.is_network_available(),
        wifi_only_download: environment.wifi_only_download(),
        model_size_bytes: environment.model_size_bytes(),
        sources,
    }
}

/// `None` once the run was interrupted; remaining messages are skipped
fn unless_cancelled<T>(result: smsguard_core::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Cancelled) => {
            info!("Request cancelled, stopping");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging. Logs go to stderr so stdout stays JSON.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("smsguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smsguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Install the Prometheus recorder and return a handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "smsguard_requests_total",
        "Annotation requests by outcome"
    );
    metrics::describe_counter!(
        "smsguard_provider_failures_total",
        "Failed provider attempts by source and kind"
    );
    metrics::describe_histogram!(
        "smsguard_provider_latency_us",
        metrics::Unit::Microseconds,
        "Provider call latency in microseconds by source"
    );

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_stops_cleanly() {
        assert_eq!(unless_cancelled(Ok(7)).unwrap(), Some(7));
        assert_eq!(unless_cancelled::<u32>(Err(Error::Cancelled)).unwrap(), None);
    }

    #[test]
    fn test_status_reports_environment() {
        let config = smsguard_annotators::AnnotatorConfig::default();
        let environment = Arc::new(Environment::from_config(
            &config.environment_config(),
            config.mode.clone(),
        ));
        environment.set_wifi_only_download(false);
        let registry = Arc::new(build_registry_from_config(&config, None).unwrap());
        let orchestrator =
            Orchestrator::from_environment(&config, registry, Arc::clone(&environment));

        let report = serde_json::to_value(status_report(&orchestrator, &environment)).unwrap();

        assert_eq!(report["mode"], "auto");
        assert_eq!(report["wifi_only_download"], false);
        assert!(!report["sources"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_other_errors_propagate() {
        let err = unless_cancelled::<u32>(Err(Error::config("bad mode"))).unwrap_err();
        assert!(err.to_string().contains("bad mode"));
    }
}
