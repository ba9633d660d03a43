#![forbid(unsafe_code)]

use admission_gate_lib::admission::{AdmissionManager, PolicyRegistry};
use admission_gate_lib::config::load_from_path;
use admission_gate_lib::gate::{self, GateState};
use admission_gate_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fixed-window admission gate for HTTP APIs")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "ADMISSION_GATE_CONFIG",
        default_value = "config/gate.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(
        &cfg.logging.level,
        cfg.logging.show_target,
        &cfg.telemetry.otel_log_level,
    ) {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(
        ?cfg.listen,
        policies = cfg.policies.len(),
        role_policies = cfg.role_policies.len(),
        routes = cfg.routes.len(),
        "configuration loaded"
    );

    let registry = match PolicyRegistry::from_config(&cfg.policies, &cfg.role_policies) {
        Ok(registry) => registry,
        Err(err) => {
            error!(%err, "invalid admission policies");
            std::process::exit(1);
        }
    };

    let (metrics, prometheus_registry) = match init_metrics() {
        Ok(pair) => pair,
        Err(err) => {
            error!(%err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let manager =
        Arc::new(AdmissionManager::new(registry, &cfg.admission).with_metrics(metrics.clone()));
    manager.start_sweeper(Duration::from_millis(cfg.admission.sweep_interval_ms));

    let shutdown = CancellationToken::new();

    if let Some(port) = cfg.telemetry.metrics_port {
        let manager = manager.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) =
                start_observability_server(port, prometheus_registry, manager, token).await
            {
                error!(%err, "observability server exited with error");
            }
        });
    }

    let state = Arc::new(GateState::new(Arc::new(cfg), manager).with_metrics(metrics));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = gate::shutdown_signal().await {
            warn!(%err, "signal handling unavailable, stopping");
        }
        signal_token.cancel();
    });

    let result = gate::run(state, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(err) = result {
        error!(%err, "admission gate exited with error");
        std::process::exit(1);
    }
}
