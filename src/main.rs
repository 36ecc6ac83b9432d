use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, routing::any, Router};
use clap::{Parser, ValueEnum};

use polyserve::config::{load_config, ServerConfig};
use polyserve::lifecycle::{self, signals, Shutdown};
use polyserve::observability::{logging, metrics};
use polyserve::services::{self, DiscardDatagrams};

#[derive(Parser)]
#[command(name = "polyserve")]
#[command(about = "Bind HTTP, HTTPS and HTTP/3 services and serve an echo application", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `observability.log_level`
    #[arg(short, long)]
    log_level: Option<String>,

    /// Format of the startup report
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("polyserve: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "polyserve starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let shutdown = Shutdown::new();
    let coordinator = services::standard(echo_app(), Arc::new(DiscardDatagrams::default()));

    let server = match lifecycle::start(Arc::new(config), &coordinator, shutdown).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Binding aborted");
            return ExitCode::FAILURE;
        }
    };

    print_report(server.services(), cli.report);
    if !server.is_serving() {
        tracing::error!("No service bound");
        return ExitCode::FAILURE;
    }

    signals::termination().await;
    server.shutdown(grace).await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Echoes request bodies back; every body passes through a content stream.
fn echo_app() -> Router {
    Router::new()
        .route("/", any(|body: Body| async move { body }))
        .route("/{*path}", any(|body: Body| async move { body }))
}

fn print_report(services: &[polyserve::Service], format: ReportFormat) {
    match format {
        ReportFormat::Text => {
            for service in services {
                println!("{service}");
            }
        }
        ReportFormat::Json => {
            let reports: Vec<_> = services.iter().map(|s| s.report()).collect();
            match serde_json::to_string_pretty(&reports) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Failed to render report"),
            }
        }
    }
}
