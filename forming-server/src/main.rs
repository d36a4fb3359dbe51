use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use forming_server::{
    AppState,
    aggregate::Aggregator,
    api,
    config::{Config, RegistryConfig},
    ingest::{IngestCoordinator, run_ingest_loop},
    mqtt::run_subscriber,
    query::QueryService,
    registry::{RecordRegistry, memory::InMemoryRecordRegistry, sqlite::SqliteRecordRegistry},
    reporting::{self, ReportingSink},
};
use jiff::tz::TimeZone;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "forming-server")]
#[command(about = "Forming line telemetry ingestion and query server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "forming.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,forming_server=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let tz = config.query.time_zone()?;
    let reporter = reporting::connect(config.reporting.as_ref()).await;

    match &config.registry {
        RegistryConfig::Memory => {
            info!("Using in-memory registry");
            run_server(Some(InMemoryRecordRegistry::new()), config, tz, reporter).await?;
        }
        RegistryConfig::Sqlite {
            path,
            acquire_timeout_secs,
        } => {
            info!(path = ?path, "Using SQLite registry");
            let timeout = Duration::from_secs(*acquire_timeout_secs);
            let registry = match SqliteRecordRegistry::new(path, timeout).await {
                Ok(registry) => Some(registry),
                Err(e) => {
                    warn!(error = ?e, "Store unreachable, running without storage");
                    None
                }
            };
            run_server(registry, config, tz, reporter).await?;
        }
    }

    Ok(())
}

async fn run_server<R>(
    registry: Option<R>,
    config: Config,
    tz: TimeZone,
    reporter: Arc<dyn ReportingSink>,
) -> color_eyre::Result<()>
where
    R: RecordRegistry,
{
    let cancel = CancellationToken::new();

    let coordinator = IngestCoordinator::new(registry.clone(), reporter, config.report_timeout());

    let (tx, rx) = mpsc::channel(config.mqtt.channel_capacity);

    let cancel_for_ingest = cancel.clone();
    let ingest_handle = tokio::spawn(async move {
        run_ingest_loop(rx, coordinator, cancel_for_ingest).await;
    });

    let cancel_for_mqtt = cancel.clone();
    let mqtt_config = config.mqtt.clone();
    let subscriber_handle = tokio::spawn(async move {
        run_subscriber(mqtt_config, tx, cancel_for_mqtt).await;
    });

    let state = AppState {
        query: QueryService::new(registry.clone(), config.query.clone(), tz),
        aggregator: Aggregator::new(registry),
    };
    let axum_app = api::router().with_state(state);

    let http_addr = config.server.http_addr;
    let axum_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();
    tokio::select! {
        result = axum::serve(axum_listener, axum_app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
            cancel.cancel();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    let _ = subscriber_handle.await;
    let _ = ingest_handle.await;

    info!("forming-server shut down complete");
    Ok(())
}
