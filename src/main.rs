//! Composition root: wires config, C3 (pool manager) -> C2 (pools) -> C1 (connections), C4
//! (store), C5 (pipeline), C6 (status reporter, invoked from the monitor loop), and the REST
//! stub, then runs until Ctrl-C/SIGTERM (spec.md §6/§9). Deliberately thin — every piece of
//! actual logic lives in its own module and is unit-tested there.

use clap::Parser;
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use venue_sync::config::{Config, CATALOG};
use venue_sync::pipeline::{Consumer, FinalRecord, Pipeline};
use venue_sync::pool_manager::PoolManager;
use venue_sync::rest;
use venue_sync::shutdown::{shutdown_channel, ShutdownListener};
use venue_sync::store::Store;
use venue_sync::symbol::CanonicalSymbol;
use venue_sync::transport::TungsteniteTransport;
use venue_sync::venue::Venue;

#[derive(Parser, Debug)]
#[command(name = "venue-sync", about = "Cross-venue perpetual-futures market-data aggregator")]
struct Cli {
    /// Optional .env file to load before reading process environment.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Overrides the PORT environment variable.
    #[arg(long)]
    port: Option<u16>,
}

/// Development-default [`Consumer`]: logs every final record at debug level. A real
/// deployment would inject its own (eg/ a websocket fan-out to the REST layer's consumers) at
/// this same seam.
struct LoggingConsumer;

#[async_trait::async_trait]
impl Consumer for LoggingConsumer {
    async fn on_final_record(&self, record: FinalRecord) {
        tracing::debug!(symbol = %record.symbol, okx_price = ?record.okx_price, binance_price = ?record.binance_price, basis = ?record.price_basis, "final record");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        let _ = dotenvy::from_path(path);
    } else {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    match run(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "fatal error before composition root was fully wired");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(port = config.port, "starting venue-sync");

    let consumer = Arc::new(LoggingConsumer);
    let pipeline = Arc::new(Pipeline::new(consumer));
    let store = Arc::new(Store::new(pipeline));
    let transport = Arc::new(TungsteniteTransport);

    let symbols: Vec<CanonicalSymbol> = config.symbols.iter().map(|s| CanonicalSymbol::from(s.as_str())).collect();
    let symbols_by_venue: HashMap<Venue, Vec<CanonicalSymbol>> =
        Venue::ALL.into_iter().map(|v| (v, symbols.clone())).collect();

    let mut pool_manager = PoolManager::new(store.clone(), transport);
    pool_manager.start(CATALOG, &symbols_by_venue).await;

    let (mut notifier, listener) = shutdown_channel();
    tokio::spawn(async move {
        wait_for_signal().await;
        notifier.send();
    });

    let router = rest::router(&config, store.clone());
    let tcp_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(addr = %tcp_listener.local_addr()?, "REST stub listening");

    let server = axum::serve(tcp_listener, router).with_graceful_shutdown(wait_for_shutdown(listener));
    if let Err(err) = server.await {
        error!(%err, "REST server exited with error");
    }

    pool_manager.shutdown().await;
    Ok(())
}

/// Waits for Ctrl-C or, on unix, SIGTERM — whichever arrives first (spec.md §6's "exit 0 on
/// graceful shutdown").
async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn wait_for_shutdown(mut listener: ShutdownListener) {
    listener.recv().await;
}
