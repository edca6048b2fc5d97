mod config;
mod lifecycle;
mod metrics;
mod models;
mod mqtt;
mod pipeline;
mod utils;

use log::{error, info};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::net::TcpListener;

use config::ExporterConfig;
use lifecycle::{join_within, supervise, Shutdown};
use metrics::{server, Gauges, Publisher};
use mqtt::Ingestor;
use pipeline::Handoff;
use utils::log_timestamp;

async fn run(config: ExporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();

    // Metrics live in an explicit registry served over HTTP
    let registry = Arc::new(Registry::new());
    let gauges = Gauges::register(&registry)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind metrics endpoint {}: {}", addr, e))?;
    let server = {
        let shutdown = shutdown.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let served = server::serve(listener, registry, shutdown.clone()).await;
            if let Err(e) = &served {
                error!("Metrics server failed: {}", e);
                shutdown.trigger();
            }
            served
        })
    };

    // Handle Ctrl+C gracefully
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Program terminated by user");
                    shutdown.trigger();
                }
                // Keep running; shutdown then only comes from a failing task
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    let handoff = Arc::new(Handoff::new());

    let ingest = mqtt::client::run(
        config.mqtt.clone(),
        Ingestor::new(Arc::clone(&handoff)),
        shutdown.clone(),
    );
    let publish = {
        let publisher = Publisher::new(gauges);
        let shutdown = shutdown.clone();
        async move { publisher.run(&handoff, &shutdown).await }
    };

    let result = supervise(ingest, publish, shutdown.clone(), config.shutdown_grace).await;

    shutdown.trigger();
    let served = join_within("metrics server", server, config.shutdown_grace).await;

    result?;
    served.map_err(Into::into)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match ExporterConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting Paxcounter exporter at {}",
        log_timestamp(&OffsetDateTime::now_utc())
    );

    match run(config).await {
        Ok(()) => info!(
            "Exporter stopped at {}",
            log_timestamp(&OffsetDateTime::now_utc())
        ),
        Err(e) => {
            error!("Fatal error: {}", e);
            std::process::exit(1);
        }
    }
}
