use anyhow::{Context, Result};
use clap::Parser;
use fleettrack_api::{Gateway, GatewayConfig};
use fleettrack_core::config::{AppConfig, BackendKind, LogFormat};
use fleettrack_pipeline::{
    BatcherConfig, BroadcastRouter, ConnectionRegistry, DeliveryResolver, PositionCache,
    ResolverConfig, TrackingPipeline, WriteBehindBatcher,
};
use fleettrack_store::{
    DeliverySource, LocationStore, MemoryDeliverySource, MemoryLocationStore, RestDeliverySource,
    RestLocationStore,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// FleetTrack - real-time courier position tracking gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override simulator shared secret
    #[arg(long, env = "FLEETTRACK_SIMULATOR_SECRET")]
    simulator_secret: Option<String>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn build_location_store(config: &AppConfig) -> Result<Arc<dyn LocationStore>> {
    Ok(match config.storage.backend {
        BackendKind::Memory => Arc::new(MemoryLocationStore::new()),
        BackendKind::Rest => {
            let base_url = config
                .storage
                .base_url
                .as_deref()
                .context("storage.base_url is required for the rest backend")?;
            Arc::new(
                RestLocationStore::new(base_url, config.storage.request_timeout())
                    .context("failed to build location store client")?,
            )
        }
    })
}

fn build_delivery_source(config: &AppConfig) -> Result<Arc<dyn DeliverySource>> {
    Ok(match config.delivery.backend {
        BackendKind::Memory => Arc::new(MemoryDeliverySource::new()),
        BackendKind::Rest => {
            let base_url = config
                .delivery
                .base_url
                .as_deref()
                .context("delivery.base_url is required for the rest backend")?;
            Arc::new(
                RestDeliverySource::new(base_url, config.delivery.request_timeout())
                    .context("failed to build order service client")?,
            )
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())
        .with_context(|| format!("failed to load configuration ({:?})", args.config))?;
    if let Some(secret) = args.simulator_secret {
        config.tracking.simulator_secret = Some(secret);
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config);
    info!(
        environment = %config.app.environment,
        config = ?args.config,
        "starting fleettrack"
    );

    // External collaborators.
    let store = build_location_store(&config)?;
    let deliveries = build_delivery_source(&config)?;

    // The tracking pipeline and its components.
    let tracking = &config.tracking;
    let cache = Arc::new(PositionCache::new(tracking.cache_ttl()));
    let batcher = Arc::new(WriteBehindBatcher::new(
        Arc::clone(&store),
        BatcherConfig {
            batch_size: tracking.batch_size,
            flush_interval: tracking.flush_interval(),
            flush_timeout: tracking.flush_timeout(),
            max_buffered: tracking.max_buffered,
        },
    ));
    let resolver = Arc::new(DeliveryResolver::new(
        Arc::clone(&deliveries),
        ResolverConfig {
            assignment_ttl: tracking.assignment_ttl(),
            negative_ttl: tracking.negative_assignment_ttl(),
            lookup_timeout: tracking.lookup_timeout(),
        },
    ));
    let router = Arc::new(BroadcastRouter::new());
    let pipeline = Arc::new(TrackingPipeline::new(cache, batcher, resolver, router));
    let registry = Arc::new(ConnectionRegistry::new(tracking.max_connections));

    // The gateway in front of it.
    let bind_addr = match args.bind {
        Some(addr) => addr,
        None => config
            .api
            .bind_address()
            .parse()
            .context("invalid api bind address")?,
    };
    let gateway = Gateway::new(
        GatewayConfig {
            bind_addr,
            cors: config.api.cors,
            idle_timeout: tracking.idle_timeout(),
            idle_reap_interval: tracking.idle_reap_interval(),
            cache_sweep_interval: tracking.cache_sweep_interval(),
            simulator_secret: tracking.simulator_secret.clone(),
        },
        pipeline,
        registry,
        store,
        deliveries,
    );

    // Ctrl-C triggers the graceful path: stop accepting, final flush, exit.
    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    gateway.run().await
}
