use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod normalize;
mod query;
mod service;
mod store;

use cache::{CacheBackend, MemoryBackend, ReadThroughCache, RedisBackend};
use config::Config;
use service::PriceHistory;
use store::InfluxStore;

#[derive(Parser, Debug)]
#[clap(about = "Chronoprice - cached price history over InfluxDB")]
struct Args {
    #[clap(short, long, default_value = "false")]
    debug: bool,

    /// Overrides the configured listen port.
    #[clap(short, long)]
    port: Option<u16>,

    /// TOML configuration file.
    #[clap(short, long, env = "CHRONOPRICE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let backend: Arc<dyn CacheBackend> = match config.redis_url.as_deref() {
        Some(url) => {
            info!("Using shared Redis cache");
            Arc::new(RedisBackend::connect(url).await?)
        }
        None => {
            warn!("REDIS_URL not set, caching in-process");
            Arc::new(MemoryBackend::new(config.cache_capacity, config.cache_ttl()))
        }
    };
    let cache = ReadThroughCache::new(backend, config.cache_ttl());
    let store = Arc::new(InfluxStore::new(&config)?);
    let history = PriceHistory::new(store, cache, &config);

    let app = handlers::router(history);

    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.listen_port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("🚀 Chronoprice listening on {} (bucket {})", addr, config.influx_bucket);

    axum::serve(listener, app).await?;
    Ok(())
}
