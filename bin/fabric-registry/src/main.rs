use anyhow::Result;
use fabric_core::{FabricConfig, Registry, SystemClock};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::tokio::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::fmt::init as tracing_init;

mod api;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting fabric-registry...");

    let config = FabricConfig::from_env()?;
    let registry = Arc::new(Registry::new(
        config.lease_duration_ms(),
        Arc::new(SystemClock),
    ));
    let _sweeper = registry.spawn_eviction(config.eviction_sweep_interval);
    info!(
        "lease duration {:?}, eviction sweep every {:?}",
        config.lease_duration, config.eviction_sweep_interval
    );

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8761".to_string())
        .parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("registry listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let registry = registry.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let registry = registry.clone();
                async move { Ok::<_, std::convert::Infallible>(api::handle(req, registry).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}
