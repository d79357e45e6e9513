use anyhow::Result;
use fabric_core::FabricConfig;
use fabric_discovery::{Announcement, HeartbeatAgent, RegistryClient};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::tokio::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::fmt::init as tracing_init;

mod api;
mod store;

use store::OwnerStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting owner-service...");

    let config = FabricConfig::from_env()?;
    let addr: SocketAddr = env_or("BIND_ADDR", "0.0.0.0:8088").parse()?;
    let service_name = env_or("SERVICE_NAME", "OWNER-SVC");
    let instance_id = env_or("INSTANCE_ID", "owner-1");
    let advertise_host = env_or("ADVERTISE_HOST", "127.0.0.1");

    let store = Arc::new(OwnerStore::seeded().await);
    info!("seeded {} demo owners", store.list().await.len());

    let listener = TcpListener::bind(&addr).await?;
    info!("owner-service listening on {}", addr);

    let registry_client = Arc::new(RegistryClient::new(
        env_or("FABRIC_REGISTRY_URL", "http://127.0.0.1:8761"),
        config.downstream_timeout,
    )?);
    let agent = HeartbeatAgent::start(
        registry_client,
        Announcement {
            service_name: service_name.clone(),
            instance_id,
            host: advertise_host,
            port: addr.port(),
        },
        config.heartbeat_interval,
    );
    info!("announced as {} to the directory", service_name);

    let server = tokio::task::spawn(async move {
        loop {
            let Ok((stream, peer_addr)) = listener.accept().await else {
                break;
            };
            let io = TokioIo::new(stream);
            let store = store.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let store = store.clone();
                    async move { Ok::<_, std::convert::Infallible>(api::handle(req, store).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down, draining from the directory");
    agent.shutdown().await;
    server.abort();
    Ok(())
}
