use anyhow::Result;
use fabric_core::FabricConfig;
use fabric_discovery::RegistryClient;
use fabric_proxy::router::split_target;
use fabric_proxy::{GatewayMetrics, GatewayRouter, RequestForwarder};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::fmt::init as tracing_init;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting fabric-gateway...");

    let config = FabricConfig::from_env()?;
    let registry_url = std::env::var("FABRIC_REGISTRY_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8761".to_string());
    let resolver = Arc::new(RegistryClient::new(
        registry_url.clone(),
        config.downstream_timeout,
    )?);
    info!("resolving through registry at {}", registry_url);

    let router = Arc::new(GatewayRouter::new(
        resolver,
        RequestForwarder::new(config.downstream_timeout),
        config.max_retries,
    ));
    info!(
        "downstream timeout {:?}, retry budget {}",
        config.downstream_timeout, config.max_retries
    );

    let metrics = Arc::new(GatewayMetrics::new()?);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = router.clone();
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let router = router.clone();
                let metrics = metrics.clone();
                async move {
                    Ok::<_, std::convert::Infallible>(handle_request(req, router, metrics).await)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    router: Arc<GatewayRouter>,
    metrics: Arc<GatewayMetrics>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path == "/healthz" {
        return Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("OK\n")))
            .unwrap();
    }

    if path == "/metrics" && method == hyper::Method::GET {
        let text = metrics
            .gather()
            .unwrap_or_else(|_| "failed to gather metrics\n".to_string());
        return Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(text)))
            .unwrap();
    }

    let service = split_target(&path)
        .map(|(service, _)| service.to_string())
        .unwrap_or_default();
    metrics.record_request(method.as_str(), &service);

    let start = Instant::now();
    let response = router.handle(req).await;
    metrics.record_response(
        response.status().as_u16(),
        &service,
        start.elapsed().as_secs_f64(),
    );
    response
}
