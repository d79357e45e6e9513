//! Name-prefixed routing through the directory
//!
//! Request lifecycle: received -> resolving -> forwarding -> completed or
//! failed. Failures collapse onto the gateway's two outward outcomes:
//! 503 when resolution produced nothing routable (the instance set will not
//! change by retrying), 502 when every transport attempt against the
//! resolved set failed. Delivered downstream responses pass through
//! unmodified, whatever their status.

use crate::forwarder::RequestForwarder;
use fabric_core::{InstanceRecord, RoundRobin};
use fabric_discovery::Resolve;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct GatewayRouter {
    resolver: Arc<dyn Resolve>,
    balancer: RoundRobin,
    forwarder: RequestForwarder,
    max_retries: u32,
}

impl GatewayRouter {
    pub fn new(resolver: Arc<dyn Resolve>, forwarder: RequestForwarder, max_retries: u32) -> Self {
        Self {
            resolver,
            balancer: RoundRobin::new(),
            forwarder,
            max_retries,
        }
    }

    /// Route one inbound request: `/{service}/rest` resolves `service`
    /// through the directory and forwards the rest downstream.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let Some((service, downstream_path)) = split_target(&path_and_query) else {
            return error_response(StatusCode::NOT_FOUND, json!({ "error": "no_route" }));
        };
        let service = service.to_string();

        // Resolve once per request. A registry that cannot answer is the
        // same outcome as an empty instance set.
        let instances = match self.resolver.resolve(&service).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!("lookup of {} failed: {}", service, e);
                Vec::new()
            }
        };

        let headers = req.headers().clone();
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!("inbound body error: {}", e);
                return error_response(StatusCode::BAD_REQUEST, json!({ "error": "bad_request" }));
            }
        };

        let mut tried: Vec<String> = Vec::new();
        let mut failures = 0u32;
        loop {
            let candidates: Vec<InstanceRecord> = instances
                .iter()
                .filter(|i| !tried.contains(&i.instance_id))
                .cloned()
                .collect();

            let Some(instance) = self.balancer.select(&service, &candidates) else {
                // Nothing (left) to try: unavailable if nothing was ever
                // reachable for this name, upstream error if instances were
                // tried and all failed at the transport level.
                return if tried.is_empty() {
                    debug!("no routable instance of {}", service);
                    service_unavailable(&service)
                } else {
                    warn!(
                        "exhausted {} instance(s) of {} after transport failures",
                        tried.len(),
                        service
                    );
                    upstream_error()
                };
            };

            let target = format!("{}{}", instance.base_url(), downstream_path);
            match self
                .forwarder
                .forward(&target, method.clone(), &headers, body.clone())
                .await
            {
                Ok(response) => {
                    let (parts, bytes) = response.into_parts();
                    return Response::from_parts(parts, Full::new(bytes));
                }
                Err(e) => {
                    warn!(
                        "attempt against {}/{} failed: {}",
                        service, instance.instance_id, e
                    );
                    tried.push(instance.instance_id);
                    failures += 1;
                    if failures > self.max_retries {
                        return upstream_error();
                    }
                }
            }
        }
    }
}

/// Route prefix split: `/car-svc/cars/3` -> `("car-svc", "/cars/3")`. A bare
/// `/car-svc` forwards as the downstream root.
pub fn split_target(path_and_query: &str) -> Option<(&str, String)> {
    let trimmed = path_and_query.strip_prefix('/')?;
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once('/') {
        Some((service, rest)) => Some((service, format!("/{}", rest))),
        None => Some((trimmed, "/".to_string())),
    }
}

fn service_unavailable(service: &str) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": "service_unavailable", "service": service }),
    )
}

fn upstream_error() -> Response<Full<Bytes>> {
    error_response(StatusCode::BAD_GATEWAY, json!({ "error": "upstream_error" }))
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
