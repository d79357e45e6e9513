//! REST surface of the registry
//!
//! POST   /registry/{service}/{instance}         register, 201 with leaseId
//! PUT    /registry/{service}/{instance}/renew   heartbeat, 200 or 404
//! PUT    /registry/{service}/{instance}/status  status update, 200 or 404
//! DELETE /registry/{service}/{instance}         deregister, 200 always
//! GET    /registry/{service}                    visible instances, [] if none

use fabric_core::{FabricError, InstanceStatus, Registry, RenewOutcome};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

#[derive(Deserialize)]
struct RegisterBody {
    host: String,
    port: u16,
}

#[derive(Deserialize)]
struct StatusBody {
    status: InstanceStatus,
}

pub async fn handle<B>(req: Request<B>, registry: Arc<Registry>) -> Response<Full<Bytes>>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("unreadable request body: {}", e);
            return validation_error("unreadable request body");
        }
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["healthz"] if method == Method::GET => text_ok("OK\n"),

        ["registry", service] if method == Method::GET => {
            let records: Vec<_> = registry
                .lookup(service)
                .await
                .iter()
                .map(|i| i.record())
                .collect();
            json_response(StatusCode::OK, json!(records))
        }

        ["registry", service, instance] if method == Method::POST => {
            let parsed: RegisterBody = match serde_json::from_slice(&body) {
                Ok(parsed) => parsed,
                Err(e) => return validation_error(&format!("malformed registration body: {e}")),
            };
            match registry
                .register(service, instance, &parsed.host, parsed.port)
                .await
            {
                Ok(lease_id) => json_response(
                    StatusCode::CREATED,
                    json!({ "leaseId": lease_id.to_string() }),
                ),
                Err(FabricError::Validation(message)) => validation_error(&message),
                Err(e) => json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal", "message": e.to_string() }),
                ),
            }
        }

        ["registry", service, instance, "renew"] if method == Method::PUT => {
            match registry.renew(service, instance).await {
                RenewOutcome::Renewed => json_response(StatusCode::OK, json!({})),
                RenewOutcome::NotFound => lease_not_found(),
            }
        }

        ["registry", service, instance, "status"] if method == Method::PUT => {
            let parsed: StatusBody = match serde_json::from_slice(&body) {
                Ok(parsed) => parsed,
                Err(e) => return validation_error(&format!("malformed status body: {e}")),
            };
            if registry.set_status(service, instance, parsed.status).await {
                json_response(StatusCode::OK, json!({}))
            } else {
                lease_not_found()
            }
        }

        ["registry", service, instance] if method == Method::DELETE => {
            registry.deregister(service, instance).await;
            json_response(StatusCode::OK, json!({}))
        }

        _ => json_response(StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
    }
}

fn text_ok(body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn validation_error(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        json!({ "error": "validation", "message": message }),
    )
}

fn lease_not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        json!({ "error": "lease_not_found" }),
    )
}
