//! Owner CRUD endpoints

use crate::store::{OwnerDraft, OwnerStore};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub async fn handle<B>(req: Request<B>, store: Arc<OwnerStore>) -> Response<Full<Bytes>>
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
            return bad_request("unreadable request body");
        }
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["healthz"] if method == Method::GET => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("OK\n")))
            .unwrap(),

        ["owners"] if method == Method::GET => {
            json_response(StatusCode::OK, json!(store.list().await))
        }

        ["owner", id] if method == Method::GET => match parse_id(id) {
            Some(id) => match store.get(id).await {
                Some(owner) => json_response(StatusCode::OK, json!(owner)),
                None => not_found(),
            },
            None => bad_request("owner id must be an integer"),
        },

        ["owner"] if method == Method::POST => {
            match serde_json::from_slice::<OwnerDraft>(&body) {
                Ok(draft) => {
                    let owner = store.create(draft).await;
                    json_response(StatusCode::CREATED, json!(owner))
                }
                Err(e) => bad_request(&format!("malformed owner body: {e}")),
            }
        }

        ["owner", id] if method == Method::PUT => {
            match (parse_id(id), serde_json::from_slice(&body)) {
                (Some(id), Ok(draft)) => match store.update(id, draft).await {
                    Some(owner) => json_response(StatusCode::OK, json!(owner)),
                    None => not_found(),
                },
                (None, _) => bad_request("owner id must be an integer"),
                (_, Err(e)) => bad_request(&format!("malformed owner body: {e}")),
            }
        }

        ["owner", id] if method == Method::DELETE => match parse_id(id) {
            Some(id) => {
                if store.delete(id).await {
                    json_response(StatusCode::OK, json!({}))
                } else {
                    not_found()
                }
            }
            None => bad_request("owner id must be an integer"),
        },

        _ => not_found(),
    }
}

fn parse_id(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        json!({ "error": "validation", "message": message }),
    )
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, json!({ "error": "not_found" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, path: &str, body: serde_json::Value) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn empty_request(method: Method, path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = Arc::new(OwnerStore::new());

        let created = handle(
            request(
                Method::POST,
                "/owner",
                json!({ "name": "Ada", "age": 36.0 }),
            ),
            store.clone(),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = body_json(created).await;
        let id = created["id"].as_u64().unwrap();

        let fetched = handle(
            empty_request(Method::GET, &format!("/owner/{id}")),
            store.clone(),
        )
        .await;
        assert_eq!(body_json(fetched).await["name"], "Ada");

        let updated = handle(
            request(
                Method::PUT,
                &format!("/owner/{id}"),
                json!({ "name": "Ada L.", "age": 37.0 }),
            ),
            store.clone(),
        )
        .await;
        assert_eq!(body_json(updated).await["name"], "Ada L.");

        let deleted = handle(
            empty_request(Method::DELETE, &format!("/owner/{id}")),
            store.clone(),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let gone = handle(empty_request(Method::GET, &format!("/owner/{id}")), store).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_owner_is_404() {
        let store = Arc::new(OwnerStore::new());
        let response = handle(empty_request(Method::GET, "/owner/99"), store).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let store = Arc::new(OwnerStore::new());
        let response = handle(
            request(Method::POST, "/owner", json!({ "name": "Ada" })),
            store,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
