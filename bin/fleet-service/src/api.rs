//! Car endpoints with owner composition
//!
//! List endpoints enrich every car with its owner fetched through the
//! directory. Duplicate owner references collapse to one remote call, and a
//! missing or unreachable owner leaves the car's own fields intact with the
//! `owner` field unset.

use crate::store::{Car, CarDraft, CarStore, Owner};
use fabric_discovery::{CompositionClient, Fetched};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request, Response, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct AppContext {
    pub store: CarStore,
    pub composition: CompositionClient,
    pub owner_service: String,
}

impl AppContext {
    async fn fetch_owner(&self, owner_id: u64) -> Fetched<Owner> {
        self.composition
            .fetch(&self.owner_service, &format!("/owner/{}", owner_id))
            .await
    }

    /// One remote call per distinct owner id across the whole list.
    async fn fetch_owners(&self, cars: &[Car]) -> HashMap<u64, Fetched<Owner>> {
        let owner_ids: Vec<u64> = cars.iter().map(|c| c.owner_id).collect();
        self.composition
            .fetch_map(
                &self.owner_service,
                owner_ids,
                |id| format!("/owner/{}", id),
            )
            .await
    }
}

/// Attach fetched owners to their cars. Anything but a fetched entity leaves
/// `owner` unset; the car itself is always returned.
pub fn attach_owners(mut cars: Vec<Car>, owners: &HashMap<u64, Fetched<Owner>>) -> Vec<Car> {
    for car in &mut cars {
        car.owner = owners
            .get(&car.owner_id)
            .cloned()
            .and_then(Fetched::into_option);
    }
    cars
}

pub async fn handle<B>(req: Request<B>, ctx: Arc<AppContext>) -> Response<Full<Bytes>>
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

        ["cars"] if method == Method::GET => {
            let cars = ctx.store.list().await;
            let owners = ctx.fetch_owners(&cars).await;
            json_response(StatusCode::OK, json!(attach_owners(cars, &owners)))
        }

        ["car", id] if method == Method::GET => match parse_id(id) {
            Some(id) => match ctx.store.get(id).await {
                Some(mut car) => {
                    car.owner = ctx.fetch_owner(car.owner_id).await.into_option();
                    json_response(StatusCode::OK, json!(car))
                }
                None => not_found(),
            },
            None => bad_request("car id must be an integer"),
        },

        ["cars", "owner", owner_id] if method == Method::GET => match parse_id(owner_id) {
            Some(owner_id) => {
                let cars = ctx.store.list_by_owner(owner_id).await;
                // One owner for every row: fetch once, share the result.
                let owner = ctx.fetch_owner(owner_id).await;
                let owners = HashMap::from([(owner_id, owner)]);
                json_response(StatusCode::OK, json!(attach_owners(cars, &owners)))
            }
            None => bad_request("owner id must be an integer"),
        },

        ["car"] if method == Method::POST => match serde_json::from_slice::<CarDraft>(&body) {
            Ok(draft) => {
                let car = ctx.store.create(draft).await;
                json_response(StatusCode::CREATED, json!(car))
            }
            Err(e) => bad_request(&format!("malformed car body: {e}")),
        },

        ["car", id] if method == Method::PUT => {
            match (parse_id(id), serde_json::from_slice(&body)) {
                (Some(id), Ok(draft)) => match ctx.store.update(id, draft).await {
                    Some(car) => json_response(StatusCode::OK, json!(car)),
                    None => not_found(),
                },
                (None, _) => bad_request("car id must be an integer"),
                (_, Err(e)) => bad_request(&format!("malformed car body: {e}")),
            }
        }

        ["car", id] if method == Method::DELETE => match parse_id(id) {
            Some(id) => {
                if ctx.store.delete(id).await {
                    json_response(StatusCode::OK, json!({}))
                } else {
                    not_found()
                }
            }
            None => bad_request("car id must be an integer"),
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

    fn car(id: u64, owner_id: u64) -> Car {
        Car {
            id,
            make: "Toyota".to_string(),
            plate: "A-123-BC".to_string(),
            model: "Corolla".to_string(),
            owner_id,
            owner: None,
        }
    }

    fn owner(id: u64) -> Owner {
        Owner {
            id,
            name: "Ahmed Bennani".to_string(),
            age: 30.0,
        }
    }

    #[test]
    fn attach_owners_fills_only_fetched_references() {
        let cars = vec![car(1, 1), car(2, 2), car(3, 1)];
        let owners = HashMap::from([
            (1, Fetched::Ok(owner(1))),
            (2, Fetched::ReferenceMissing),
        ]);

        let enriched = attach_owners(cars, &owners);

        assert_eq!(enriched[0].owner.as_ref().unwrap().id, 1);
        assert!(enriched[1].owner.is_none());
        assert_eq!(enriched[2].owner.as_ref().unwrap().id, 1);
        // The car rows themselves survive a missing owner untouched.
        assert_eq!(enriched[1].plate, "A-123-BC");
    }

    #[test]
    fn attach_owners_treats_unavailable_like_unset() {
        let cars = vec![car(1, 9)];
        let owners = HashMap::from([(9, Fetched::<Owner>::Unavailable)]);
        let enriched = attach_owners(cars, &owners);
        assert!(enriched[0].owner.is_none());
        assert_eq!(enriched[0].owner_id, 9);
    }
}
