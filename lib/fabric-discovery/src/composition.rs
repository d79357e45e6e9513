//! Remote composition: enrich local entities from another service
//!
//! A direct caller resolves the target through the same registry + balancer
//! path the gateway uses, then issues a plain GET. The outcome keeps a
//! dangling reference distinct from a transient outage; what to do with
//! either is the calling endpoint's policy, not this client's.

use crate::resolver::Resolve;
use fabric_core::{FabricError, Result, RoundRobin};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a composed fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched<T> {
    Ok(T),
    /// The remote answered 404: the reference points at nothing.
    ReferenceMissing,
    /// No routable instance, transport failure, timeout, or an error status.
    Unavailable,
}

impl<T> Fetched<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Fetched::Ok(value) => Some(value),
            _ => None,
        }
    }
}

pub struct CompositionClient {
    resolver: Arc<dyn Resolve>,
    balancer: RoundRobin,
    http: reqwest::Client,
}

impl CompositionClient {
    pub fn new(resolver: Arc<dyn Resolve>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FabricError::Upstream(format!("composition client setup failed: {e}")))?;
        Ok(Self {
            resolver,
            balancer: RoundRobin::new(),
            http,
        })
    }

    /// GET `path` (e.g. `/owner/3`) from a live instance of `service` and
    /// decode the entity.
    pub async fn fetch<T: DeserializeOwned>(&self, service: &str, path: &str) -> Fetched<T> {
        let instances = match self.resolver.resolve(service).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!("resolution of {} failed: {}", service, e);
                return Fetched::Unavailable;
            }
        };
        let Some(instance) = self.balancer.select(service, &instances) else {
            debug!("no routable instance of {}", service);
            return Fetched::Unavailable;
        };

        let url = format!("{}{}", instance.base_url(), path);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("fetch from {} failed: {}", url, e);
                return Fetched::Unavailable;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Fetched::ReferenceMissing;
        }
        if !status.is_success() {
            warn!("{} answered {} to composed fetch", url, status);
            return Fetched::Unavailable;
        }
        match response.json::<T>().await {
            Ok(value) => Fetched::Ok(value),
            Err(e) => {
                warn!("undecodable body from {}: {}", url, e);
                Fetched::Unavailable
            }
        }
    }

    /// Fetch each distinct id exactly once. Enriching a list of rows that
    /// all reference the same entity must collapse to a single remote call.
    pub async fn fetch_map<K, T, F>(
        &self,
        service: &str,
        ids: impl IntoIterator<Item = K>,
        path: F,
    ) -> HashMap<K, Fetched<T>>
    where
        K: Eq + Hash + Clone,
        T: DeserializeOwned,
        F: Fn(&K) -> String,
    {
        let mut fetched = HashMap::new();
        for id in ids {
            if fetched.contains_key(&id) {
                continue;
            }
            let outcome = self.fetch(service, &path(&id)).await;
            fetched.insert(id, outcome);
        }
        fetched
    }
}
