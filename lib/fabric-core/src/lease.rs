//! In-memory lease table with per-service-name buckets
//!
//! Each service name owns its own lock, so registration churn on one service
//! never blocks snapshots of another. A bucket is a `Vec` in registration
//! order with set semantics on `instance_id`.

use crate::clock::Clock;
use crate::instance::{InstanceStatus, ServiceInstance};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type Bucket = Arc<RwLock<Vec<ServiceInstance>>>;

pub struct LeaseStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    lease_duration_ms: u64,
    clock: Arc<dyn Clock>,
}

impl LeaseStore {
    pub fn new(lease_duration_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            lease_duration_ms,
            clock,
        }
    }

    pub fn lease_duration_ms(&self) -> u64 {
        self.lease_duration_ms
    }

    async fn bucket(&self, service: &str) -> Option<Bucket> {
        self.buckets.read().await.get(service).cloned()
    }

    async fn bucket_or_insert(&self, service: &str) -> Bucket {
        if let Some(bucket) = self.bucket(service).await {
            return bucket;
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }

    /// Insert or replace an instance. Re-registration under the same
    /// `instance_id` replaces in place, keeping the original slot in the
    /// registration order.
    pub async fn put(&self, instance: ServiceInstance) {
        let bucket = self.bucket_or_insert(&instance.service_name).await;
        let mut entries = bucket.write().await;
        match entries
            .iter_mut()
            .find(|e| e.instance_id == instance.instance_id)
        {
            Some(existing) => *existing = instance,
            None => entries.push(instance),
        }
    }

    pub async fn remove(&self, service: &str, instance_id: &str) -> Option<ServiceInstance> {
        let bucket = self.bucket(service).await?;
        let mut entries = bucket.write().await;
        let idx = entries.iter().position(|e| e.instance_id == instance_id)?;
        Some(entries.remove(idx))
    }

    /// Renew the lease. Returns false when the instance is unknown or its
    /// lease already expired, in which case the caller must re-register.
    pub async fn touch(&self, service: &str, instance_id: &str) -> bool {
        let now = self.clock.now_millis();
        let Some(bucket) = self.bucket(service).await else {
            return false;
        };
        let mut entries = bucket.write().await;
        let Some(idx) = entries.iter().position(|e| e.instance_id == instance_id) else {
            return false;
        };
        if now >= entries[idx].expires_at_ms(self.lease_duration_ms) {
            // Expired but not yet swept: same outcome as unknown.
            entries.remove(idx);
            return false;
        }
        entries[idx].last_heartbeat_ms = now;
        true
    }

    /// Update the status of a live instance. An expired or unknown instance
    /// reports false.
    pub async fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> bool {
        let now = self.clock.now_millis();
        let Some(bucket) = self.bucket(service).await else {
            return false;
        };
        let mut entries = bucket.write().await;
        let Some(idx) = entries.iter().position(|e| e.instance_id == instance_id) else {
            return false;
        };
        if now >= entries[idx].expires_at_ms(self.lease_duration_ms) {
            entries.remove(idx);
            return false;
        }
        entries[idx].status = status;
        true
    }

    /// Unexpired instances in registration order. A bucket is read under one
    /// lock acquisition, so a snapshot never observes a half-applied update.
    pub async fn snapshot(&self, service: &str) -> Vec<ServiceInstance> {
        let now = self.clock.now_millis();
        let Some(bucket) = self.bucket(service).await else {
            return Vec::new();
        };
        let entries = bucket.read().await;
        entries
            .iter()
            .filter(|e| now < e.expires_at_ms(self.lease_duration_ms))
            .cloned()
            .collect()
    }

    /// Remove every expired lease and return the evicted instances. Driven by
    /// the registry's background timer, independent of any client action.
    pub async fn sweep(&self) -> Vec<ServiceInstance> {
        let now = self.clock.now_millis();
        let buckets: Vec<Bucket> = self.buckets.read().await.values().cloned().collect();

        let mut evicted = Vec::new();
        for bucket in buckets {
            let mut entries = bucket.write().await;
            let mut idx = 0;
            while idx < entries.len() {
                if now >= entries[idx].expires_at_ms(self.lease_duration_ms) {
                    evicted.push(entries.remove(idx));
                } else {
                    idx += 1;
                }
            }
        }

        if !evicted.is_empty() {
            debug!("sweep evicted {} expired lease(s)", evicted.len());
        }
        evicted
    }
}
