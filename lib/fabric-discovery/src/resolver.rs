//! Name resolution seam shared by the gateway and direct callers

use crate::client::RegistryClient;
use async_trait::async_trait;
use fabric_core::{InstanceRecord, Registry, Result};
use std::sync::Arc;

/// Resolves a logical service name to its currently visible instances.
/// Routing decides which of them are actually usable.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<Vec<InstanceRecord>>;
}

#[async_trait]
impl Resolve for RegistryClient {
    async fn resolve(&self, service: &str) -> Result<Vec<InstanceRecord>> {
        self.lookup(service).await
    }
}

/// In-process directory view over an owned `Registry`. Used by tests and by
/// deployments that co-locate the registry with the caller.
pub struct LocalDirectory {
    registry: Arc<Registry>,
}

impl LocalDirectory {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Resolve for LocalDirectory {
    async fn resolve(&self, service: &str) -> Result<Vec<InstanceRecord>> {
        Ok(self
            .registry
            .lookup(service)
            .await
            .iter()
            .map(InstanceRecord::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::{InstanceStatus, ManualClock};

    #[tokio::test]
    async fn local_directory_reflects_registry_state() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(Registry::new(30_000, clock.clone()));
        let directory = LocalDirectory::new(registry.clone());

        assert!(directory.resolve("CAR-SVC").await.unwrap().is_empty());

        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();
        registry
            .set_status("CAR-SVC", "i1", InstanceStatus::Up)
            .await;

        let records = directory.resolve("CAR-SVC").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instance_id, "i1");
        assert!(records[0].is_routable());

        clock.advance(30_000);
        assert!(directory.resolve("CAR-SVC").await.unwrap().is_empty());
    }
}
