//! Registry: the single authority over the service directory
//!
//! Everything that mutates the directory goes through here; lookups read a
//! consistent per-bucket snapshot. Expired leases are removed by a background
//! sweep so a crashed instance disappears even though nothing deregisters it.

use crate::clock::Clock;
use crate::error::{FabricError, Result};
use crate::instance::{InstanceStatus, ServiceInstance};
use crate::lease::LeaseStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed,
    /// The lease expired or was never held; the caller must re-register.
    NotFound,
}

pub struct Registry {
    store: LeaseStore,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(lease_duration_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: LeaseStore::new(lease_duration_ms, clock.clone()),
            clock,
        }
    }

    /// Register an instance with an initial lease. New registrations start
    /// as STARTING and stay out of routing until a status update marks UP.
    pub async fn register(
        &self,
        service: &str,
        instance_id: &str,
        host: &str,
        port: u16,
    ) -> Result<Uuid> {
        if host.trim().is_empty() {
            return Err(FabricError::Validation("host must not be empty".to_string()));
        }
        if port == 0 {
            return Err(FabricError::Validation(
                "port must be in 1..=65535".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        self.store
            .put(ServiceInstance {
                service_name: service.to_string(),
                instance_id: instance_id.to_string(),
                host: host.to_string(),
                port,
                status: InstanceStatus::Starting,
                registered_at_ms: now,
                last_heartbeat_ms: now,
            })
            .await;

        let lease_id = Uuid::new_v4();
        info!(
            "registered {}/{} at {}:{} (lease {})",
            service, instance_id, host, port, lease_id
        );
        Ok(lease_id)
    }

    pub async fn renew(&self, service: &str, instance_id: &str) -> RenewOutcome {
        if self.store.touch(service, instance_id).await {
            RenewOutcome::Renewed
        } else {
            debug!("renew for unknown lease {}/{}", service, instance_id);
            RenewOutcome::NotFound
        }
    }

    pub async fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> bool {
        let updated = self.store.set_status(service, instance_id, status).await;
        if updated {
            info!("{}/{} is now {:?}", service, instance_id, status);
        }
        updated
    }

    /// Immediate removal. Idempotent: removing an unknown instance is a no-op.
    pub async fn deregister(&self, service: &str, instance_id: &str) {
        if self.store.remove(service, instance_id).await.is_some() {
            info!("deregistered {}/{}", service, instance_id);
        }
    }

    /// Visible (unexpired) instances in registration order. Unknown names and
    /// names with nothing registered both produce an empty set.
    pub async fn lookup(&self, service: &str) -> Vec<ServiceInstance> {
        self.store.snapshot(service).await
    }

    /// One eviction pass. Failures here are impossible by construction today,
    /// but evictions are logged per instance so an operator can see which
    /// instances stopped heartbeating.
    pub async fn sweep_once(&self) -> Vec<ServiceInstance> {
        let evicted = self.store.sweep().await;
        for instance in &evicted {
            warn!(
                "evicted {}/{}: lease expired without renewal",
                instance.service_name, instance.instance_id
            );
        }
        evicted
    }

    /// Background eviction on a fixed interval. Sweeps take per-bucket write
    /// locks only, so concurrent lookups and registrations keep flowing.
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::task::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so sweeps
            // start one interval after boot.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.sweep_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const LEASE_MS: u64 = 30_000;

    fn registry() -> (Registry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (Registry::new(LEASE_MS, clock.clone()), clock)
    }

    #[tokio::test]
    async fn register_rejects_empty_host() {
        let (registry, _clock) = registry();
        let err = registry
            .register("CAR-SVC", "i1", "  ", 9000)
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::Validation(_)));
        assert!(registry.lookup("CAR-SVC").await.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_port_zero() {
        let (registry, _clock) = registry();
        let err = registry
            .register("CAR-SVC", "i1", "10.0.0.1", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::Validation(_)));
    }

    #[tokio::test]
    async fn fresh_registration_is_visible_as_starting() {
        let (registry, _clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();

        let instances = registry.lookup("CAR-SVC").await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_id, "i1");
        assert_eq!(instances[0].status, InstanceStatus::Starting);
    }

    #[tokio::test]
    async fn renew_before_expiry_keeps_instance_visible() {
        let (registry, clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();

        clock.advance(LEASE_MS - 1);
        assert_eq!(
            registry.renew("CAR-SVC", "i1").await,
            RenewOutcome::Renewed
        );

        clock.advance(LEASE_MS - 1);
        assert_eq!(registry.lookup("CAR-SVC").await.len(), 1);
    }

    #[tokio::test]
    async fn renew_after_expiry_reports_not_found() {
        let (registry, clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();

        clock.advance(LEASE_MS);
        assert_eq!(
            registry.renew("CAR-SVC", "i1").await,
            RenewOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn lookup_never_returns_expired_instances() {
        let (registry, clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();
        registry.set_status("CAR-SVC", "i1", InstanceStatus::Up).await;

        clock.advance(LEASE_MS);
        assert!(registry.lookup("CAR-SVC").await.is_empty());
    }

    #[tokio::test]
    async fn lookup_unknown_service_is_empty_not_an_error() {
        let (registry, _clock) = registry();
        assert!(registry.lookup("NO-SUCH-SVC").await.is_empty());
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let (registry, _clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();

        registry.deregister("CAR-SVC", "i1").await;
        let after_first = registry.lookup("CAR-SVC").await;
        registry.deregister("CAR-SVC", "i1").await;
        let after_second = registry.lookup("CAR-SVC").await;

        assert!(after_first.is_empty());
        assert!(after_second.is_empty());
    }

    #[tokio::test]
    async fn sweep_once_evicts_and_reports() {
        let (registry, clock) = registry();
        registry
            .register("CAR-SVC", "i1", "10.0.0.1", 9000)
            .await
            .unwrap();
        registry
            .register("OWNER-SVC", "o1", "10.0.0.2", 9001)
            .await
            .unwrap();

        clock.advance(LEASE_MS / 2);
        registry.renew("OWNER-SVC", "o1").await;
        clock.advance(LEASE_MS / 2);

        let evicted = registry.sweep_once().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].service_name, "CAR-SVC");
        assert_eq!(registry.lookup("OWNER-SVC").await.len(), 1);
    }

    #[tokio::test]
    async fn set_status_unknown_instance_reports_false() {
        let (registry, _clock) = registry();
        assert!(
            !registry
                .set_status("CAR-SVC", "ghost", InstanceStatus::Up)
                .await
        );
    }
}
