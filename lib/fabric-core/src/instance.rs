//! Service instance model

use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered instance.
///
/// An instance registers as `Starting` and is excluded from routing until a
/// status update marks it `Up`. `OutOfService` keeps the instance visible in
/// lookups (graceful drain) while routing skips it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Starting,
    Up,
    OutOfService,
}

/// A registered instance as the registry owns it. Identity is
/// `(service_name, instance_id)`; the registering process keeps only its own
/// id for re-sending heartbeats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub registered_at_ms: u64,
    pub last_heartbeat_ms: u64,
}

impl ServiceInstance {
    /// The lease is derived state: expiry moves forward with each heartbeat.
    pub fn expires_at_ms(&self, lease_duration_ms: u64) -> u64 {
        self.last_heartbeat_ms.saturating_add(lease_duration_ms)
    }

    pub fn record(&self) -> InstanceRecord {
        InstanceRecord::from(self)
    }
}

/// Wire form of an instance as routing sees it: what `GET /registry/{name}`
/// returns and what the balancer selects over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
}

impl InstanceRecord {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn is_routable(&self) -> bool {
        self.status == InstanceStatus::Up
    }
}

impl From<&ServiceInstance> for InstanceRecord {
    fn from(instance: &ServiceInstance) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            host: instance.host.clone(),
            port: instance.port,
            status: instance.status,
        }
    }
}
