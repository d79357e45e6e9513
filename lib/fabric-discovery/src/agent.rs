//! Self-registration and lease renewal for service processes
//!
//! The agent owns the only task that heartbeats for its instance, so
//! renewals for one instance reach the registry in send order.

use crate::client::RegistryClient;
use fabric_core::{InstanceStatus, RenewOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identity a process announces to the registry.
#[derive(Clone, Debug)]
pub struct Announcement {
    pub service_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
}

/// Keeps one instance's lease alive: registers, marks the instance UP, then
/// renews on a fixed interval. A lost lease triggers re-registration from
/// scratch on the next tick.
pub struct HeartbeatAgent {
    client: Arc<RegistryClient>,
    announcement: Announcement,
    task: JoinHandle<()>,
}

impl HeartbeatAgent {
    pub fn start(
        client: Arc<RegistryClient>,
        announcement: Announcement,
        interval: Duration,
    ) -> Self {
        let task = tokio::task::spawn(renew_loop(
            Arc::clone(&client),
            announcement.clone(),
            interval,
        ));
        Self {
            client,
            announcement,
            task,
        }
    }

    /// Graceful drain: stop renewing, mark OUT_OF_SERVICE so routing skips
    /// the instance while it stays visible, then deregister.
    pub async fn shutdown(self) {
        self.task.abort();
        let Announcement {
            service_name,
            instance_id,
            ..
        } = &self.announcement;

        if let Err(e) = self
            .client
            .set_status(service_name, instance_id, InstanceStatus::OutOfService)
            .await
        {
            warn!("drain of {}/{} failed: {}", service_name, instance_id, e);
        }
        if let Err(e) = self.client.deregister(service_name, instance_id).await {
            warn!(
                "deregistration of {}/{} failed: {}",
                service_name, instance_id, e
            );
        } else {
            info!("{}/{} left the directory", service_name, instance_id);
        }
    }
}

async fn renew_loop(client: Arc<RegistryClient>, announcement: Announcement, interval: Duration) {
    announce(&client, &announcement).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval's first tick is immediate and the announce above already ran.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match client
            .renew(&announcement.service_name, &announcement.instance_id)
            .await
        {
            Ok(RenewOutcome::Renewed) => {
                debug!(
                    "renewed lease for {}/{}",
                    announcement.service_name, announcement.instance_id
                );
            }
            Ok(RenewOutcome::NotFound) => {
                warn!(
                    "lease for {}/{} was lost, re-registering",
                    announcement.service_name, announcement.instance_id
                );
                announce(&client, &announcement).await;
            }
            Err(e) => {
                // Transient registry outage: the lease survives a missed
                // beat, so just try again next tick.
                warn!(
                    "heartbeat for {}/{} failed: {}",
                    announcement.service_name, announcement.instance_id, e
                );
            }
        }
    }
}

async fn announce(client: &RegistryClient, announcement: &Announcement) {
    let Announcement {
        service_name,
        instance_id,
        host,
        port,
    } = announcement;

    match client.register(service_name, instance_id, host, *port).await {
        Ok(lease_id) => {
            info!(
                "registered {}/{} at {}:{} (lease {})",
                service_name, instance_id, host, port, lease_id
            );
            if let Err(e) = client
                .set_status(service_name, instance_id, InstanceStatus::Up)
                .await
            {
                warn!("could not mark {}/{} UP: {}", service_name, instance_id, e);
            }
        }
        Err(e) => {
            warn!(
                "registration of {}/{} failed, retrying on next tick: {}",
                service_name, instance_id, e
            );
        }
    }
}
