//! Typed HTTP client for the registry's REST surface

use fabric_core::{FabricError, InstanceRecord, InstanceStatus, RenewOutcome, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct RegisterBody<'a> {
    host: &'a str,
    port: u16,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterReply {
    lease_id: String,
}

#[derive(Serialize)]
struct StatusBody {
    status: InstanceStatus,
}

/// HTTP client for one registry node. Every call carries the configured
/// downstream deadline; exceeding it surfaces as a transport failure.
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FabricError::Upstream(format!("registry client setup failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn instance_url(&self, service: &str, instance_id: &str) -> String {
        format!("{}/registry/{}/{}", self.base_url, service, instance_id)
    }

    pub async fn register(
        &self,
        service: &str,
        instance_id: &str,
        host: &str,
        port: u16,
    ) -> Result<String> {
        let url = self.instance_url(service, instance_id);
        let response = self
            .http
            .post(&url)
            .json(&RegisterBody { host, port })
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::CREATED => {
                let reply: RegisterReply = response.json().await.map_err(transport)?;
                debug!("registered {}/{} (lease {})", service, instance_id, reply.lease_id);
                Ok(reply.lease_id)
            }
            StatusCode::BAD_REQUEST => Err(FabricError::Validation(body_text(response).await)),
            other => Err(FabricError::Upstream(format!(
                "registry answered {other} to register"
            ))),
        }
    }

    /// Renew the lease. `NotFound` means the registry no longer knows the
    /// instance and the caller must register again from scratch.
    pub async fn renew(&self, service: &str, instance_id: &str) -> Result<RenewOutcome> {
        let url = format!("{}/renew", self.instance_url(service, instance_id));
        let response = self.http.put(&url).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::OK => Ok(RenewOutcome::Renewed),
            StatusCode::NOT_FOUND => Ok(RenewOutcome::NotFound),
            other => Err(FabricError::Upstream(format!(
                "registry answered {other} to renew"
            ))),
        }
    }

    /// Returns false when the registry does not know the instance.
    pub async fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<bool> {
        let url = format!("{}/status", self.instance_url(service, instance_id));
        let response = self
            .http
            .put(&url)
            .json(&StatusBody { status })
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(FabricError::Upstream(format!(
                "registry answered {other} to status update"
            ))),
        }
    }

    pub async fn deregister(&self, service: &str, instance_id: &str) -> Result<()> {
        let url = self.instance_url(service, instance_id);
        let response = self.http.delete(&url).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(FabricError::Upstream(format!(
                "registry answered {other} to deregister"
            ))),
        }
    }

    pub async fn lookup(&self, service: &str) -> Result<Vec<InstanceRecord>> {
        let url = format!("{}/registry/{}", self.base_url, service);
        let response = self.http.get(&url).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::OK => response.json().await.map_err(transport),
            other => Err(FabricError::Upstream(format!(
                "registry answered {other} to lookup"
            ))),
        }
    }
}

fn transport(e: reqwest::Error) -> FabricError {
    FabricError::Upstream(e.to_string())
}

async fn body_text(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}
