//! Client side of the fabric
//!
//! This library provides:
//! - A typed HTTP client for the registry's REST surface
//! - The `Resolve` seam shared by the gateway and direct callers
//! - A heartbeat agent that keeps a process's lease alive
//! - The remote-composition client for cross-service entity fetches

pub mod agent;
pub mod client;
pub mod composition;
pub mod resolver;

pub use agent::{Announcement, HeartbeatAgent};
pub use client::RegistryClient;
pub use composition::{CompositionClient, Fetched};
pub use resolver::{LocalDirectory, Resolve};
