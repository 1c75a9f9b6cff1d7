//! Batata ACL server - Consul-compatible HTTP API over batata-acl
//!
//! - `settings`: file, environment and command line configuration
//! - `logging`: tracing subscriber with console and rolling file output
//! - `handler` / `route`: the `/v1/acl/*` endpoints
//! - `remote`: HTTP forwarding to peer datacenters

use std::sync::Arc;

use batata_acl::{AclConfig, AclService, MemoryAclStore};
use tracing::info;

pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod remote;
pub mod route;
pub mod settings;

use remote::HttpAclRemote;

/// Build the ACL service for a standalone node backed by the in-memory store.
pub fn build_service(config: AclConfig) -> anyhow::Result<AclService> {
    let store = Arc::new(MemoryAclStore::new(
        config.datacenter.clone(),
        config.primary_datacenter().to_string(),
    ));
    if let Some(secret) = config
        .initial_management_token
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        store.seed_management_token(secret);
    }

    let remote = if config.remote_datacenters.is_empty() {
        None
    } else {
        Some(HttpAclRemote::new(
            config.remote_datacenters.clone(),
            config.request_timeout(),
        )?)
    };

    info!(
        datacenter = %config.datacenter,
        remote_datacenters = config.remote_datacenters.len(),
        "ACL service ready"
    );
    let mut service = AclService::new(config, store);
    if let Some(remote) = remote {
        service = service.with_remote(Arc::new(remote));
    }
    Ok(service)
}
