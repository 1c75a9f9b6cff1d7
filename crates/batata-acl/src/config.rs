//! ACL configuration
//!
//! `AclConfig` is handed to `AclService` at construction. Whether ACLs are
//! enabled, which datacenter this node lives in, and how long resolved tokens
//! stay cached are all read from here rather than from process-wide state.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DATACENTER: &str = "dc1";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 30;
pub const DEFAULT_TOKEN_CACHE_CAPACITY: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// What to do when no rule in a token's policies matches a request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    Allow,
    #[default]
    Deny,
}

impl std::str::FromStr for DefaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(DefaultPolicy::Allow),
            "deny" => Ok(DefaultPolicy::Deny),
            _ => Err(format!("Invalid default policy: {}", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub enabled: bool,
    pub datacenter: String,
    /// Authoritative datacenter for ACL writes. Empty means this node's datacenter.
    pub primary_datacenter: String,
    pub default_policy: DefaultPolicy,
    pub token_ttl_secs: u64,
    pub token_cache_capacity: u64,
    pub request_timeout_ms: u64,
    pub initial_management_token: Option<String>,
    /// Base URLs of peer datacenters, keyed by datacenter name
    pub remote_datacenters: HashMap<String, String>,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            datacenter: DEFAULT_DATACENTER.to_string(),
            primary_datacenter: String::new(),
            default_policy: DefaultPolicy::Deny,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            token_cache_capacity: DEFAULT_TOKEN_CACHE_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            initial_management_token: None,
            remote_datacenters: HashMap::new(),
        }
    }
}

impl AclConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            default_policy: DefaultPolicy::Allow,
            ..Self::default()
        }
    }

    pub fn primary_datacenter(&self) -> &str {
        if self.primary_datacenter.is_empty() {
            &self.datacenter
        } else {
            &self.primary_datacenter
        }
    }

    pub fn is_primary(&self) -> bool {
        self.primary_datacenter() == self.datacenter
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
