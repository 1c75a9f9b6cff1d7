//! ACL data model
//!
//! Entities serialize with the Consul field naming (`AccessorID`, `SecretID`,
//! `ID`, PascalCase elsewhere) so the HTTP adapter can hand them out as-is.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_PARTITION: &str = "default";

/// Rule syntax version stamped on every policy written through the service
pub const POLICY_SYNTAX_CURRENT: u32 = 2;

pub const MANAGEMENT_POLICY_ID: &str = "00000000-0000-0000-0000-000000000001";
pub const MANAGEMENT_POLICY_NAME: &str = "global-management";
pub const ANONYMOUS_TOKEN_ID: &str = "00000000-0000-0000-0000-000000000002";

/// Rules granted by the builtin global-management policy
pub const MANAGEMENT_RULES: &str = r#"
acl = "write"
operator = "write"
keyring = "write"
mesh = "write"
agent_prefix "" { policy = "write" }
event_prefix "" { policy = "write" }
intention_prefix "" { policy = "write" }
key_prefix "" { policy = "write" }
node_prefix "" { policy = "write" }
query_prefix "" { policy = "write" }
service_prefix "" { policy = "write" }
session_prefix "" { policy = "write" }
"#;

/// Upper bound on questions in a single authorization batch
pub const MAX_AUTHORIZATION_REQUESTS: usize = 64;

/// Longest `MaxTokenTTL` an auth method may set
pub const MAX_LOGIN_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Entity-metadata partition scoping an ACL entity
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

impl EntityMeta {
    pub fn new(namespace: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            partition: partition.into(),
        }
    }

    /// Fill empty fields with the default namespace/partition.
    pub fn normalized(&self) -> Self {
        let pick = |v: &str, default: &str| {
            if v.is_empty() {
                default.to_string()
            } else {
                v.to_string()
            }
        };
        Self {
            namespace: pick(&self.namespace, DEFAULT_NAMESPACE),
            partition: pick(&self.partition, DEFAULT_PARTITION),
        }
    }

    /// Whether an entity in `self` is visible from a request scoped to `other`.
    pub fn matches(&self, other: &EntityMeta) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.partition == b.partition && a.namespace == b.namespace
    }
}

/// Implicit context of every entity-targeting operation
#[derive(Clone, Debug, Default)]
pub struct RequestScope {
    /// Target datacenter; `None` means this node's datacenter.
    pub datacenter: Option<String>,
    pub meta: EntityMeta,
    /// Secret of the calling token, passed through to the store.
    pub token: Option<String>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datacenter(mut self, dc: impl Into<String>) -> Self {
        let dc = dc.into();
        self.datacenter = if dc.is_empty() { None } else { Some(dc) };
        self
    }

    pub fn with_meta(mut self, meta: EntityMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }
}

/// How a policy or role is looked up
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Id(String),
    Name(String),
}

impl LookupKey {
    pub fn value(&self) -> &str {
        match self {
            LookupKey::Id(v) | LookupKey::Name(v) => v,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "ID '{}'", id),
            LookupKey::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

/// How a token is looked up
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TokenLookup {
    Accessor(String),
    Secret(String),
}

// Secrets must never end up in logs or error text.
impl fmt::Debug for TokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenLookup::Accessor(id) => write!(f, "accessor '{}'", id),
            TokenLookup::Secret(_) => write!(f, "secret <redacted>"),
        }
    }
}

/// Policy link in a token or role
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyLink {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Role link in a token
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleLink {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Service identity attached to a token; grants write on the named service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceIdentity {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
}

impl ServiceIdentity {
    /// Rules synthesized for the identity
    pub fn rules(&self) -> String {
        format!(
            "service \"{name}\" {{ policy = \"write\" }}\nservice \"{name}-sidecar-proxy\" {{ policy = \"write\" }}\nservice_prefix \"\" {{ policy = \"read\" }}\nnode_prefix \"\" {{ policy = \"read\" }}\n",
            name = self.service_name
        )
    }

    pub fn applies_to(&self, datacenter: &str) -> bool {
        self.datacenters.is_empty() || self.datacenters.iter().any(|dc| dc == datacenter)
    }
}

/// Node identity attached to a token; grants write on the named node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeIdentity {
    pub node_name: String,
    pub datacenter: String,
}

impl NodeIdentity {
    pub fn rules(&self) -> String {
        format!(
            "node \"{}\" {{ policy = \"write\" }}\nservice_prefix \"\" {{ policy = \"read\" }}\n",
            self.node_name
        )
    }
}

/// ACL Token structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclToken {
    #[serde(rename = "AccessorID", default)]
    pub accessor_id: String,
    #[serde(rename = "SecretID", default, skip_serializing_if = "String::is_empty")]
    pub secret_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policies: Vec<PolicyLink>,
    #[serde(default)]
    pub roles: Vec<RoleLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_identities: Vec<ServiceIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_identities: Vec<NodeIdentity>,
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl AclToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|exp| exp <= now)
    }

    /// Copy of the token without its secret, for listings.
    pub fn redacted(mut self) -> Self {
        self.secret_id.clear();
        self
    }

    pub fn has_policy(&self, id_or_name: &str) -> bool {
        self.policies
            .iter()
            .any(|p| p.id == id_or_name || p.name == id_or_name)
    }

    pub fn has_role(&self, id_or_name: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r.id == id_or_name || r.name == id_or_name)
    }
}

/// ACL Policy structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclPolicy {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub syntax: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl AclPolicy {
    /// Whether the policy applies inside `datacenter`.
    pub fn applies_to(&self, datacenter: &str) -> bool {
        self.datacenters.is_empty() || self.datacenters.iter().any(|dc| dc == datacenter)
    }

    pub fn link(&self) -> PolicyLink {
        PolicyLink {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// ACL Role structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclRole {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policies: Vec<PolicyLink>,
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl AclRole {
    pub fn link(&self) -> RoleLink {
        RoleLink {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// What a matching binding rule grants at login
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    Service,
    Node,
    #[default]
    Role,
    Policy,
}

/// ACL Binding Rule structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BindingRule {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth_method: String,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub bind_type: BindType,
    #[serde(default)]
    pub bind_name: String,
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

/// A single auth method config value.
///
/// Callers always send JSON. Stores that keep strings as raw byte sequences
/// hand them back as `Bytes`, which must be turned back into strings before
/// the method leaves the service (see `AuthMethod::normalize_config`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        ConfigValue::Json(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Json(serde_json::Value::String(value.to_string()))
    }
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// ACL Auth Method structure. Keyed by `name`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthMethod {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub method_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "MaxTokenTTL", default, skip_serializing_if = "String::is_empty")]
    pub max_token_ttl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_locality: String,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl AuthMethod {
    /// Convert raw byte config values back into the strings callers supplied.
    pub fn normalize_config(mut self) -> Self {
        for value in self.config.values_mut() {
            if let ConfigValue::Bytes(raw) = value {
                let s = String::from_utf8_lossy(raw).into_owned();
                *value = ConfigValue::Json(serde_json::Value::String(s));
            }
        }
        self
    }

    /// Tokens minted by this method are replicated globally.
    pub fn mints_global_tokens(&self) -> bool {
        self.token_locality == "global"
    }

    pub fn max_token_ttl(&self) -> Option<Duration> {
        parse_duration(&self.max_token_ttl)
    }
}

/// A single authorization question
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthorizationRequest {
    pub resource: String,
    #[serde(default)]
    pub segment: String,
    pub access: String,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl AuthorizationRequest {
    pub fn new(
        resource: impl Into<String>,
        segment: impl Into<String>,
        access: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            segment: segment.into(),
            access: access.into(),
            meta: EntityMeta::default(),
        }
    }
}

/// Answer to one authorization question, echoing the question
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthorizationResponse {
    #[serde(flatten)]
    pub request: AuthorizationRequest,
    pub allow: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// ACL replication health of a node
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicationStatus {
    pub enabled: bool,
    pub running: bool,
    pub source_datacenter: String,
    pub replication_type: String,
    pub replicated_index: u64,
    pub replicated_role_index: u64,
    pub replicated_token_index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

/// Login request with auth method
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginParams {
    pub auth_method: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(flatten)]
    pub entity_meta: EntityMeta,
}

/// Filters accepted by the token listing
#[derive(Clone, Debug, Default)]
pub struct TokenListFilter {
    pub policy: Option<String>,
    pub role: Option<String>,
    pub auth_method: Option<String>,
}

impl TokenListFilter {
    pub fn matches(&self, token: &AclToken) -> bool {
        self.policy.as_deref().is_none_or(|p| token.has_policy(p))
            && self.role.as_deref().is_none_or(|r| token.has_role(r))
            && self
                .auth_method
                .as_deref()
                .is_none_or(|m| token.auth_method.as_deref() == Some(m))
    }
}

/// Parse Go-style durations such as "90s", "1h30m", "500ms" or "1.5h".
///
/// Every number needs a unit (`ns`, `us`, `ms`, `s`, `m`, `h`) except a bare
/// `0`. Values that overflow `u64` nanoseconds are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail.find(is_number).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let scale: u64 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return None,
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut nanos = whole.checked_mul(scale)?;
        let mut place = scale;
        for digit in fraction.chars() {
            place /= 10;
            nanos = nanos.checked_add(u64::from(digit.to_digit(10)?) * place)?;
        }

        total = total.checked_add(nanos)?;
        rest = next;
    }

    Some(Duration::from_nanos(total))
}
