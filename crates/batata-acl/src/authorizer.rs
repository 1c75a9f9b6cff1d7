//! Authorizers: answer single permission questions for a resolved token
//!
//! The `Authorizer` trait is the seam between resolution and evaluation.
//! `RuleAuthorizer` compiles the block rule syntax used by batata policies:
//!
//! ```text
//! acl = "read"
//! service_prefix "web-" { policy = "write" }
//! key "config/app" { policy = "deny" }
//! ```
//!
//! Exact rules beat prefix rules, longer prefixes beat shorter ones, and a
//! `deny` on the winning rule denies every access level.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::DefaultPolicy;
use crate::model::EntityMeta;

/// Outcome of a single permission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// No rule matched and the default policy did not grant access.
    Default,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Resource kinds a permission question can name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Acl,
    Agent,
    Event,
    Intention,
    Key,
    Keyring,
    Mesh,
    Node,
    Operator,
    Query,
    Service,
    Session,
}

impl Resource {
    /// Whether the resource is addressed by a segment or is a single global switch.
    pub fn is_segmented(self) -> bool {
        !matches!(
            self,
            Resource::Acl | Resource::Keyring | Resource::Mesh | Resource::Operator
        )
    }

    pub fn supports(self, access: Access) -> bool {
        match access {
            Access::Read | Access::Write => true,
            Access::List => matches!(self, Resource::Key),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Acl => "acl",
            Resource::Agent => "agent",
            Resource::Event => "event",
            Resource::Intention => "intention",
            Resource::Key => "key",
            Resource::Keyring => "keyring",
            Resource::Mesh => "mesh",
            Resource::Node => "node",
            Resource::Operator => "operator",
            Resource::Query => "query",
            Resource::Service => "service",
            Resource::Session => "session",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "acl" => Resource::Acl,
            "agent" => Resource::Agent,
            "event" => Resource::Event,
            "intention" => Resource::Intention,
            "key" => Resource::Key,
            "keyring" => Resource::Keyring,
            "mesh" => Resource::Mesh,
            "node" => Resource::Node,
            "operator" => Resource::Operator,
            "query" => Resource::Query,
            "service" => Resource::Service,
            "session" => Resource::Session,
            _ => return Err(format!("Unknown resource: '{}'", s)),
        })
    }
}

/// Access level a permission question asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    List,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::List => "list",
            Access::Write => "write",
        })
    }
}

impl FromStr for Access {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Access::Read),
            "list" => Ok(Access::List),
            "write" => Ok(Access::Write),
            _ => Err(format!("Invalid access level: '{}'", s)),
        }
    }
}

/// Per-question evaluation context
#[derive(Clone, Debug, Default)]
pub struct AuthorizerContext {
    pub meta: EntityMeta,
}

/// Answers single permission questions
pub trait Authorizer: Send + Sync {
    fn allowed(
        &self,
        resource: Resource,
        segment: &str,
        access: Access,
        ctx: &AuthorizerContext,
    ) -> Decision;
}

/// Rule policy type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RulePolicy {
    Read,
    List,
    Write,
    Deny,
}

impl FromStr for RulePolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "read" => RulePolicy::Read,
            "list" => RulePolicy::List,
            "write" => RulePolicy::Write,
            _ => RulePolicy::Deny,
        })
    }
}

impl RulePolicy {
    pub fn grants(self, access: Access) -> bool {
        match access {
            Access::Read => matches!(self, RulePolicy::Read | RulePolicy::List | RulePolicy::Write),
            Access::List => matches!(self, RulePolicy::List | RulePolicy::Write),
            Access::Write => matches!(self, RulePolicy::Write),
        }
    }

    /// Combine two rules on the same target: deny wins, otherwise the wider grant.
    fn merge(self, other: RulePolicy) -> RulePolicy {
        use RulePolicy::*;
        match (self, other) {
            (Deny, _) | (_, Deny) => Deny,
            (Write, _) | (_, Write) => Write,
            (List, _) | (_, List) => List,
            _ => Read,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ResourceRules {
    exact: HashMap<String, RulePolicy>,
    prefix: Vec<(String, RulePolicy)>,
}

impl ResourceRules {
    fn add_exact(&mut self, segment: &str, policy: RulePolicy) {
        self.exact
            .entry(segment.to_string())
            .and_modify(|p| *p = p.merge(policy))
            .or_insert(policy);
    }

    fn add_prefix(&mut self, prefix: &str, policy: RulePolicy) {
        if let Some((_, p)) = self.prefix.iter_mut().find(|(pre, _)| pre == prefix) {
            *p = p.merge(policy);
        } else {
            self.prefix.push((prefix.to_string(), policy));
        }
    }

    fn lookup(&self, segment: &str) -> Option<RulePolicy> {
        if let Some(policy) = self.exact.get(segment) {
            return Some(*policy);
        }
        self.prefix
            .iter()
            .filter(|(prefix, _)| segment.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, policy)| *policy)
    }
}

/// Parsed ACL rules for authorization checks
#[derive(Clone, Debug, Default)]
pub struct ParsedRules {
    segmented: HashMap<Resource, ResourceRules>,
    global: HashMap<Resource, RulePolicy>,
}

impl ParsedRules {
    /// Parse policy rules. Unrecognized lines are skipped.
    pub fn parse(rules: &str) -> Self {
        let mut parsed = ParsedRules::default();
        parsed.extend(rules);
        parsed
    }

    /// Merge another policy's rules into this set.
    pub fn extend(&mut self, rules: &str) {
        for line in rules.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Block form: service_prefix "web-" { policy = "write" }
            if let Some((resource_part, policy_part)) = line.split_once('{') {
                let policy_part = policy_part.trim().trim_end_matches('}').trim();
                let Some(policy) = parse_assignment(policy_part, "policy") else {
                    continue;
                };
                let mut words = resource_part.trim().splitn(2, char::is_whitespace);
                let keyword = words.next().unwrap_or_default();
                let segment = words.next().unwrap_or_default().trim().trim_matches('"');

                let (name, is_prefix) = match keyword.strip_suffix("_prefix") {
                    Some(name) => (name, true),
                    None => (keyword, false),
                };
                let Ok(resource) = name.parse::<Resource>() else {
                    continue;
                };
                if !resource.is_segmented() {
                    continue;
                }
                let entry = self.segmented.entry(resource).or_default();
                if is_prefix {
                    entry.add_prefix(segment, policy);
                } else {
                    entry.add_exact(segment, policy);
                }
                continue;
            }

            // Assignment form: operator = "read"
            if let Some((name, _)) = line.split_once('=')
                && let Ok(resource) = name.trim().parse::<Resource>()
                && !resource.is_segmented()
                && let Some(policy) = parse_assignment(line, name.trim())
            {
                self.global
                    .entry(resource)
                    .and_modify(|p| *p = p.merge(policy))
                    .or_insert(policy);
            }
        }
    }

    pub fn lookup(&self, resource: Resource, segment: &str) -> Option<RulePolicy> {
        if resource.is_segmented() {
            self.segmented.get(&resource)?.lookup(segment)
        } else {
            self.global.get(&resource).copied()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segmented.is_empty() && self.global.is_empty()
    }
}

fn parse_assignment(text: &str, key: &str) -> Option<RulePolicy> {
    let value = text.strip_prefix(key)?.trim().strip_prefix('=')?;
    value.trim().trim_matches('"').parse().ok()
}

/// Authorizer compiled from a token's aggregated policy rules
#[derive(Clone, Debug)]
pub struct RuleAuthorizer {
    rules: ParsedRules,
    default_policy: DefaultPolicy,
}

impl RuleAuthorizer {
    pub fn new(rules: ParsedRules, default_policy: DefaultPolicy) -> Self {
        Self {
            rules,
            default_policy,
        }
    }

    /// Authorizer with no rules; every answer comes from the default policy.
    pub fn from_default(default_policy: DefaultPolicy) -> Self {
        Self::new(ParsedRules::default(), default_policy)
    }
}

impl Authorizer for RuleAuthorizer {
    fn allowed(
        &self,
        resource: Resource,
        segment: &str,
        access: Access,
        _ctx: &AuthorizerContext,
    ) -> Decision {
        match self.rules.lookup(resource, segment) {
            Some(policy) if policy.grants(access) => Decision::Allow,
            Some(_) => Decision::Deny,
            None if self.default_policy == DefaultPolicy::Allow => Decision::Allow,
            None => Decision::Default,
        }
    }
}
