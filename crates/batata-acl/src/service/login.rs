//! Login and logout through auth methods
//!
//! Login verifies a bearer credential with the `IdentityValidator` registered
//! for the auth method's type, runs the method's binding rules over the
//! resulting identity, and mints a token carrying whatever the rules bound.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::AclService;
use crate::error::{AclError, AclResult};
use crate::model::{
    AclToken, AuthMethod, BindType, BindingRule, ConfigValue, LoginParams, LookupKey,
    NodeIdentity, RequestScope, ServiceIdentity, TokenLookup,
};

/// Auth method type served by `StaticIdentityValidator`
pub const STATIC_METHOD_TYPE: &str = "static";

/// Verified external identity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub attributes: BTreeMap<String, String>,
}

impl Identity {
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Verifies bearer credentials for one auth method type
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    async fn validate(&self, method: &AuthMethod, bearer_token: &str) -> AclResult<Identity>;
}

/// Validator for `static` auth methods.
///
/// The method's `Tokens` config maps each accepted bearer token to the
/// attributes of the identity it stands for:
///
/// ```json
/// { "Tokens": { "s3cr3t": { "team": "web", "user": "ana" } } }
/// ```
pub struct StaticIdentityValidator;

#[async_trait]
impl IdentityValidator for StaticIdentityValidator {
    async fn validate(&self, method: &AuthMethod, bearer_token: &str) -> AclResult<Identity> {
        let tokens = match method.config.get("Tokens") {
            Some(ConfigValue::Json(Value::Object(tokens))) => tokens,
            _ => {
                return Err(AclError::invalid(format!(
                    "auth method '{}' has no Tokens configured",
                    method.name
                )));
            }
        };
        let attributes = tokens.get(bearer_token).ok_or_else(|| {
            AclError::denied(format!(
                "bearer token rejected by auth method '{}'",
                method.name
            ))
        })?;

        let mut identity = Identity::default();
        if let Value::Object(attributes) = attributes {
            for (key, value) in attributes {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                identity.attributes.insert(key.clone(), value);
            }
        }
        Ok(identity)
    }
}

/// What the matching binding rules grant
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    pub roles: Vec<String>,
    pub policies: Vec<String>,
    pub services: Vec<String>,
    pub nodes: Vec<String>,
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.policies.is_empty()
            && self.services.is_empty()
            && self.nodes.is_empty()
    }

    fn add(&mut self, bind_type: BindType, name: String) {
        let target = match bind_type {
            BindType::Role => &mut self.roles,
            BindType::Policy => &mut self.policies,
            BindType::Service => &mut self.services,
            BindType::Node => &mut self.nodes,
        };
        if !target.contains(&name) {
            target.push(name);
        }
    }
}

/// Matches binding rules against an identity
pub trait BindingRuleEvaluator: Send + Sync {
    fn evaluate(&self, rules: &[BindingRule], identity: &Identity) -> AclResult<Bindings>;
}

/// Evaluator for selectors of the form `team == "web" and env != "prod"`.
/// An empty selector matches every identity. `${attr}` in a bind name is
/// replaced with the identity's attribute.
pub struct SelectorBindingEvaluator;

impl BindingRuleEvaluator for SelectorBindingEvaluator {
    fn evaluate(&self, rules: &[BindingRule], identity: &Identity) -> AclResult<Bindings> {
        let mut bindings = Bindings::default();
        for rule in rules {
            if !selector_matches(&rule.selector, identity)? {
                continue;
            }
            let name = expand_bind_name(&rule.bind_name, identity)?;
            debug!(rule = %rule.id, bind_type = ?rule.bind_type, name = %name, "Binding rule matched");
            bindings.add(rule.bind_type, name);
        }
        Ok(bindings)
    }
}

fn selector_matches(selector: &str, identity: &Identity) -> AclResult<bool> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Ok(true);
    }

    for clause in selector.split(" and ") {
        let clause = clause.trim();
        let (attr, expected, negate) = if let Some((attr, value)) = clause.split_once("!=") {
            (attr, value, true)
        } else if let Some((attr, value)) = clause.split_once("==") {
            (attr, value, false)
        } else {
            return Err(AclError::invalid(format!(
                "Invalid binding rule selector clause '{}'",
                clause
            )));
        };
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(AclError::invalid(format!(
                "Invalid binding rule selector clause '{}'",
                clause
            )));
        }
        let expected = expected.trim().trim_matches('"');
        let equal = identity.attributes.get(attr).map(String::as_str) == Some(expected);
        if equal == negate {
            return Ok(false);
        }
    }
    Ok(true)
}

fn expand_bind_name(template: &str, identity: &Identity) -> AclResult<String> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            AclError::invalid(format!("Unterminated variable in bind name '{}'", template))
        })?;
        let attr = after[..end].trim();
        let value = identity.attributes.get(attr).ok_or_else(|| {
            AclError::invalid(format!(
                "cannot compute bind name '{}': identity has no attribute '{}'",
                template, attr
            ))
        })?;
        expanded.push_str(value);
        rest = &after[end + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

/// Expiry of a token minted now by `method`. A TTL that cannot be parsed or
/// does not fit the timestamp range is rejected instead of ignored.
fn login_expiration(method: &AuthMethod) -> AclResult<Option<DateTime<Utc>>> {
    if method.max_token_ttl.is_empty() {
        return Ok(None);
    }
    let out_of_range = || {
        AclError::invalid(format!(
            "MaxTokenTTL '{}' of auth method '{}' is out of range",
            method.max_token_ttl, method.name
        ))
    };
    let ttl = method.max_token_ttl().ok_or_else(out_of_range)?;
    if ttl.is_zero() {
        return Ok(None);
    }
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .map(Some)
        .ok_or_else(out_of_range)
}

impl AclService {
    // ==================== Login Operations ====================

    /// Exchange a bearer credential for a new token.
    pub async fn login(&self, scope: &RequestScope, params: LoginParams) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        if params.auth_method.is_empty() {
            return Err(AclError::invalid("Missing required field 'AuthMethod'"));
        }
        if params.bearer_token.is_empty() {
            return Err(AclError::invalid("Missing required field 'BearerToken'"));
        }

        let mut scope = self.scope(scope);
        if !params.entity_meta.namespace.is_empty() || !params.entity_meta.partition.is_empty() {
            scope.meta = params.entity_meta.normalized();
        }

        let result = self.login_with_method(&scope, &params).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!("acl_login_total", "result" => outcome).increment(1);
        if let Err(e) = &result {
            warn!(auth_method = %params.auth_method, error = %e, "ACL login failed");
        }
        result
    }

    async fn login_with_method(
        &self,
        scope: &RequestScope,
        params: &LoginParams,
    ) -> AclResult<AclToken> {
        let method = self
            .store
            .auth_method_read(scope, &params.auth_method)
            .await?
            .map(AuthMethod::normalize_config)
            .ok_or_else(|| AclError::not_found(format!("auth method '{}'", params.auth_method)))?;
        let validator = self.validators.get(&method.method_type).ok_or_else(|| {
            AclError::invalid(format!(
                "auth method type '{}' is not supported",
                method.method_type
            ))
        })?;

        let identity = validator.validate(&method, &params.bearer_token).await?;
        let rules = self
            .store
            .binding_rule_list(scope, Some(method.name.as_str()))
            .await?;
        let bindings = self.binding_evaluator.evaluate(&rules, &identity)?;

        let mut roles = Vec::with_capacity(bindings.roles.len());
        for name in &bindings.roles {
            match self
                .store
                .role_read(scope, &LookupKey::Name(name.clone()))
                .await?
            {
                Some(role) => roles.push(role.link()),
                None => debug!(role = %name, "Skipping binding to unknown role"),
            }
        }
        let mut policies = Vec::with_capacity(bindings.policies.len());
        for name in &bindings.policies {
            match self
                .store
                .policy_read(scope, &LookupKey::Name(name.clone()))
                .await?
            {
                Some(policy) => policies.push(policy.link()),
                None => debug!(policy = %name, "Skipping binding to unknown policy"),
            }
        }
        let service_identities: Vec<ServiceIdentity> = bindings
            .services
            .into_iter()
            .map(|service_name| ServiceIdentity {
                service_name,
                datacenters: Vec::new(),
            })
            .collect();
        let node_identities: Vec<NodeIdentity> = bindings
            .nodes
            .into_iter()
            .map(|node_name| NodeIdentity {
                node_name,
                datacenter: self.config.datacenter.clone(),
            })
            .collect();

        if roles.is_empty()
            && policies.is_empty()
            && service_identities.is_empty()
            && node_identities.is_empty()
        {
            return Err(AclError::denied(format!(
                "binding rules of auth method '{}' granted nothing to this identity",
                method.name
            )));
        }

        let description = if params.meta.is_empty() {
            format!("token created via login to auth method '{}'", method.name)
        } else {
            let meta: BTreeMap<&String, &String> = params.meta.iter().collect();
            format!(
                "token created via login: {}",
                serde_json::to_string(&meta).unwrap_or_default()
            )
        };
        let expiration_time = login_expiration(&method)?;

        let token = AclToken {
            description,
            policies,
            roles,
            service_identities,
            node_identities,
            local: !method.mints_global_tokens(),
            auth_method: Some(method.name.clone()),
            expiration_time,
            meta: scope.meta.clone(),
            ..Default::default()
        };
        let token = self.store.token_set(scope, token, true).await?;
        info!(accessor_id = %token.accessor_id, auth_method = %method.name, "ACL login succeeded");
        Ok(token)
    }

    /// Destroy the token that made the request.
    pub async fn logout(&self, scope: &RequestScope) -> AclResult<()> {
        self.ensure_enabled()?;
        let secret = scope
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AclError::not_found("no token supplied for logout"))?;
        let scope = self.scope(scope);

        let token = self
            .store
            .token_read(&scope, &TokenLookup::Secret(secret.clone()))
            .await?
            .ok_or_else(|| AclError::not_found("ACL token not found"))?;
        if token.auth_method.is_none() {
            return Err(AclError::denied(
                "only tokens created by login can be logged out",
            ));
        }

        self.store.token_delete(&scope, &token.accessor_id).await?;
        self.resolver.invalidate(&secret);
        info!(accessor_id = %token.accessor_id, "ACL logout");
        Ok(())
    }
}
