//! Token resolution
//!
//! Turns a secret into an `Authorizer` plus the token behind it. Resolution is
//! local-first: the local store view is consulted before any remote round
//! trip, and results are kept in a TTL cache keyed by secret until a mutation
//! through the service invalidates them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use moka::sync::Cache;
use tracing::{debug, warn};

use crate::authorizer::{Authorizer, ParsedRules, RuleAuthorizer};
use crate::config::AclConfig;
use crate::error::{AclError, AclResult};
use crate::model::{
    ANONYMOUS_TOKEN_ID, AclPolicy, AclToken, EntityMeta, LookupKey, RequestScope, TokenLookup,
};
use crate::remote::{AclRemote, with_deadline};
use crate::store::AclStore;

/// A token resolved into something that can answer permission questions
#[derive(Clone)]
pub struct ResolvedToken {
    /// `None` when an empty secret fell back to the default policy.
    pub token: Option<AclToken>,
    pub authorizer: Arc<dyn Authorizer>,
    /// Entity context for questions that carry none of their own
    pub meta: EntityMeta,
}

impl ResolvedToken {
    pub fn accessor_id(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.accessor_id.as_str())
    }
}

impl fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("accessor_id", &self.accessor_id())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

pub struct TokenResolver {
    config: Arc<AclConfig>,
    store: Arc<dyn AclStore>,
    remote: Option<Arc<dyn AclRemote>>,
    cache: Cache<String, Arc<ResolvedToken>>,
}

impl TokenResolver {
    pub fn new(
        config: Arc<AclConfig>,
        store: Arc<dyn AclStore>,
        remote: Option<Arc<dyn AclRemote>>,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.token_cache_capacity)
            .time_to_live(config.token_ttl())
            .build();
        Self {
            config,
            store,
            remote,
            cache,
        }
    }

    /// Resolve `secret`. An empty secret resolves to the anonymous token, or
    /// to the default policy when no anonymous token exists.
    pub async fn resolve(&self, secret: &str) -> AclResult<Arc<ResolvedToken>> {
        if let Some(hit) = self.cache.get(secret) {
            if hit
                .token
                .as_ref()
                .is_some_and(|t| t.is_expired(Utc::now()))
            {
                self.cache.invalidate(secret);
                return Err(AclError::not_found("ACL token expired"));
            }
            counter!("acl_token_cache_hits_total").increment(1);
            return Ok(hit);
        }
        counter!("acl_token_cache_misses_total").increment(1);

        let resolved = if secret.is_empty() {
            self.resolve_anonymous().await?
        } else {
            let token = self
                .lookup_token(secret)
                .await?
                .ok_or_else(|| AclError::not_found("ACL token not found"))?;
            if token.is_expired(Utc::now()) {
                return Err(AclError::not_found("ACL token expired"));
            }
            self.build(secret, token).await?
        };

        let resolved = Arc::new(resolved);
        self.cache.insert(secret.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Drop every cached resolution.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn invalidate(&self, secret: &str) {
        self.cache.invalidate(secret);
    }

    fn local_scope(&self) -> RequestScope {
        RequestScope::new().with_datacenter(&self.config.datacenter)
    }

    /// Remote authority to fall back on. Only secondaries have one.
    fn fallback(&self) -> Option<(&dyn AclRemote, &str)> {
        if self.config.is_primary() {
            return None;
        }
        self.remote
            .as_deref()
            .map(|remote| (remote, self.config.primary_datacenter()))
    }

    async fn resolve_anonymous(&self) -> AclResult<ResolvedToken> {
        let anonymous = self
            .store
            .token_read(
                &self.local_scope(),
                &TokenLookup::Accessor(ANONYMOUS_TOKEN_ID.to_string()),
            )
            .await?;
        match anonymous {
            Some(token) => self.build("", token).await,
            None => Ok(ResolvedToken {
                token: None,
                authorizer: Arc::new(RuleAuthorizer::from_default(self.config.default_policy)),
                meta: EntityMeta::default().normalized(),
            }),
        }
    }

    async fn lookup_token(&self, secret: &str) -> AclResult<Option<AclToken>> {
        let local = self
            .store
            .token_read(&self.local_scope(), &TokenLookup::Secret(secret.to_string()))
            .await?;
        if local.is_some() {
            return Ok(local);
        }

        let Some((remote, primary)) = self.fallback() else {
            return Ok(None);
        };
        debug!(datacenter = %primary, "Token not replicated locally, resolving remotely");
        with_deadline(
            self.config.request_timeout(),
            primary,
            remote.resolve_token(primary, secret),
        )
        .await
    }

    async fn build(&self, secret: &str, token: AclToken) -> AclResult<ResolvedToken> {
        let scope = self.local_scope().with_meta(token.meta.clone());
        let mut policy_ids: Vec<String> = token.policies.iter().map(|l| l.id.clone()).collect();

        let mut missing_roles = Vec::new();
        for link in &token.roles {
            match self
                .store
                .role_read(&scope, &LookupKey::Id(link.id.clone()))
                .await?
            {
                Some(role) => policy_ids.extend(role.policies.into_iter().map(|l| l.id)),
                None => missing_roles.push(link.id.clone()),
            }
        }
        if !missing_roles.is_empty()
            && let Some((remote, primary)) = self.fallback()
        {
            let roles = with_deadline(
                self.config.request_timeout(),
                primary,
                remote.resolve_roles(primary, secret, &missing_roles),
            )
            .await?;
            for role in roles {
                policy_ids.extend(role.policies.into_iter().map(|l| l.id));
            }
        }

        let mut seen = HashSet::new();
        policy_ids.retain(|id| seen.insert(id.clone()));

        let mut policies: Vec<AclPolicy> = Vec::with_capacity(policy_ids.len());
        let mut missing_policies = Vec::new();
        for id in policy_ids {
            match self
                .store
                .policy_read(&scope, &LookupKey::Id(id.clone()))
                .await?
            {
                Some(policy) => policies.push(policy),
                None => missing_policies.push(id),
            }
        }
        if !missing_policies.is_empty() {
            match self.fallback() {
                Some((remote, primary)) => policies.extend(
                    with_deadline(
                        self.config.request_timeout(),
                        primary,
                        remote.resolve_policies(primary, secret, &missing_policies),
                    )
                    .await?,
                ),
                None => warn!(
                    accessor_id = %token.accessor_id,
                    missing = ?missing_policies,
                    "Token links policies that no longer exist"
                ),
            }
        }

        let datacenter = self.config.datacenter.as_str();
        let mut rules = ParsedRules::default();
        for policy in policies.iter().filter(|p| p.applies_to(datacenter)) {
            rules.extend(&policy.rules);
        }
        for identity in token
            .service_identities
            .iter()
            .filter(|s| s.applies_to(datacenter))
        {
            rules.extend(&identity.rules());
        }
        for identity in token
            .node_identities
            .iter()
            .filter(|n| n.datacenter == datacenter)
        {
            rules.extend(&identity.rules());
        }

        debug!(accessor_id = %token.accessor_id, policies = policies.len(), "Resolved ACL token");
        Ok(ResolvedToken {
            meta: token.meta.normalized(),
            authorizer: Arc::new(RuleAuthorizer::new(rules, self.config.default_policy)),
            token: Some(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::authorizer::{Access, AuthorizerContext, Decision, Resource};
    use crate::config::DefaultPolicy;
    use crate::memory::MemoryAclStore;
    use crate::model::{AclRole, PolicyLink, RoleLink, ServiceIdentity};
    use crate::testing::{CountingStore, ScriptedRemote};

    fn config() -> Arc<AclConfig> {
        Arc::new(AclConfig::default())
    }

    fn scope() -> RequestScope {
        RequestScope::new().with_datacenter("dc1")
    }

    async fn store_with_reader() -> (Arc<MemoryAclStore>, AclToken) {
        let store = Arc::new(MemoryAclStore::new("dc1", ""));
        let policy = store
            .policy_set(
                &scope(),
                AclPolicy {
                    name: "web-read".to_string(),
                    rules: r#"service_prefix "web" { policy = "read" }"#.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let role = store
            .role_set(
                &scope(),
                AclRole {
                    name: "kv".to_string(),
                    policies: vec![PolicyLink {
                        id: String::new(),
                        name: "web-read".to_string(),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(role.policies[0].id, policy.id);
        let token = store
            .token_set(
                &scope(),
                AclToken {
                    roles: vec![RoleLink {
                        id: role.id.clone(),
                        name: String::new(),
                    }],
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();
        (store, token)
    }

    #[tokio::test]
    async fn test_resolves_policies_through_roles() {
        let (store, token) = store_with_reader().await;
        let resolver = TokenResolver::new(config(), store, None);
        let resolved = resolver.resolve(&token.secret_id).await.unwrap();

        assert_eq!(resolved.accessor_id(), Some(token.accessor_id.as_str()));
        let ctx = AuthorizerContext::default();
        assert_eq!(
            resolved
                .authorizer
                .allowed(Resource::Service, "web-1", Access::Read, &ctx),
            Decision::Allow
        );
        assert_eq!(
            resolved
                .authorizer
                .allowed(Resource::Service, "web-1", Access::Write, &ctx),
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn test_unknown_secret_not_found() {
        let resolver = TokenResolver::new(config(), Arc::new(MemoryAclStore::new("dc1", "")), None);
        let err = resolver.resolve("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_empty_secret_uses_anonymous_token() {
        let resolver = TokenResolver::new(config(), Arc::new(MemoryAclStore::new("dc1", "")), None);
        let resolved = resolver.resolve("").await.unwrap();
        assert_eq!(resolved.accessor_id(), Some(ANONYMOUS_TOKEN_ID));
        assert_eq!(
            resolved.authorizer.allowed(
                Resource::Key,
                "a",
                Access::Read,
                &AuthorizerContext::default()
            ),
            Decision::Default
        );
    }

    #[tokio::test]
    async fn test_empty_secret_without_anonymous_uses_default_policy() {
        let store = Arc::new(CountingStore::empty());
        let config = Arc::new(AclConfig {
            default_policy: DefaultPolicy::Allow,
            ..AclConfig::default()
        });
        let resolver = TokenResolver::new(config, store, None);
        let resolved = resolver.resolve("").await.unwrap();
        assert!(resolved.token.is_none());
        assert!(
            resolved
                .authorizer
                .allowed(
                    Resource::Operator,
                    "",
                    Access::Write,
                    &AuthorizerContext::default()
                )
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn test_cache_avoids_second_store_read() {
        let (memory, token) = store_with_reader().await;
        let store = Arc::new(CountingStore::new(memory));
        let resolver = TokenResolver::new(config(), store.clone(), None);

        resolver.resolve(&token.secret_id).await.unwrap();
        let reads = store.token_reads.load(Ordering::SeqCst);
        resolver.resolve(&token.secret_id).await.unwrap();
        assert_eq!(store.token_reads.load(Ordering::SeqCst), reads);

        resolver.invalidate_all();
        resolver.resolve(&token.secret_id).await.unwrap();
        assert_eq!(store.token_reads.load(Ordering::SeqCst), reads + 1);
    }

    #[tokio::test]
    async fn test_expired_token_not_found() {
        let store = Arc::new(MemoryAclStore::new("dc1", ""));
        let token = store
            .token_set(
                &scope(),
                AclToken {
                    expiration_time: Some(Utc::now() - chrono::Duration::seconds(5)),
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();
        let resolver = TokenResolver::new(config(), store, None);
        assert!(resolver.resolve(&token.secret_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_secondary_falls_back_to_primary() {
        let config = Arc::new(AclConfig {
            datacenter: "dc2".to_string(),
            primary_datacenter: "dc1".to_string(),
            ..AclConfig::default()
        });
        let remote = Arc::new(ScriptedRemote::default());
        remote.tokens.insert(
            "global-secret".to_string(),
            AclToken {
                accessor_id: "acc-1".to_string(),
                service_identities: vec![ServiceIdentity {
                    service_name: "api".to_string(),
                    datacenters: vec![],
                }],
                ..Default::default()
            },
        );
        let resolver = TokenResolver::new(
            config,
            Arc::new(MemoryAclStore::new("dc2", "dc1")),
            Some(remote.clone()),
        );

        let resolved = resolver.resolve("global-secret").await.unwrap();
        assert_eq!(resolved.accessor_id(), Some("acc-1"));
        assert!(
            resolved
                .authorizer
                .allowed(
                    Resource::Service,
                    "api",
                    Access::Write,
                    &AuthorizerContext::default()
                )
                .is_allowed()
        );
        assert_eq!(remote.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_primary_never_calls_remote() {
        let remote = Arc::new(ScriptedRemote::default());
        let resolver = TokenResolver::new(
            config(),
            Arc::new(MemoryAclStore::new("dc1", "")),
            Some(remote.clone()),
        );
        assert!(resolver.resolve("unknown").await.is_err());
        assert_eq!(remote.token_calls.load(Ordering::SeqCst), 0);
    }
}
