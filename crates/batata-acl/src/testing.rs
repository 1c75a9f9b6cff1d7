// Collaborator doubles shared by the unit tests

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{AclResult, StoreResult};
use crate::memory::MemoryAclStore;
use crate::model::{
    ANONYMOUS_TOKEN_ID, AclPolicy, AclRole, AclToken, AuthMethod, AuthorizationRequest,
    AuthorizationResponse, BindingRule, LookupKey, ReplicationStatus, RequestScope,
    TokenListFilter, TokenLookup,
};
use crate::remote::AclRemote;
use crate::store::AclStore;

/// Store wrapper counting every call that reaches it
pub struct CountingStore {
    inner: Arc<MemoryAclStore>,
    anonymous: bool,
    pub calls: AtomicUsize,
    pub token_reads: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<MemoryAclStore>) -> Self {
        Self {
            inner,
            anonymous: true,
            calls: AtomicUsize::new(0),
            token_reads: AtomicUsize::new(0),
        }
    }

    /// A store that has no anonymous token.
    pub fn empty() -> Self {
        Self {
            anonymous: false,
            ..Self::new(Arc::new(MemoryAclStore::new("dc1", "")))
        }
    }

    pub fn total(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AclStore for CountingStore {
    async fn bootstrap(&self, scope: &RequestScope) -> StoreResult<AclToken> {
        self.hit();
        self.inner.bootstrap(scope).await
    }

    async fn replication_status(&self, scope: &RequestScope) -> StoreResult<ReplicationStatus> {
        self.hit();
        self.inner.replication_status(scope).await
    }

    async fn token_read(
        &self,
        scope: &RequestScope,
        lookup: &TokenLookup,
    ) -> StoreResult<Option<AclToken>> {
        self.hit();
        self.token_reads.fetch_add(1, Ordering::SeqCst);
        if !self.anonymous
            && *lookup == TokenLookup::Accessor(ANONYMOUS_TOKEN_ID.to_string())
        {
            return Ok(None);
        }
        self.inner.token_read(scope, lookup).await
    }

    async fn token_set(
        &self,
        scope: &RequestScope,
        token: AclToken,
        create: bool,
    ) -> StoreResult<AclToken> {
        self.hit();
        self.inner.token_set(scope, token, create).await
    }

    async fn token_clone(
        &self,
        scope: &RequestScope,
        accessor_id: &str,
        description: Option<String>,
    ) -> StoreResult<AclToken> {
        self.hit();
        self.inner.token_clone(scope, accessor_id, description).await
    }

    async fn token_delete(&self, scope: &RequestScope, accessor_id: &str) -> StoreResult<()> {
        self.hit();
        self.inner.token_delete(scope, accessor_id).await
    }

    async fn token_list(
        &self,
        scope: &RequestScope,
        filter: &TokenListFilter,
    ) -> StoreResult<Vec<AclToken>> {
        self.hit();
        self.inner.token_list(scope, filter).await
    }

    async fn policy_read(
        &self,
        scope: &RequestScope,
        key: &LookupKey,
    ) -> StoreResult<Option<AclPolicy>> {
        self.hit();
        self.inner.policy_read(scope, key).await
    }

    async fn policy_set(&self, scope: &RequestScope, policy: AclPolicy) -> StoreResult<AclPolicy> {
        self.hit();
        self.inner.policy_set(scope, policy).await
    }

    async fn policy_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.hit();
        self.inner.policy_delete(scope, id).await
    }

    async fn policy_list(&self, scope: &RequestScope) -> StoreResult<Vec<AclPolicy>> {
        self.hit();
        self.inner.policy_list(scope).await
    }

    async fn role_read(
        &self,
        scope: &RequestScope,
        key: &LookupKey,
    ) -> StoreResult<Option<AclRole>> {
        self.hit();
        self.inner.role_read(scope, key).await
    }

    async fn role_set(&self, scope: &RequestScope, role: AclRole) -> StoreResult<AclRole> {
        self.hit();
        self.inner.role_set(scope, role).await
    }

    async fn role_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.hit();
        self.inner.role_delete(scope, id).await
    }

    async fn role_list(
        &self,
        scope: &RequestScope,
        policy: Option<&str>,
    ) -> StoreResult<Vec<AclRole>> {
        self.hit();
        self.inner.role_list(scope, policy).await
    }

    async fn binding_rule_read(
        &self,
        scope: &RequestScope,
        id: &str,
    ) -> StoreResult<Option<BindingRule>> {
        self.hit();
        self.inner.binding_rule_read(scope, id).await
    }

    async fn binding_rule_set(
        &self,
        scope: &RequestScope,
        rule: BindingRule,
    ) -> StoreResult<BindingRule> {
        self.hit();
        self.inner.binding_rule_set(scope, rule).await
    }

    async fn binding_rule_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.hit();
        self.inner.binding_rule_delete(scope, id).await
    }

    async fn binding_rule_list(
        &self,
        scope: &RequestScope,
        auth_method: Option<&str>,
    ) -> StoreResult<Vec<BindingRule>> {
        self.hit();
        self.inner.binding_rule_list(scope, auth_method).await
    }

    async fn auth_method_read(
        &self,
        scope: &RequestScope,
        name: &str,
    ) -> StoreResult<Option<AuthMethod>> {
        self.hit();
        self.inner.auth_method_read(scope, name).await
    }

    async fn auth_method_set(
        &self,
        scope: &RequestScope,
        method: AuthMethod,
    ) -> StoreResult<AuthMethod> {
        self.hit();
        self.inner.auth_method_set(scope, method).await
    }

    async fn auth_method_delete(&self, scope: &RequestScope, name: &str) -> StoreResult<()> {
        self.hit();
        self.inner.auth_method_delete(scope, name).await
    }

    async fn auth_method_list(&self, scope: &RequestScope) -> StoreResult<Vec<AuthMethod>> {
        self.hit();
        self.inner.auth_method_list(scope).await
    }
}

/// Remote authority answering from canned data
#[derive(Default)]
pub struct ScriptedRemote {
    pub tokens: DashMap<String, AclToken>,
    /// Replaces the computed batch answer when set.
    pub responses: Mutex<Option<Vec<AuthorizationResponse>>>,
    pub delay: Option<Duration>,
    pub authorize_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst) + self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AclRemote for ScriptedRemote {
    async fn authorize(
        &self,
        _datacenter: &str,
        _secret: &str,
        requests: &[AuthorizationRequest],
    ) -> AclResult<Vec<AuthorizationResponse>> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(scripted) = self.responses.lock().unwrap().clone() {
            return Ok(scripted);
        }
        Ok(requests
            .iter()
            .map(|r| AuthorizationResponse {
                request: r.clone(),
                allow: r.access == "read",
                reason: String::new(),
            })
            .collect())
    }

    async fn resolve_token(&self, _datacenter: &str, secret: &str) -> AclResult<Option<AclToken>> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.tokens.get(secret).map(|t| t.clone()))
    }

    async fn resolve_policies(
        &self,
        _datacenter: &str,
        _secret: &str,
        _ids: &[String],
    ) -> AclResult<Vec<AclPolicy>> {
        Ok(Vec::new())
    }

    async fn resolve_roles(
        &self,
        _datacenter: &str,
        _secret: &str,
        _ids: &[String],
    ) -> AclResult<Vec<AclRole>> {
        Ok(Vec::new())
    }
}
