//! Entity store contract
//!
//! `AclStore` is the replicated store holding ACL records. Every call carries
//! the request scope; the datacenter in it is always filled in by the service
//! before the store is reached. Implementations route calls for other
//! datacenters, enforce name uniqueness within a partition, assign indexes,
//! and generate identifiers on create.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{
    AclPolicy, AclRole, AclToken, AuthMethod, BindingRule, LookupKey, ReplicationStatus,
    RequestScope, TokenListFilter, TokenLookup,
};

#[async_trait]
pub trait AclStore: Send + Sync {
    // ==================== Cluster Operations ====================

    /// Mint the first management token. Fails with
    /// `StoreError::BootstrapNotAllowed` once the cluster is bootstrapped.
    async fn bootstrap(&self, scope: &RequestScope) -> StoreResult<AclToken>;

    /// Replication health of the node serving `scope.datacenter`.
    async fn replication_status(&self, scope: &RequestScope) -> StoreResult<ReplicationStatus>;

    // ==================== Token Operations ====================

    async fn token_read(
        &self,
        scope: &RequestScope,
        lookup: &TokenLookup,
    ) -> StoreResult<Option<AclToken>>;

    /// Create (`create == true`) or update a token. On create the store
    /// generates `AccessorID` and `SecretID`.
    async fn token_set(
        &self,
        scope: &RequestScope,
        token: AclToken,
        create: bool,
    ) -> StoreResult<AclToken>;

    /// Mint a new token carrying the grants of `accessor_id`.
    async fn token_clone(
        &self,
        scope: &RequestScope,
        accessor_id: &str,
        description: Option<String>,
    ) -> StoreResult<AclToken>;

    /// Deleting a missing token is not an error.
    async fn token_delete(&self, scope: &RequestScope, accessor_id: &str) -> StoreResult<()>;

    async fn token_list(
        &self,
        scope: &RequestScope,
        filter: &TokenListFilter,
    ) -> StoreResult<Vec<AclToken>>;

    // ==================== Policy Operations ====================

    async fn policy_read(
        &self,
        scope: &RequestScope,
        key: &LookupKey,
    ) -> StoreResult<Option<AclPolicy>>;

    async fn policy_set(&self, scope: &RequestScope, policy: AclPolicy) -> StoreResult<AclPolicy>;

    async fn policy_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()>;

    async fn policy_list(&self, scope: &RequestScope) -> StoreResult<Vec<AclPolicy>>;

    // ==================== Role Operations ====================

    async fn role_read(&self, scope: &RequestScope, key: &LookupKey)
    -> StoreResult<Option<AclRole>>;

    async fn role_set(&self, scope: &RequestScope, role: AclRole) -> StoreResult<AclRole>;

    async fn role_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()>;

    async fn role_list(&self, scope: &RequestScope, policy: Option<&str>)
    -> StoreResult<Vec<AclRole>>;

    // ==================== Binding Rule Operations ====================

    async fn binding_rule_read(
        &self,
        scope: &RequestScope,
        id: &str,
    ) -> StoreResult<Option<BindingRule>>;

    async fn binding_rule_set(
        &self,
        scope: &RequestScope,
        rule: BindingRule,
    ) -> StoreResult<BindingRule>;

    async fn binding_rule_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()>;

    async fn binding_rule_list(
        &self,
        scope: &RequestScope,
        auth_method: Option<&str>,
    ) -> StoreResult<Vec<BindingRule>>;

    // ==================== Auth Method Operations ====================

    async fn auth_method_read(
        &self,
        scope: &RequestScope,
        name: &str,
    ) -> StoreResult<Option<AuthMethod>>;

    async fn auth_method_set(
        &self,
        scope: &RequestScope,
        method: AuthMethod,
    ) -> StoreResult<AuthMethod>;

    async fn auth_method_delete(&self, scope: &RequestScope, name: &str) -> StoreResult<()>;

    async fn auth_method_list(&self, scope: &RequestScope) -> StoreResult<Vec<AuthMethod>>;
}
