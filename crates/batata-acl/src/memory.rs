// In-memory ACL store for standalone mode and tests
// Keeps every entity in DashMaps owned by the store instance, assigns raft-style
// indexes, and behaves like a single-datacenter replicated store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    ANONYMOUS_TOKEN_ID, AclPolicy, AclRole, AclToken, AuthMethod, BindingRule, ConfigValue,
    EntityMeta, LookupKey, MANAGEMENT_POLICY_ID, MANAGEMENT_POLICY_NAME, MANAGEMENT_RULES,
    POLICY_SYNTAX_CURRENT, PolicyLink, ReplicationStatus, RequestScope, RoleLink, TokenListFilter,
    TokenLookup,
};
use crate::store::AclStore;

const ANONYMOUS_TOKEN_SECRET: &str = "anonymous";

pub struct MemoryAclStore {
    datacenter: String,
    primary_datacenter: String,
    index: AtomicU64,
    bootstrapped: AtomicBool,
    bootstrap_index: AtomicU64,
    /// Tokens keyed by accessor ID
    tokens: DashMap<String, AclToken>,
    /// Secret ID -> accessor ID
    secrets: DashMap<String, String>,
    policies: DashMap<String, AclPolicy>,
    roles: DashMap<String, AclRole>,
    binding_rules: DashMap<String, BindingRule>,
    /// Auth methods keyed by partition/namespace/name
    auth_methods: DashMap<String, AuthMethod>,
}

impl MemoryAclStore {
    pub fn new(datacenter: impl Into<String>, primary_datacenter: impl Into<String>) -> Self {
        let datacenter = datacenter.into();
        let primary = primary_datacenter.into();
        let store = Self {
            primary_datacenter: if primary.is_empty() {
                datacenter.clone()
            } else {
                primary
            },
            datacenter,
            index: AtomicU64::new(0),
            bootstrapped: AtomicBool::new(false),
            bootstrap_index: AtomicU64::new(0),
            tokens: DashMap::new(),
            secrets: DashMap::new(),
            policies: DashMap::new(),
            roles: DashMap::new(),
            binding_rules: DashMap::new(),
            auth_methods: DashMap::new(),
        };
        store.init_anonymous_token();
        store
    }

    fn init_anonymous_token(&self) {
        let index = self.next_index();
        let token = AclToken {
            accessor_id: ANONYMOUS_TOKEN_ID.to_string(),
            secret_id: ANONYMOUS_TOKEN_SECRET.to_string(),
            description: "Anonymous Token".to_string(),
            create_time: Some(Utc::now()),
            meta: EntityMeta::default().normalized(),
            create_index: index,
            modify_index: index,
            ..Default::default()
        };
        self.insert_token(token);
    }

    /// Seed a management token with a well-known secret. Counts as the
    /// cluster's bootstrap.
    pub fn seed_management_token(&self, secret: &str) -> AclToken {
        self.ensure_management_policy();
        let token = self.management_token(secret.to_string(), "Initial Management Token");
        self.insert_token(token.clone());
        self.mark_bootstrapped();
        info!(accessor_id = %token.accessor_id, "Seeded initial management token");
        token
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mark_bootstrapped(&self) {
        if !self.bootstrapped.swap(true, Ordering::SeqCst) {
            self.bootstrap_index
                .store(self.index.load(Ordering::SeqCst), Ordering::SeqCst);
        }
    }

    fn check_datacenter(&self, scope: &RequestScope) -> StoreResult<()> {
        match scope.datacenter() {
            Some(dc) if dc != self.datacenter => Err(StoreError::Unreachable(dc.to_string())),
            _ => Ok(()),
        }
    }

    fn scoped_meta(entity: &EntityMeta, scope: &RequestScope) -> EntityMeta {
        if entity.namespace.is_empty() && entity.partition.is_empty() {
            scope.meta.normalized()
        } else {
            entity.normalized()
        }
    }

    fn ensure_management_policy(&self) {
        if self.policies.contains_key(MANAGEMENT_POLICY_ID) {
            return;
        }
        let index = self.next_index();
        let policy = AclPolicy {
            id: MANAGEMENT_POLICY_ID.to_string(),
            name: MANAGEMENT_POLICY_NAME.to_string(),
            description: "Builtin Policy that grants unlimited access".to_string(),
            rules: MANAGEMENT_RULES.to_string(),
            syntax: POLICY_SYNTAX_CURRENT,
            meta: EntityMeta::default().normalized(),
            create_index: index,
            modify_index: index,
            ..Default::default()
        };
        self.policies.insert(policy.id.clone(), policy);
    }

    fn management_token(&self, secret_id: String, description: &str) -> AclToken {
        let index = self.next_index();
        AclToken {
            accessor_id: uuid::Uuid::new_v4().to_string(),
            secret_id,
            description: description.to_string(),
            policies: vec![PolicyLink {
                id: MANAGEMENT_POLICY_ID.to_string(),
                name: MANAGEMENT_POLICY_NAME.to_string(),
            }],
            create_time: Some(Utc::now()),
            meta: EntityMeta::default().normalized(),
            create_index: index,
            modify_index: index,
            ..Default::default()
        }
    }

    fn insert_token(&self, token: AclToken) {
        self.secrets
            .insert(token.secret_id.clone(), token.accessor_id.clone());
        self.tokens.insert(token.accessor_id.clone(), token);
    }

    fn find_policy(&self, meta: &EntityMeta, key: &LookupKey) -> Option<AclPolicy> {
        match key {
            LookupKey::Id(id) => self.policies.get(id).map(|p| p.clone()),
            LookupKey::Name(name) => self
                .policies
                .iter()
                .find(|p| &p.name == name && p.meta.matches(meta))
                .map(|p| p.clone()),
        }
    }

    fn find_role(&self, meta: &EntityMeta, key: &LookupKey) -> Option<AclRole> {
        match key {
            LookupKey::Id(id) => self.roles.get(id).map(|r| r.clone()),
            LookupKey::Name(name) => self
                .roles
                .iter()
                .find(|r| &r.name == name && r.meta.matches(meta))
                .map(|r| r.clone()),
        }
    }

    /// Resolve policy links by ID (preferred) or name, filling in both.
    fn resolve_policy_links(
        &self,
        meta: &EntityMeta,
        links: &[PolicyLink],
    ) -> StoreResult<Vec<PolicyLink>> {
        let mut resolved: Vec<PolicyLink> = Vec::with_capacity(links.len());
        for link in links {
            let key = if link.id.is_empty() {
                LookupKey::Name(link.name.clone())
            } else {
                LookupKey::Id(link.id.clone())
            };
            let policy = self
                .find_policy(meta, &key)
                .ok_or_else(|| StoreError::Invalid(format!("cannot find policy with {}", key)))?;
            if !resolved.iter().any(|l| l.id == policy.id) {
                resolved.push(policy.link());
            }
        }
        Ok(resolved)
    }

    fn resolve_role_links(&self, meta: &EntityMeta, links: &[RoleLink]) -> StoreResult<Vec<RoleLink>> {
        let mut resolved: Vec<RoleLink> = Vec::with_capacity(links.len());
        for link in links {
            let key = if link.id.is_empty() {
                LookupKey::Name(link.name.clone())
            } else {
                LookupKey::Id(link.id.clone())
            };
            let role = self
                .find_role(meta, &key)
                .ok_or_else(|| StoreError::Invalid(format!("cannot find role with {}", key)))?;
            if !resolved.iter().any(|l| l.id == role.id) {
                resolved.push(role.link());
            }
        }
        Ok(resolved)
    }

    fn auth_method_key(meta: &EntityMeta, name: &str) -> String {
        let meta = meta.normalized();
        format!("{}/{}/{}", meta.partition, meta.namespace, name)
    }

    /// Strings are kept as raw bytes, the way the replicated log encodes them.
    fn encode_config(method: &mut AuthMethod) {
        for value in method.config.values_mut() {
            if let ConfigValue::Json(serde_json::Value::String(s)) = value {
                *value = ConfigValue::Bytes(s.as_bytes().to_vec());
            }
        }
    }
}

#[async_trait]
impl AclStore for MemoryAclStore {
    async fn bootstrap(&self, scope: &RequestScope) -> StoreResult<AclToken> {
        self.check_datacenter(scope)?;
        if self
            .bootstrapped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::BootstrapNotAllowed {
                reset_index: self.bootstrap_index.load(Ordering::SeqCst),
            });
        }

        self.ensure_management_policy();
        let token = self.management_token(
            uuid::Uuid::new_v4().to_string(),
            "Bootstrap Token (Global Management)",
        );
        self.bootstrap_index
            .store(token.create_index, Ordering::SeqCst);
        self.insert_token(token.clone());
        info!(accessor_id = %token.accessor_id, "ACL system bootstrapped");
        Ok(token)
    }

    async fn replication_status(&self, scope: &RequestScope) -> StoreResult<ReplicationStatus> {
        self.check_datacenter(scope)?;
        let replicating = self.datacenter != self.primary_datacenter;
        let index = self.index.load(Ordering::SeqCst);
        Ok(ReplicationStatus {
            enabled: replicating,
            running: replicating,
            source_datacenter: self.primary_datacenter.clone(),
            replication_type: if replicating { "tokens" } else { "" }.to_string(),
            replicated_index: if replicating { index } else { 0 },
            replicated_role_index: if replicating { index } else { 0 },
            replicated_token_index: if replicating { index } else { 0 },
            last_success: replicating.then(Utc::now),
            last_error: None,
            last_error_message: None,
        })
    }

    async fn token_read(
        &self,
        scope: &RequestScope,
        lookup: &TokenLookup,
    ) -> StoreResult<Option<AclToken>> {
        self.check_datacenter(scope)?;
        let accessor_id = match lookup {
            TokenLookup::Accessor(id) => id.clone(),
            TokenLookup::Secret(secret) => match self.secrets.get(secret) {
                Some(accessor) => accessor.clone(),
                None => return Ok(None),
            },
        };
        let now = Utc::now();
        Ok(self
            .tokens
            .get(&accessor_id)
            .map(|t| t.clone())
            .filter(|t| !t.is_expired(now)))
    }

    async fn token_set(
        &self,
        scope: &RequestScope,
        mut token: AclToken,
        create: bool,
    ) -> StoreResult<AclToken> {
        self.check_datacenter(scope)?;
        token.meta = Self::scoped_meta(&token.meta, scope);
        token.policies = self.resolve_policy_links(&token.meta, &token.policies)?;
        token.roles = self.resolve_role_links(&token.meta, &token.roles)?;
        let index = self.next_index();

        if create {
            if token.accessor_id.is_empty() {
                token.accessor_id = uuid::Uuid::new_v4().to_string();
            }
            if token.secret_id.is_empty() {
                token.secret_id = uuid::Uuid::new_v4().to_string();
            }
            if self.tokens.contains_key(&token.accessor_id)
                || self.secrets.contains_key(&token.secret_id)
            {
                return Err(StoreError::Conflict(format!(
                    "token with accessor '{}' already exists",
                    token.accessor_id
                )));
            }
            token.create_time = Some(Utc::now());
            token.create_index = index;
            token.modify_index = index;
            self.insert_token(token.clone());
            debug!(accessor_id = %token.accessor_id, "Created ACL token");
            return Ok(token);
        }

        let existing = self
            .tokens
            .get(&token.accessor_id)
            .map(|t| t.clone())
            .ok_or_else(|| StoreError::NotFound(format!("token '{}'", token.accessor_id)))?;
        if !token.secret_id.is_empty() && token.secret_id != existing.secret_id {
            return Err(StoreError::Invalid(
                "Changing a token's SecretID is not permitted".to_string(),
            ));
        }
        if token.local != existing.local {
            return Err(StoreError::Invalid(format!(
                "Cannot toggle local mode of token '{}'",
                token.accessor_id
            )));
        }
        token.secret_id = existing.secret_id;
        token.auth_method = existing.auth_method;
        token.expiration_time = existing.expiration_time;
        token.create_time = existing.create_time;
        token.create_index = existing.create_index;
        token.modify_index = index;
        self.tokens.insert(token.accessor_id.clone(), token.clone());
        debug!(accessor_id = %token.accessor_id, "Updated ACL token");
        Ok(token)
    }

    async fn token_clone(
        &self,
        scope: &RequestScope,
        accessor_id: &str,
        description: Option<String>,
    ) -> StoreResult<AclToken> {
        self.check_datacenter(scope)?;
        let source = self
            .tokens
            .get(accessor_id)
            .map(|t| t.clone())
            .filter(|t| !t.is_expired(Utc::now()))
            .ok_or_else(|| StoreError::NotFound(format!("token '{}'", accessor_id)))?;
        if source.auth_method.is_some() {
            return Err(StoreError::Invalid(
                "Cannot clone a token created from an auth method".to_string(),
            ));
        }

        let index = self.next_index();
        let token = AclToken {
            accessor_id: uuid::Uuid::new_v4().to_string(),
            secret_id: uuid::Uuid::new_v4().to_string(),
            description: description.unwrap_or_else(|| source.description.clone()),
            policies: source.policies.clone(),
            roles: source.roles.clone(),
            service_identities: source.service_identities.clone(),
            node_identities: source.node_identities.clone(),
            local: source.local,
            auth_method: None,
            expiration_time: source.expiration_time,
            create_time: Some(Utc::now()),
            meta: source.meta.clone(),
            create_index: index,
            modify_index: index,
        };
        self.insert_token(token.clone());
        debug!(source = %accessor_id, accessor_id = %token.accessor_id, "Cloned ACL token");
        Ok(token)
    }

    async fn token_delete(&self, scope: &RequestScope, accessor_id: &str) -> StoreResult<()> {
        self.check_datacenter(scope)?;
        if accessor_id == ANONYMOUS_TOKEN_ID {
            return Err(StoreError::Invalid(
                "Delete operation not permitted on the anonymous token".to_string(),
            ));
        }
        if let Some((_, token)) = self.tokens.remove(accessor_id) {
            self.secrets.remove(&token.secret_id);
            debug!(accessor_id = %accessor_id, "Deleted ACL token");
        }
        Ok(())
    }

    async fn token_list(
        &self,
        scope: &RequestScope,
        filter: &TokenListFilter,
    ) -> StoreResult<Vec<AclToken>> {
        self.check_datacenter(scope)?;
        let now = Utc::now();
        let mut tokens: Vec<AclToken> = self
            .tokens
            .iter()
            .filter(|t| t.meta.matches(&scope.meta) && !t.is_expired(now) && filter.matches(t))
            .map(|t| t.clone())
            .collect();
        tokens.sort_by_key(|t| t.create_index);
        Ok(tokens)
    }

    async fn policy_read(
        &self,
        scope: &RequestScope,
        key: &LookupKey,
    ) -> StoreResult<Option<AclPolicy>> {
        self.check_datacenter(scope)?;
        Ok(self.find_policy(&scope.meta, key))
    }

    async fn policy_set(&self, scope: &RequestScope, mut policy: AclPolicy) -> StoreResult<AclPolicy> {
        self.check_datacenter(scope)?;
        if policy.name.is_empty() {
            return Err(StoreError::Invalid("Invalid Policy: no Name is set".to_string()));
        }
        policy.meta = Self::scoped_meta(&policy.meta, scope);
        if let Some(other) = self.find_policy(&policy.meta, &LookupKey::Name(policy.name.clone()))
            && other.id != policy.id
        {
            return Err(StoreError::Conflict(format!(
                "Invalid Policy: A Policy with Name '{}' already exists",
                policy.name
            )));
        }

        let index = self.next_index();
        if policy.id.is_empty() {
            policy.id = uuid::Uuid::new_v4().to_string();
            policy.create_index = index;
        } else {
            let existing = self
                .policies
                .get(&policy.id)
                .map(|p| p.clone())
                .ok_or_else(|| StoreError::NotFound(format!("policy '{}'", policy.id)))?;
            if existing.id == MANAGEMENT_POLICY_ID
                && (existing.name != policy.name || existing.rules != policy.rules)
            {
                return Err(StoreError::Invalid(
                    "Changing the Rules or Name of the builtin global-management policy is not permitted"
                        .to_string(),
                ));
            }
            policy.create_index = existing.create_index;
        }
        policy.modify_index = index;
        self.policies.insert(policy.id.clone(), policy.clone());
        debug!(id = %policy.id, name = %policy.name, "Stored ACL policy");
        Ok(policy)
    }

    async fn policy_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.check_datacenter(scope)?;
        if id == MANAGEMENT_POLICY_ID {
            return Err(StoreError::Invalid(
                "Delete operation not permitted on the builtin global-management policy"
                    .to_string(),
            ));
        }
        self.policies.remove(id);
        Ok(())
    }

    async fn policy_list(&self, scope: &RequestScope) -> StoreResult<Vec<AclPolicy>> {
        self.check_datacenter(scope)?;
        let mut policies: Vec<AclPolicy> = self
            .policies
            .iter()
            .filter(|p| p.meta.matches(&scope.meta))
            .map(|p| p.clone())
            .collect();
        policies.sort_by_key(|p| p.create_index);
        Ok(policies)
    }

    async fn role_read(
        &self,
        scope: &RequestScope,
        key: &LookupKey,
    ) -> StoreResult<Option<AclRole>> {
        self.check_datacenter(scope)?;
        Ok(self.find_role(&scope.meta, key))
    }

    async fn role_set(&self, scope: &RequestScope, mut role: AclRole) -> StoreResult<AclRole> {
        self.check_datacenter(scope)?;
        if role.name.is_empty() {
            return Err(StoreError::Invalid("Invalid Role: no Name is set".to_string()));
        }
        role.meta = Self::scoped_meta(&role.meta, scope);
        if let Some(other) = self.find_role(&role.meta, &LookupKey::Name(role.name.clone()))
            && other.id != role.id
        {
            return Err(StoreError::Conflict(format!(
                "Invalid Role: A Role with Name '{}' already exists",
                role.name
            )));
        }
        role.policies = self.resolve_policy_links(&role.meta, &role.policies)?;

        let index = self.next_index();
        if role.id.is_empty() {
            role.id = uuid::Uuid::new_v4().to_string();
            role.create_index = index;
        } else {
            let existing = self
                .roles
                .get(&role.id)
                .map(|r| r.create_index)
                .ok_or_else(|| StoreError::NotFound(format!("role '{}'", role.id)))?;
            role.create_index = existing;
        }
        role.modify_index = index;
        self.roles.insert(role.id.clone(), role.clone());
        debug!(id = %role.id, name = %role.name, "Stored ACL role");
        Ok(role)
    }

    async fn role_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.check_datacenter(scope)?;
        self.roles.remove(id);
        Ok(())
    }

    async fn role_list(
        &self,
        scope: &RequestScope,
        policy: Option<&str>,
    ) -> StoreResult<Vec<AclRole>> {
        self.check_datacenter(scope)?;
        let mut roles: Vec<AclRole> = self
            .roles
            .iter()
            .filter(|r| r.meta.matches(&scope.meta))
            .filter(|r| {
                policy.is_none_or(|p| r.policies.iter().any(|l| l.id == p || l.name == p))
            })
            .map(|r| r.clone())
            .collect();
        roles.sort_by_key(|r| r.create_index);
        Ok(roles)
    }

    async fn binding_rule_read(
        &self,
        scope: &RequestScope,
        id: &str,
    ) -> StoreResult<Option<BindingRule>> {
        self.check_datacenter(scope)?;
        Ok(self.binding_rules.get(id).map(|r| r.clone()))
    }

    async fn binding_rule_set(
        &self,
        scope: &RequestScope,
        mut rule: BindingRule,
    ) -> StoreResult<BindingRule> {
        self.check_datacenter(scope)?;
        rule.meta = Self::scoped_meta(&rule.meta, scope);
        if !self
            .auth_methods
            .contains_key(&Self::auth_method_key(&rule.meta, &rule.auth_method))
        {
            return Err(StoreError::Invalid(format!(
                "Invalid Binding Rule: unknown auth method '{}'",
                rule.auth_method
            )));
        }
        if rule.bind_name.is_empty() {
            return Err(StoreError::Invalid(
                "Invalid Binding Rule: no BindName is set".to_string(),
            ));
        }

        let index = self.next_index();
        if rule.id.is_empty() {
            rule.id = uuid::Uuid::new_v4().to_string();
            rule.create_index = index;
        } else {
            let existing = self
                .binding_rules
                .get(&rule.id)
                .map(|r| (r.create_index, r.auth_method.clone()))
                .ok_or_else(|| StoreError::NotFound(format!("binding rule '{}'", rule.id)))?;
            if existing.1 != rule.auth_method {
                return Err(StoreError::Invalid(
                    "Binding rule auth method cannot be changed".to_string(),
                ));
            }
            rule.create_index = existing.0;
        }
        rule.modify_index = index;
        self.binding_rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn binding_rule_delete(&self, scope: &RequestScope, id: &str) -> StoreResult<()> {
        self.check_datacenter(scope)?;
        self.binding_rules.remove(id);
        Ok(())
    }

    async fn binding_rule_list(
        &self,
        scope: &RequestScope,
        auth_method: Option<&str>,
    ) -> StoreResult<Vec<BindingRule>> {
        self.check_datacenter(scope)?;
        let mut rules: Vec<BindingRule> = self
            .binding_rules
            .iter()
            .filter(|r| r.meta.matches(&scope.meta))
            .filter(|r| auth_method.is_none_or(|m| r.auth_method == m))
            .map(|r| r.clone())
            .collect();
        rules.sort_by_key(|r| r.create_index);
        Ok(rules)
    }

    async fn auth_method_read(
        &self,
        scope: &RequestScope,
        name: &str,
    ) -> StoreResult<Option<AuthMethod>> {
        self.check_datacenter(scope)?;
        Ok(self
            .auth_methods
            .get(&Self::auth_method_key(&scope.meta, name))
            .map(|m| m.clone()))
    }

    async fn auth_method_set(
        &self,
        scope: &RequestScope,
        mut method: AuthMethod,
    ) -> StoreResult<AuthMethod> {
        self.check_datacenter(scope)?;
        if method.name.is_empty() {
            return Err(StoreError::Invalid("Invalid Auth Method: no Name is set".to_string()));
        }
        if method.method_type.is_empty() {
            return Err(StoreError::Invalid("Invalid Auth Method: no Type is set".to_string()));
        }
        method.meta = Self::scoped_meta(&method.meta, scope);
        let key = Self::auth_method_key(&method.meta, &method.name);

        let index = self.next_index();
        match self.auth_methods.get(&key).map(|m| (m.create_index, m.method_type.clone())) {
            Some((create_index, method_type)) => {
                if method_type != method.method_type {
                    return Err(StoreError::Invalid(
                        "Cannot change the Type of an auth method".to_string(),
                    ));
                }
                method.create_index = create_index;
            }
            None => method.create_index = index,
        }
        method.modify_index = index;
        Self::encode_config(&mut method);
        self.auth_methods.insert(key, method.clone());
        debug!(name = %method.name, "Stored ACL auth method");
        Ok(method)
    }

    async fn auth_method_delete(&self, scope: &RequestScope, name: &str) -> StoreResult<()> {
        self.check_datacenter(scope)?;
        let key = Self::auth_method_key(&scope.meta, name);
        if self.auth_methods.remove(&key).is_none() {
            return Ok(());
        }
        self.binding_rules.retain(|_, r| r.auth_method != name);
        let minted: Vec<AclToken> = self
            .tokens
            .iter()
            .filter(|t| t.auth_method.as_deref() == Some(name))
            .map(|t| t.clone())
            .collect();
        for token in minted {
            self.tokens.remove(&token.accessor_id);
            self.secrets.remove(&token.secret_id);
        }
        info!(name = %name, "Deleted ACL auth method with its binding rules and tokens");
        Ok(())
    }

    async fn auth_method_list(&self, scope: &RequestScope) -> StoreResult<Vec<AuthMethod>> {
        self.check_datacenter(scope)?;
        let mut methods: Vec<AuthMethod> = self
            .auth_methods
            .iter()
            .filter(|m| m.meta.matches(&scope.meta))
            .map(|m| m.clone())
            .collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(methods)
    }
}
