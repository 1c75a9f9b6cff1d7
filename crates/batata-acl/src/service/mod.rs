//! ACL management service
//!
//! `AclService` is the capability interface any transport adapts: one method
//! per operation, each taking the implicit `RequestScope`. Every operation
//! checks the configured enabled switch before doing anything else.

mod auth_method;
mod binding_rule;
mod bootstrap;
mod login;
mod policy;
mod role;
mod token;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AclConfig;
use crate::error::{AclError, AclResult};
use crate::model::RequestScope;
use crate::remote::AclRemote;
use crate::resolver::TokenResolver;
use crate::store::AclStore;

pub use login::{
    BindingRuleEvaluator, Bindings, Identity, IdentityValidator, STATIC_METHOD_TYPE,
    SelectorBindingEvaluator, StaticIdentityValidator,
};

pub struct AclService {
    config: Arc<AclConfig>,
    store: Arc<dyn AclStore>,
    remote: Option<Arc<dyn AclRemote>>,
    resolver: TokenResolver,
    validators: HashMap<String, Arc<dyn IdentityValidator>>,
    binding_evaluator: Arc<dyn BindingRuleEvaluator>,
}

impl AclService {
    pub fn new(config: AclConfig, store: Arc<dyn AclStore>) -> Self {
        let config = Arc::new(config);
        let resolver = TokenResolver::new(config.clone(), store.clone(), None);
        let mut validators: HashMap<String, Arc<dyn IdentityValidator>> = HashMap::new();
        validators.insert(
            STATIC_METHOD_TYPE.to_string(),
            Arc::new(StaticIdentityValidator),
        );
        Self {
            config,
            store,
            remote: None,
            resolver,
            validators,
            binding_evaluator: Arc::new(SelectorBindingEvaluator),
        }
    }

    /// Attach the remote authority used for cross-datacenter forwarding.
    pub fn with_remote(mut self, remote: Arc<dyn AclRemote>) -> Self {
        self.resolver =
            TokenResolver::new(self.config.clone(), self.store.clone(), Some(remote.clone()));
        self.remote = Some(remote);
        self
    }

    /// Register the identity validator for auth methods of `method_type`.
    pub fn with_identity_validator(
        mut self,
        method_type: impl Into<String>,
        validator: Arc<dyn IdentityValidator>,
    ) -> Self {
        self.validators.insert(method_type.into(), validator);
        self
    }

    pub fn with_binding_evaluator(mut self, evaluator: Arc<dyn BindingRuleEvaluator>) -> Self {
        self.binding_evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    pub(crate) fn remote(&self) -> Option<&dyn AclRemote> {
        self.remote.as_deref()
    }

    pub fn ensure_enabled(&self) -> AclResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(AclError::Disabled)
        }
    }

    /// Fill the implicit context: datacenter defaults to this node's.
    pub(crate) fn scope(&self, scope: &RequestScope) -> RequestScope {
        let mut scope = scope.clone();
        if scope.datacenter.is_none() {
            scope.datacenter = Some(self.config.datacenter.clone());
        }
        scope.meta = scope.meta.normalized();
        scope
    }

    pub(crate) fn is_local(&self, datacenter: Option<&str>) -> bool {
        datacenter.is_none_or(|dc| dc == self.config.datacenter)
    }

    /// Cached resolutions may carry stale grants after any token, policy or
    /// role write.
    fn grants_changed(&self) {
        self.resolver.invalidate_all();
    }
}

/// Reject an identifier the caller tried to choose on create.
fn reject_client_id(entity: &str, field: &str, id: &str) -> AclResult<()> {
    if id.is_empty() {
        Ok(())
    } else {
        Err(AclError::invalid(format!(
            "Cannot specify the {} when creating a new {}",
            field, entity
        )))
    }
}

/// Payload ID must equal the target, or be empty and take the target's.
fn reconcile_id(kind: &str, target: &str, payload: &mut String) -> AclResult<()> {
    if target.is_empty() {
        return Err(AclError::invalid(format!("Missing {} ID", kind)));
    }
    if payload.is_empty() {
        *payload = target.to_string();
        Ok(())
    } else if payload != target {
        Err(AclError::invalid(format!(
            "{} ID in URL and payload do not match",
            kind
        )))
    } else {
        Ok(())
    }
}
