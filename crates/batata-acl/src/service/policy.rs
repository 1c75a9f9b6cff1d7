use tracing::info;

use super::{AclService, reconcile_id, reject_client_id};
use crate::error::{AclError, AclResult};
use crate::model::{AclPolicy, LookupKey, POLICY_SYNTAX_CURRENT, RequestScope};

impl AclService {
    // ==================== Policy Operations ====================

    pub async fn policy_create(
        &self,
        scope: &RequestScope,
        mut policy: AclPolicy,
    ) -> AclResult<AclPolicy> {
        self.ensure_enabled()?;
        reject_client_id("policy", "ID", &policy.id)?;
        if policy.name.is_empty() {
            return Err(AclError::invalid("Missing required field 'Name'"));
        }
        policy.syntax = POLICY_SYNTAX_CURRENT;

        let scope = self.scope(scope);
        let policy = self.store.policy_set(&scope, policy).await?;
        info!(id = %policy.id, name = %policy.name, "Created ACL policy");
        Ok(policy)
    }

    /// Read a policy by ID or by name.
    pub async fn policy_read(&self, scope: &RequestScope, key: &LookupKey) -> AclResult<AclPolicy> {
        self.ensure_enabled()?;
        if key.value().is_empty() {
            return Err(AclError::invalid("Missing policy ID or name"));
        }
        let scope = self.scope(scope);
        self.store
            .policy_read(&scope, key)
            .await?
            .ok_or_else(|| AclError::not_found(format!("policy with {}", key)))
    }

    pub async fn policy_read_by_id(&self, scope: &RequestScope, id: &str) -> AclResult<AclPolicy> {
        self.policy_read(scope, &LookupKey::Id(id.to_string())).await
    }

    pub async fn policy_read_by_name(
        &self,
        scope: &RequestScope,
        name: &str,
    ) -> AclResult<AclPolicy> {
        self.policy_read(scope, &LookupKey::Name(name.to_string()))
            .await
    }

    pub async fn policy_update(
        &self,
        scope: &RequestScope,
        id: &str,
        mut policy: AclPolicy,
    ) -> AclResult<AclPolicy> {
        self.ensure_enabled()?;
        reconcile_id("Policy", id, &mut policy.id)?;
        if policy.name.is_empty() {
            return Err(AclError::invalid("Missing required field 'Name'"));
        }
        policy.syntax = POLICY_SYNTAX_CURRENT;

        let scope = self.scope(scope);
        let policy = self.store.policy_set(&scope, policy).await?;
        self.grants_changed();
        info!(id = %policy.id, name = %policy.name, "Updated ACL policy");
        Ok(policy)
    }

    pub async fn policy_delete(&self, scope: &RequestScope, id: &str) -> AclResult<()> {
        self.ensure_enabled()?;
        if id.is_empty() {
            return Err(AclError::invalid("Missing Policy ID"));
        }
        let scope = self.scope(scope);
        self.store.policy_delete(&scope, id).await?;
        self.grants_changed();
        info!(id = %id, "Deleted ACL policy");
        Ok(())
    }

    pub async fn policy_list(&self, scope: &RequestScope) -> AclResult<Vec<AclPolicy>> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        Ok(self.store.policy_list(&scope).await?)
    }
}
