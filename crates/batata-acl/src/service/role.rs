use tracing::info;

use super::{AclService, reconcile_id, reject_client_id};
use crate::error::{AclError, AclResult};
use crate::model::{AclRole, LookupKey, RequestScope};

impl AclService {
    // ==================== Role Operations ====================

    pub async fn role_create(&self, scope: &RequestScope, role: AclRole) -> AclResult<AclRole> {
        self.ensure_enabled()?;
        reject_client_id("role", "ID", &role.id)?;
        if role.name.is_empty() {
            return Err(AclError::invalid("Missing required field 'Name'"));
        }

        let scope = self.scope(scope);
        let role = self.store.role_set(&scope, role).await?;
        info!(id = %role.id, name = %role.name, "Created ACL role");
        Ok(role)
    }

    /// Read a role by ID or by name.
    pub async fn role_read(&self, scope: &RequestScope, key: &LookupKey) -> AclResult<AclRole> {
        self.ensure_enabled()?;
        if key.value().is_empty() {
            return Err(AclError::invalid("Missing role ID or name"));
        }
        let scope = self.scope(scope);
        self.store
            .role_read(&scope, key)
            .await?
            .ok_or_else(|| AclError::not_found(format!("role with {}", key)))
    }

    pub async fn role_read_by_id(&self, scope: &RequestScope, id: &str) -> AclResult<AclRole> {
        self.role_read(scope, &LookupKey::Id(id.to_string())).await
    }

    pub async fn role_read_by_name(&self, scope: &RequestScope, name: &str) -> AclResult<AclRole> {
        self.role_read(scope, &LookupKey::Name(name.to_string())).await
    }

    pub async fn role_update(
        &self,
        scope: &RequestScope,
        id: &str,
        mut role: AclRole,
    ) -> AclResult<AclRole> {
        self.ensure_enabled()?;
        reconcile_id("Role", id, &mut role.id)?;
        if role.name.is_empty() {
            return Err(AclError::invalid("Missing required field 'Name'"));
        }

        let scope = self.scope(scope);
        let role = self.store.role_set(&scope, role).await?;
        self.grants_changed();
        info!(id = %role.id, name = %role.name, "Updated ACL role");
        Ok(role)
    }

    pub async fn role_delete(&self, scope: &RequestScope, id: &str) -> AclResult<()> {
        self.ensure_enabled()?;
        if id.is_empty() {
            return Err(AclError::invalid("Missing Role ID"));
        }
        let scope = self.scope(scope);
        self.store.role_delete(&scope, id).await?;
        self.grants_changed();
        info!(id = %id, "Deleted ACL role");
        Ok(())
    }

    /// Roles, optionally only those linking `policy` (ID or name).
    pub async fn role_list(
        &self,
        scope: &RequestScope,
        policy: Option<&str>,
    ) -> AclResult<Vec<AclRole>> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        Ok(self
            .store
            .role_list(&scope, policy.filter(|p| !p.is_empty()))
            .await?)
    }
}
