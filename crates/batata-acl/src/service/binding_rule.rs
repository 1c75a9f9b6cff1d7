use tracing::info;

use super::{AclService, reconcile_id, reject_client_id};
use crate::error::{AclError, AclResult};
use crate::model::{BindingRule, RequestScope};

impl AclService {
    // ==================== Binding Rule Operations ====================

    pub async fn binding_rule_create(
        &self,
        scope: &RequestScope,
        rule: BindingRule,
    ) -> AclResult<BindingRule> {
        self.ensure_enabled()?;
        reject_client_id("binding rule", "ID", &rule.id)?;
        validate_binding_rule(&rule)?;

        let scope = self.scope(scope);
        let rule = self.store.binding_rule_set(&scope, rule).await?;
        info!(id = %rule.id, auth_method = %rule.auth_method, "Created ACL binding rule");
        Ok(rule)
    }

    pub async fn binding_rule_read(&self, scope: &RequestScope, id: &str) -> AclResult<BindingRule> {
        self.ensure_enabled()?;
        if id.is_empty() {
            return Err(AclError::invalid("Missing binding rule ID"));
        }
        let scope = self.scope(scope);
        self.store
            .binding_rule_read(&scope, id)
            .await?
            .ok_or_else(|| AclError::not_found(format!("binding rule '{}'", id)))
    }

    pub async fn binding_rule_update(
        &self,
        scope: &RequestScope,
        id: &str,
        mut rule: BindingRule,
    ) -> AclResult<BindingRule> {
        self.ensure_enabled()?;
        reconcile_id("BindingRule", id, &mut rule.id)?;
        validate_binding_rule(&rule)?;

        let scope = self.scope(scope);
        let rule = self.store.binding_rule_set(&scope, rule).await?;
        info!(id = %rule.id, auth_method = %rule.auth_method, "Updated ACL binding rule");
        Ok(rule)
    }

    pub async fn binding_rule_delete(&self, scope: &RequestScope, id: &str) -> AclResult<()> {
        self.ensure_enabled()?;
        if id.is_empty() {
            return Err(AclError::invalid("Missing binding rule ID"));
        }
        let scope = self.scope(scope);
        self.store.binding_rule_delete(&scope, id).await?;
        info!(id = %id, "Deleted ACL binding rule");
        Ok(())
    }

    pub async fn binding_rule_list(
        &self,
        scope: &RequestScope,
        auth_method: Option<&str>,
    ) -> AclResult<Vec<BindingRule>> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        Ok(self
            .store
            .binding_rule_list(&scope, auth_method.filter(|m| !m.is_empty()))
            .await?)
    }
}

fn validate_binding_rule(rule: &BindingRule) -> AclResult<()> {
    if rule.auth_method.is_empty() {
        return Err(AclError::invalid("Missing required field 'AuthMethod'"));
    }
    if rule.bind_name.is_empty() {
        return Err(AclError::invalid("Missing required field 'BindName'"));
    }
    Ok(())
}
