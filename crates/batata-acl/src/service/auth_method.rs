use tracing::info;

use super::AclService;
use crate::error::{AclError, AclResult};
use crate::model::{AuthMethod, MAX_LOGIN_TOKEN_TTL, RequestScope, parse_duration};

impl AclService {
    // ==================== Auth Method Operations ====================
    //
    // Auth methods are keyed by their client-supplied name. Config values may
    // come back from the store as raw bytes; every method leaving the service
    // goes through `AuthMethod::normalize_config`.

    pub async fn auth_method_create(
        &self,
        scope: &RequestScope,
        method: AuthMethod,
    ) -> AclResult<AuthMethod> {
        self.ensure_enabled()?;
        if method.name.is_empty() {
            return Err(AclError::invalid("Missing required field 'Name'"));
        }
        validate_auth_method(&method)?;

        let scope = self.scope(scope);
        let method = self.store.auth_method_set(&scope, method).await?;
        info!(name = %method.name, method_type = %method.method_type, "Created ACL auth method");
        Ok(method.normalize_config())
    }

    pub async fn auth_method_read(&self, scope: &RequestScope, name: &str) -> AclResult<AuthMethod> {
        self.ensure_enabled()?;
        if name.is_empty() {
            return Err(AclError::invalid("Missing auth method name"));
        }
        let scope = self.scope(scope);
        self.store
            .auth_method_read(&scope, name)
            .await?
            .map(AuthMethod::normalize_config)
            .ok_or_else(|| AclError::not_found(format!("auth method '{}'", name)))
    }

    pub async fn auth_method_update(
        &self,
        scope: &RequestScope,
        name: &str,
        mut method: AuthMethod,
    ) -> AclResult<AuthMethod> {
        self.ensure_enabled()?;
        if name.is_empty() {
            return Err(AclError::invalid("Missing auth method name"));
        }
        if method.name.is_empty() {
            method.name = name.to_string();
        } else if method.name != name {
            return Err(AclError::invalid(
                "Auth method name in URL and payload do not match",
            ));
        }
        validate_auth_method(&method)?;

        let scope = self.scope(scope);
        let method = self.store.auth_method_set(&scope, method).await?;
        info!(name = %method.name, "Updated ACL auth method");
        Ok(method.normalize_config())
    }

    /// Deleting a method also drops its binding rules and the tokens it minted.
    pub async fn auth_method_delete(&self, scope: &RequestScope, name: &str) -> AclResult<()> {
        self.ensure_enabled()?;
        if name.is_empty() {
            return Err(AclError::invalid("Missing auth method name"));
        }
        let scope = self.scope(scope);
        self.store.auth_method_delete(&scope, name).await?;
        self.grants_changed();
        info!(name = %name, "Deleted ACL auth method");
        Ok(())
    }

    pub async fn auth_method_list(&self, scope: &RequestScope) -> AclResult<Vec<AuthMethod>> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        let methods = self.store.auth_method_list(&scope).await?;
        Ok(methods
            .into_iter()
            .map(AuthMethod::normalize_config)
            .collect())
    }
}

fn validate_auth_method(method: &AuthMethod) -> AclResult<()> {
    if method.method_type.is_empty() {
        return Err(AclError::invalid("Missing required field 'Type'"));
    }
    if !method.max_token_ttl.is_empty() {
        let ttl = parse_duration(&method.max_token_ttl).ok_or_else(|| {
            AclError::invalid(format!("Invalid MaxTokenTTL '{}'", method.max_token_ttl))
        })?;
        if ttl > MAX_LOGIN_TOKEN_TTL {
            return Err(AclError::invalid(format!(
                "MaxTokenTTL '{}' exceeds the maximum of {}h",
                method.max_token_ttl,
                MAX_LOGIN_TOKEN_TTL.as_secs() / 3600
            )));
        }
    }
    match method.token_locality.as_str() {
        "" | "local" | "global" => Ok(()),
        other => Err(AclError::invalid(format!(
            "Invalid TokenLocality '{}': must be 'local' or 'global'",
            other
        ))),
    }
}
