use chrono::Utc;
use tracing::info;

use super::{AclService, reconcile_id, reject_client_id};
use crate::error::{AclError, AclResult};
use crate::model::{AclToken, RequestScope, TokenListFilter, TokenLookup};

impl AclService {
    // ==================== Token Operations ====================

    pub async fn token_create(&self, scope: &RequestScope, token: AclToken) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        reject_client_id("token", "AccessorID", &token.accessor_id)?;
        reject_client_id("token", "SecretID", &token.secret_id)?;
        if token.expiration_time.is_some_and(|exp| exp <= Utc::now()) {
            return Err(AclError::invalid("ExpirationTime cannot be in the past"));
        }

        let scope = self.scope(scope);
        let token = self.store.token_set(&scope, token, true).await?;
        self.grants_changed();
        info!(accessor_id = %token.accessor_id, "Created ACL token");
        Ok(token)
    }

    pub async fn token_read(&self, scope: &RequestScope, accessor_id: &str) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        if accessor_id.is_empty() {
            return Err(AclError::invalid("Missing Token Accessor ID"));
        }
        let scope = self.scope(scope);
        self.store
            .token_read(&scope, &TokenLookup::Accessor(accessor_id.to_string()))
            .await?
            .ok_or_else(|| AclError::not_found(format!("token '{}'", accessor_id)))
    }

    /// The token whose secret made the request.
    pub async fn token_self(&self, scope: &RequestScope) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        let secret = scope
            .token
            .clone()
            .ok_or_else(|| AclError::not_found("no token supplied"))?;
        let scope = self.scope(scope);
        self.store
            .token_read(&scope, &TokenLookup::Secret(secret))
            .await?
            .ok_or_else(|| AclError::not_found("ACL token not found"))
    }

    pub async fn token_update(
        &self,
        scope: &RequestScope,
        accessor_id: &str,
        mut token: AclToken,
    ) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        reconcile_id("Token Accessor", accessor_id, &mut token.accessor_id)?;

        let scope = self.scope(scope);
        let token = self.store.token_set(&scope, token, false).await?;
        self.grants_changed();
        info!(accessor_id = %token.accessor_id, "Updated ACL token");
        Ok(token)
    }

    pub async fn token_delete(&self, scope: &RequestScope, accessor_id: &str) -> AclResult<()> {
        self.ensure_enabled()?;
        if accessor_id.is_empty() {
            return Err(AclError::invalid("Missing Token Accessor ID"));
        }
        let scope = self.scope(scope);
        self.store.token_delete(&scope, accessor_id).await?;
        self.grants_changed();
        info!(accessor_id = %accessor_id, "Deleted ACL token");
        Ok(())
    }

    /// New token with the grants of `accessor_id` and fresh credentials.
    pub async fn token_clone(
        &self,
        scope: &RequestScope,
        accessor_id: &str,
        description: Option<String>,
    ) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        if accessor_id.is_empty() {
            return Err(AclError::invalid("Missing Token Accessor ID"));
        }
        let scope = self.scope(scope);
        let token = self
            .store
            .token_clone(&scope, accessor_id, description.filter(|d| !d.is_empty()))
            .await?;
        info!(source = %accessor_id, accessor_id = %token.accessor_id, "Cloned ACL token");
        Ok(token)
    }

    /// Token listing. Secrets are stripped.
    pub async fn token_list(
        &self,
        scope: &RequestScope,
        filter: &TokenListFilter,
    ) -> AclResult<Vec<AclToken>> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        let tokens = self.store.token_list(&scope, filter).await?;
        Ok(tokens.into_iter().map(AclToken::redacted).collect())
    }
}
