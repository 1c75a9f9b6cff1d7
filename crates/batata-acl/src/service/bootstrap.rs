use tracing::{info, warn};

use super::AclService;
use crate::error::{AclError, AclResult};
use crate::model::{AclToken, ReplicationStatus, RequestScope};

impl AclService {
    // ==================== Cluster Operations ====================

    /// Mint the first management token. Runs against the primary datacenter;
    /// whether the cluster was already bootstrapped is decided by the store.
    pub async fn bootstrap(&self, scope: &RequestScope) -> AclResult<AclToken> {
        self.ensure_enabled()?;
        let scope = self
            .scope(scope)
            .with_datacenter(self.config.primary_datacenter());

        match self.store.bootstrap(&scope).await {
            Ok(token) => {
                self.grants_changed();
                info!(accessor_id = %token.accessor_id, "ACL bootstrap complete");
                Ok(token)
            }
            Err(e) => {
                let err = AclError::from(e);
                warn!(error = %err, "ACL bootstrap rejected");
                Err(err)
            }
        }
    }

    /// Replication health of the node serving the scope's datacenter. Never
    /// redirected to the primary.
    pub async fn replication_status(&self, scope: &RequestScope) -> AclResult<ReplicationStatus> {
        self.ensure_enabled()?;
        let scope = self.scope(scope);
        Ok(self.store.replication_status(&scope).await?)
    }
}
