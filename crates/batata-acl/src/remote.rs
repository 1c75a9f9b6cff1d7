//! Remote authority seam
//!
//! `AclRemote` carries requests to another datacenter's ACL authority. The
//! core never retries: every call runs under the configured deadline and a
//! missed deadline fails closed as `AclError::Unavailable`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AclError, AclResult};
use crate::model::{AclPolicy, AclRole, AclToken, AuthorizationRequest, AuthorizationResponse};

#[async_trait]
pub trait AclRemote: Send + Sync {
    /// Answer a whole authorization batch in `datacenter`.
    async fn authorize(
        &self,
        datacenter: &str,
        secret: &str,
        requests: &[AuthorizationRequest],
    ) -> AclResult<Vec<AuthorizationResponse>>;

    /// Fetch the token record for `secret` from `datacenter`.
    async fn resolve_token(&self, datacenter: &str, secret: &str) -> AclResult<Option<AclToken>>;

    async fn resolve_policies(
        &self,
        datacenter: &str,
        secret: &str,
        ids: &[String],
    ) -> AclResult<Vec<AclPolicy>>;

    async fn resolve_roles(
        &self,
        datacenter: &str,
        secret: &str,
        ids: &[String],
    ) -> AclResult<Vec<AclRole>>;
}

/// Run a remote call under `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, datacenter: &str, call: F) -> AclResult<T>
where
    F: Future<Output = AclResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(datacenter = %datacenter, timeout_ms = deadline.as_millis() as u64, "Remote ACL request timed out");
            Err(AclError::unavailable(format!(
                "request to datacenter '{}' timed out after {}ms",
                datacenter,
                deadline.as_millis()
            )))
        }
    }
}
