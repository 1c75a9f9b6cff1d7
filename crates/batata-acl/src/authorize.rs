//! Batch authorization
//!
//! Answers up to `MAX_AUTHORIZATION_REQUESTS` permission questions for one
//! token in a single call. The strategy is chosen once per batch: a batch
//! aimed at another datacenter is forwarded whole, anything else is answered
//! from the locally resolved authorizer. Responses line up with questions one
//! to one, and the batch either succeeds entirely or fails.

use metrics::counter;
use tracing::debug;

use crate::authorizer::{Access, AuthorizerContext, Decision, Resource};
use crate::error::{AclError, AclResult};
use crate::model::{
    AuthorizationRequest, AuthorizationResponse, EntityMeta, MAX_AUTHORIZATION_REQUESTS,
    RequestScope,
};
use crate::remote::with_deadline;
use crate::service::AclService;

/// A question that passed validation
struct Check {
    resource: Resource,
    access: Access,
}

fn parse_check(index: usize, request: &AuthorizationRequest) -> AclResult<Check> {
    let resource: Resource = request
        .resource
        .parse()
        .map_err(|e| AclError::invalid(format!("request {}: {}", index, e)))?;
    let access: Access = request
        .access
        .parse()
        .map_err(|e| AclError::invalid(format!("request {}: {}", index, e)))?;
    if !resource.supports(access) {
        return Err(AclError::invalid(format!(
            "request {}: access '{}' is not valid for resource '{}'",
            index, access, resource
        )));
    }
    Ok(Check { resource, access })
}

fn reason(decision: Decision, check: &Check, segment: &str) -> String {
    match decision {
        Decision::Allow => String::new(),
        Decision::Deny if segment.is_empty() => {
            format!("Permission denied: {} {}", check.resource, check.access)
        }
        Decision::Deny => format!(
            "Permission denied: {} {} on '{}'",
            check.resource, check.access, segment
        ),
        Decision::Default => "no matching ACL rule".to_string(),
    }
}

impl AclService {
    // ==================== Authorization Operations ====================

    /// Answer each question for the token in `scope.token`, in order.
    pub async fn authorize(
        &self,
        scope: &RequestScope,
        requests: Vec<AuthorizationRequest>,
    ) -> AclResult<Vec<AuthorizationResponse>> {
        self.ensure_enabled()?;
        if requests.len() > MAX_AUTHORIZATION_REQUESTS {
            return Err(AclError::invalid(format!(
                "Refusing to authorize more than {} requests, got {}",
                MAX_AUTHORIZATION_REQUESTS,
                requests.len()
            )));
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        // Validate the whole batch before resolving or forwarding anything.
        let checks = requests
            .iter()
            .enumerate()
            .map(|(i, r)| parse_check(i, r))
            .collect::<AclResult<Vec<_>>>()?;

        let secret = scope.token.as_deref().unwrap_or_default();
        if let Some(datacenter) = scope.datacenter().filter(|dc| !self.is_local(Some(*dc))) {
            return self.authorize_remote(datacenter, secret, &requests).await;
        }

        let resolved = self.resolver().resolve(secret).await?;
        counter!("acl_authorize_requests_total", "path" => "local").increment(1);
        counter!("acl_authorize_checks_total").increment(requests.len() as u64);

        let responses: Vec<AuthorizationResponse> = requests
            .into_iter()
            .zip(checks.iter())
            .map(|(request, check)| {
                let ctx = AuthorizerContext {
                    meta: if request.meta == EntityMeta::default() {
                        resolved.meta.clone()
                    } else {
                        request.meta.normalized()
                    },
                };
                let decision = resolved.authorizer.allowed(
                    check.resource,
                    &request.segment,
                    check.access,
                    &ctx,
                );
                AuthorizationResponse {
                    reason: reason(decision, check, &request.segment),
                    allow: decision.is_allowed(),
                    request,
                }
            })
            .collect();

        debug!(
            accessor_id = resolved.accessor_id().unwrap_or("anonymous"),
            checks = responses.len(),
            "Authorized batch locally"
        );
        Ok(responses)
    }

    async fn authorize_remote(
        &self,
        datacenter: &str,
        secret: &str,
        requests: &[AuthorizationRequest],
    ) -> AclResult<Vec<AuthorizationResponse>> {
        let remote = self.remote().ok_or_else(|| {
            AclError::unavailable(format!("no path to datacenter '{}'", datacenter))
        })?;
        counter!("acl_authorize_requests_total", "path" => "remote").increment(1);
        counter!("acl_authorize_checks_total").increment(requests.len() as u64);

        let responses = with_deadline(
            self.config().request_timeout(),
            datacenter,
            remote.authorize(datacenter, secret, requests),
        )
        .await?;
        if responses.len() != requests.len() {
            return Err(AclError::unavailable(format!(
                "datacenter '{}' answered {} of {} authorization requests",
                datacenter,
                responses.len(),
                requests.len()
            )));
        }
        debug!(datacenter = %datacenter, checks = responses.len(), "Authorized batch remotely");
        Ok(responses)
    }
}
