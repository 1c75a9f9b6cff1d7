//! HTTP forwarding to peer datacenters
//!
//! `HttpAclRemote` talks to the ACL API of another datacenter's server, using
//! the base URLs from `acl.remote_datacenters`. A rejected batch keeps the
//! peer's error kind; transport failures and any other status are reported
//! as `Unavailable`, so callers fail closed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use batata_acl::{
    AclError, AclPolicy, AclRemote, AclResult, AclRole, AclToken, AuthorizationRequest,
    AuthorizationResponse,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ErrorBody;
use crate::handler::X_CONSUL_TOKEN;

pub struct HttpAclRemote {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl HttpAclRemote {
    pub fn new(endpoints: HashMap<String, String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let endpoints = endpoints
            .into_iter()
            .map(|(dc, url)| (dc, url.trim_end_matches('/').to_string()))
            .collect();
        Ok(Self { client, endpoints })
    }

    fn url(&self, datacenter: &str, path: &str) -> AclResult<String> {
        self.endpoints
            .get(datacenter)
            .map(|base| format!("{}{}", base, path))
            .ok_or_else(|| {
                AclError::unavailable(format!("no route to datacenter '{}'", datacenter))
            })
    }

    async fn send(&self, datacenter: &str, request: RequestBuilder, secret: &str) -> AclResult<Response> {
        let mut request = request.query(&[("dc", datacenter)]);
        if !secret.is_empty() {
            request = request.header(X_CONSUL_TOKEN, secret);
        }
        request.send().await.map_err(|e| {
            warn!(datacenter = %datacenter, error = %e, "Remote ACL request failed");
            AclError::unavailable(format!("datacenter '{}' unreachable", datacenter))
        })
    }

    async fn decode<T: DeserializeOwned>(datacenter: &str, response: Response) -> AclResult<T> {
        response.json::<T>().await.map_err(|e| {
            warn!(datacenter = %datacenter, error = %e, "Malformed remote ACL response");
            AclError::unavailable(format!("malformed response from datacenter '{}'", datacenter))
        })
    }

    /// GET an entity; a 404 or 403 reads as absent.
    async fn fetch<T: DeserializeOwned>(
        &self,
        datacenter: &str,
        secret: &str,
        path: &str,
    ) -> AclResult<Option<T>> {
        let url = self.url(datacenter, path)?;
        let response = self.send(datacenter, self.client.get(url), secret).await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Self::decode(datacenter, response).await.map(Some),
            status => Err(unexpected_status(datacenter, status)),
        }
    }
}

fn unexpected_status(datacenter: &str, status: StatusCode) -> AclError {
    warn!(datacenter = %datacenter, status = status.as_u16(), "Remote ACL request rejected");
    AclError::unavailable(format!(
        "datacenter '{}' answered with status {}",
        datacenter,
        status.as_u16()
    ))
}

/// Error kind of a rejected forwarded batch, read back from the peer's status.
fn authorize_error(datacenter: &str, status: StatusCode, message: String) -> AclError {
    let message = if message.is_empty() {
        format!("datacenter '{}' answered with status {}", datacenter, status.as_u16())
    } else {
        message
    };
    // The peer's body carries the rendered error; keep only its detail.
    let detail = |prefix: &str| message.strip_prefix(prefix).unwrap_or(&message).to_string();
    match status {
        StatusCode::BAD_REQUEST => AclError::InvalidRequest(detail("Bad request: ")),
        StatusCode::UNAUTHORIZED => AclError::Disabled,
        StatusCode::FORBIDDEN => AclError::PermissionDenied(detail("Permission denied: ")),
        StatusCode::NOT_FOUND => AclError::NotFound(detail("ACL not found: ")),
        status => unexpected_status(datacenter, status),
    }
}

#[async_trait]
impl AclRemote for HttpAclRemote {
    async fn authorize(
        &self,
        datacenter: &str,
        secret: &str,
        requests: &[AuthorizationRequest],
    ) -> AclResult<Vec<AuthorizationResponse>> {
        let url = self.url(datacenter, "/v1/internal/acl/authorize")?;
        debug!(datacenter = %datacenter, checks = requests.len(), "Forwarding authorization batch");
        let response = self
            .send(datacenter, self.client.post(url).json(requests), secret)
            .await?;
        let status = response.status();
        if status.is_success() {
            return Self::decode(datacenter, response).await;
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_default();
        Err(authorize_error(datacenter, status, message))
    }

    async fn resolve_token(&self, datacenter: &str, secret: &str) -> AclResult<Option<AclToken>> {
        if secret.is_empty() {
            return Ok(None);
        }
        self.fetch(datacenter, secret, "/v1/acl/token/self").await
    }

    async fn resolve_policies(
        &self,
        datacenter: &str,
        secret: &str,
        ids: &[String],
    ) -> AclResult<Vec<AclPolicy>> {
        let mut policies = Vec::with_capacity(ids.len());
        for id in ids {
            let path = format!("/v1/acl/policy/{}", id);
            if let Some(policy) = self.fetch(datacenter, secret, &path).await? {
                policies.push(policy);
            }
        }
        Ok(policies)
    }

    async fn resolve_roles(
        &self,
        datacenter: &str,
        secret: &str,
        ids: &[String],
    ) -> AclResult<Vec<AclRole>> {
        let mut roles = Vec::with_capacity(ids.len());
        for id in ids {
            let path = format!("/v1/acl/role/{}", id);
            if let Some(role) = self.fetch(datacenter, secret, &path).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}
