//! HTTP handlers for the ACL API
//!
//! Each handler builds a `RequestScope` from the request (token header or
//! `token` query parameter, `dc`, `ns`, `partition`) and calls the matching
//! `AclService` operation. Decoding and status mapping are the only things
//! done here.

use actix_web::error::JsonPayloadError;
use actix_web::{HttpRequest, HttpResponse, web};
use batata_acl::{
    AclError, AclPolicy, AclRole, AclService, AclToken, AuthMethod, AuthorizationRequest, BindingRule,
    EntityMeta, LoginParams, RequestScope, TokenListFilter,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

pub const X_CONSUL_TOKEN: &str = "X-Consul-Token";
pub const TOKEN_QUERY: &str = "token";

/// Query parameters shared by the ACL endpoints
#[derive(Debug, Default, Deserialize)]
pub struct AclQuery {
    pub dc: Option<String>,
    pub ns: Option<String>,
    pub partition: Option<String>,
    pub token: Option<String>,
    pub policy: Option<String>,
    pub role: Option<String>,
    pub authmethod: Option<String>,
}

/// Optional body of a token clone
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloneTokenRequest {
    #[serde(default)]
    pub description: String,
}

/// Token from the `X-Consul-Token` header, then the `token` query parameter.
pub fn extract_token(req: &HttpRequest, query: &AclQuery) -> Option<String> {
    if let Some(token) = req.headers().get(X_CONSUL_TOKEN)
        && let Ok(token_str) = token.to_str()
        && !token_str.is_empty()
    {
        return Some(token_str.to_string());
    }
    query.token.clone().filter(|t| !t.is_empty())
}

pub fn request_scope(req: &HttpRequest, query: &AclQuery) -> RequestScope {
    let meta = EntityMeta::new(
        query.ns.clone().unwrap_or_default(),
        query.partition.clone().unwrap_or_default(),
    );
    let mut scope = RequestScope::new()
        .with_datacenter(query.dc.clone().unwrap_or_default())
        .with_meta(meta);
    if let Some(token) = extract_token(req, query) {
        scope = scope.with_token(token);
    }
    scope
}

/// Body decoding runs before the handler, so a disabled node is checked here
/// too and still answers `Disabled` ahead of any decode error.
pub fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let error = match req
        .app_data::<web::Data<AclService>>()
        .map(|service| service.ensure_enabled())
    {
        Some(Err(disabled)) => disabled,
        _ => AclError::invalid(format!("Failed to decode request body: {}", err)),
    };
    ApiError(error).into()
}

// ============================================================================
// Bootstrap, replication, login
// ============================================================================

pub async fn acl_bootstrap(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let token = service.bootstrap(&request_scope(&req, &query)).await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn acl_replication(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let status = service
        .replication_status(&request_scope(&req, &query))
        .await?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn acl_login(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<LoginParams>,
) -> ApiResult<HttpResponse> {
    let token = service
        .login(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn acl_logout(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    service.logout(&request_scope(&req, &query)).await?;
    Ok(HttpResponse::Ok().json(true))
}

pub async fn acl_authorize(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<Vec<AuthorizationRequest>>,
) -> ApiResult<HttpResponse> {
    let responses = service
        .authorize(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(responses))
}

// ============================================================================
// Tokens
// ============================================================================

pub async fn list_tokens(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let filter = TokenListFilter {
        policy: query.policy.clone().filter(|p| !p.is_empty()),
        role: query.role.clone().filter(|r| !r.is_empty()),
        auth_method: query.authmethod.clone().filter(|m| !m.is_empty()),
    };
    let tokens = service
        .token_list(&request_scope(&req, &query), &filter)
        .await?;
    Ok(HttpResponse::Ok().json(tokens))
}

pub async fn get_token_self(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let token = service.token_self(&request_scope(&req, &query)).await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn create_token(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<AclToken>,
) -> ApiResult<HttpResponse> {
    let token = service
        .token_create(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn get_token(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let token = service
        .token_read(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn update_token(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: web::Json<AclToken>,
) -> ApiResult<HttpResponse> {
    let token = service
        .token_update(&request_scope(&req, &query), &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn clone_token(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: Option<web::Json<CloneTokenRequest>>,
) -> ApiResult<HttpResponse> {
    let description = body.map(|b| b.into_inner().description);
    let token = service
        .token_clone(&request_scope(&req, &query), &path, description)
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

pub async fn delete_token(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    service
        .token_delete(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(true))
}

// ============================================================================
// Policies
// ============================================================================

pub async fn list_policies(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let policies = service.policy_list(&request_scope(&req, &query)).await?;
    Ok(HttpResponse::Ok().json(policies))
}

pub async fn create_policy(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<AclPolicy>,
) -> ApiResult<HttpResponse> {
    let policy = service
        .policy_create(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

pub async fn get_policy(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let policy = service
        .policy_read_by_id(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

pub async fn get_policy_by_name(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let policy = service
        .policy_read_by_name(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

pub async fn update_policy(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: web::Json<AclPolicy>,
) -> ApiResult<HttpResponse> {
    let policy = service
        .policy_update(&request_scope(&req, &query), &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

pub async fn delete_policy(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    service
        .policy_delete(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(true))
}

// ============================================================================
// Roles
// ============================================================================

pub async fn list_roles(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let roles = service
        .role_list(&request_scope(&req, &query), query.policy.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(roles))
}

pub async fn create_role(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<AclRole>,
) -> ApiResult<HttpResponse> {
    let role = service
        .role_create(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(role))
}

pub async fn get_role(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let role = service
        .role_read_by_id(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(role))
}

pub async fn get_role_by_name(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let role = service
        .role_read_by_name(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(role))
}

pub async fn update_role(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: web::Json<AclRole>,
) -> ApiResult<HttpResponse> {
    let role = service
        .role_update(&request_scope(&req, &query), &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(role))
}

pub async fn delete_role(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    service
        .role_delete(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(true))
}

// ============================================================================
// Binding rules
// ============================================================================

pub async fn list_binding_rules(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let rules = service
        .binding_rule_list(&request_scope(&req, &query), query.authmethod.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(rules))
}

pub async fn create_binding_rule(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<BindingRule>,
) -> ApiResult<HttpResponse> {
    let rule = service
        .binding_rule_create(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

pub async fn get_binding_rule(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let rule = service
        .binding_rule_read(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

pub async fn update_binding_rule(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: web::Json<BindingRule>,
) -> ApiResult<HttpResponse> {
    let rule = service
        .binding_rule_update(&request_scope(&req, &query), &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

pub async fn delete_binding_rule(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    service
        .binding_rule_delete(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(true))
}

// ============================================================================
// Auth methods
// ============================================================================

pub async fn list_auth_methods(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
) -> ApiResult<HttpResponse> {
    let methods = service
        .auth_method_list(&request_scope(&req, &query))
        .await?;
    Ok(HttpResponse::Ok().json(methods))
}

pub async fn create_auth_method(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    body: web::Json<AuthMethod>,
) -> ApiResult<HttpResponse> {
    let method = service
        .auth_method_create(&request_scope(&req, &query), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(method))
}

pub async fn get_auth_method(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let method = service
        .auth_method_read(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(method))
}

pub async fn update_auth_method(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
    body: web::Json<AuthMethod>,
) -> ApiResult<HttpResponse> {
    let method = service
        .auth_method_update(&request_scope(&req, &query), &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(method))
}

pub async fn delete_auth_method(
    service: web::Data<AclService>,
    req: HttpRequest,
    query: web::Query<AclQuery>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    service
        .auth_method_delete(&request_scope(&req, &query), &path)
        .await?;
    Ok(HttpResponse::Ok().json(true))
}
