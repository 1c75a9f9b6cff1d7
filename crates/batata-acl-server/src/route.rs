use actix_web::web;

use crate::handler;

/// Consul ACL API routes (`/v1/acl/*`)
pub fn acl_routes() -> actix_web::Scope {
    web::scope("/v1/acl")
        // Bootstrap and auth endpoints
        .route("/bootstrap", web::put().to(handler::acl_bootstrap))
        .route("/login", web::post().to(handler::acl_login))
        .route("/logout", web::post().to(handler::acl_logout))
        .route("/replication", web::get().to(handler::acl_replication))
        .route("/authorize", web::post().to(handler::acl_authorize))
        // Token management
        .route("/tokens", web::get().to(handler::list_tokens))
        .route("/token/self", web::get().to(handler::get_token_self))
        .route("/token", web::put().to(handler::create_token))
        .route(
            "/token/{accessor_id}/clone",
            web::put().to(handler::clone_token),
        )
        .route("/token/{accessor_id}", web::get().to(handler::get_token))
        .route("/token/{accessor_id}", web::put().to(handler::update_token))
        .route(
            "/token/{accessor_id}",
            web::delete().to(handler::delete_token),
        )
        // Policy management
        .route("/policies", web::get().to(handler::list_policies))
        .route("/policy", web::put().to(handler::create_policy))
        .route(
            "/policy/name/{name}",
            web::get().to(handler::get_policy_by_name),
        )
        .route("/policy/{id}", web::get().to(handler::get_policy))
        .route("/policy/{id}", web::put().to(handler::update_policy))
        .route("/policy/{id}", web::delete().to(handler::delete_policy))
        // Role management
        .route("/roles", web::get().to(handler::list_roles))
        .route("/role", web::put().to(handler::create_role))
        .route("/role/name/{name}", web::get().to(handler::get_role_by_name))
        .route("/role/{id}", web::get().to(handler::get_role))
        .route("/role/{id}", web::put().to(handler::update_role))
        .route("/role/{id}", web::delete().to(handler::delete_role))
        // Binding rule management
        .route("/binding-rules", web::get().to(handler::list_binding_rules))
        .route("/binding-rule", web::put().to(handler::create_binding_rule))
        .route("/binding-rule/{id}", web::get().to(handler::get_binding_rule))
        .route(
            "/binding-rule/{id}",
            web::put().to(handler::update_binding_rule),
        )
        .route(
            "/binding-rule/{id}",
            web::delete().to(handler::delete_binding_rule),
        )
        // Auth method management
        .route("/auth-methods", web::get().to(handler::list_auth_methods))
        .route("/auth-method", web::put().to(handler::create_auth_method))
        .route("/auth-method/{name}", web::get().to(handler::get_auth_method))
        .route(
            "/auth-method/{name}",
            web::put().to(handler::update_auth_method),
        )
        .route(
            "/auth-method/{name}",
            web::delete().to(handler::delete_auth_method),
        )
}

/// Batch authorization at its internal path (`/v1/internal/acl/authorize`)
pub fn internal_acl_routes() -> actix_web::Scope {
    web::scope("/v1/internal/acl").route("/authorize", web::post().to(handler::acl_authorize))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handler::json_error))
        .service(acl_routes())
        .service(internal_acl_routes());
}
