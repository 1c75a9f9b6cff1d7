//! HTTP-level tests for the ACL API

use actix_web::dev::{Service, ServiceResponse};
use actix_web::{App, test, web};
use batata_acl::AclConfig;
use batata_acl_server::handler::X_CONSUL_TOKEN;
use batata_acl_server::{build_service, route};
use serde_json::{Value, json};

const ROOT: &str = "root-secret";

fn config() -> AclConfig {
    AclConfig {
        initial_management_token: Some(ROOT.to_string()),
        ..AclConfig::default()
    }
}

async fn create_test_app(
    config: AclConfig,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    let service = build_service(config).unwrap();
    test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(route::configure),
    )
    .await
}

// ============================================================================
// Bootstrap and replication
// ============================================================================

#[actix_web::test]
async fn test_http_bootstrap_once() {
    let app = create_test_app(AclConfig::default()).await;

    let req = test::TestRequest::put().uri("/v1/acl/bootstrap").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert!(!body["SecretID"].as_str().unwrap().is_empty());
    assert_eq!(body["Policies"][0]["Name"], "global-management");

    let req = test::TestRequest::put().uri("/v1/acl/bootstrap").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn test_http_seeded_token_counts_as_bootstrap() {
    let app = create_test_app(config()).await;
    let req = test::TestRequest::put().uri("/v1/acl/bootstrap").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn test_http_replication_status() {
    let app = create_test_app(config()).await;
    let req = test::TestRequest::get()
        .uri("/v1/acl/replication")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["Enabled"], false);
    assert_eq!(body["SourceDatacenter"], "dc1");
}

#[actix_web::test]
async fn test_http_disabled_is_unauthorized() {
    let app = create_test_app(AclConfig::disabled()).await;
    for req in [
        test::TestRequest::get().uri("/v1/acl/tokens").to_request(),
        test::TestRequest::put().uri("/v1/acl/bootstrap").to_request(),
        test::TestRequest::post()
            .uri("/v1/internal/acl/authorize")
            .set_json(json!([]))
            .to_request(),
    ] {
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ACL support disabled");
    }
}

#[actix_web::test]
async fn test_http_disabled_wins_over_bad_body() {
    let app = create_test_app(AclConfig::disabled()).await;
    for uri in ["/v1/internal/acl/authorize", "/v1/acl/login"] {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "ACL support disabled");
    }
}

#[actix_web::test]
async fn test_http_bad_body_is_bad_request() {
    let app = create_test_app(config()).await;
    let req = test::TestRequest::put()
        .uri("/v1/acl/policy")
        .insert_header(("content-type", "application/json"))
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Bad request:"));
}

// ============================================================================
// Policies, roles and tokens
// ============================================================================

#[actix_web::test]
async fn test_http_policy_lifecycle() {
    let app = create_test_app(config()).await;

    let req = test::TestRequest::put()
        .uri("/v1/acl/policy")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .set_json(json!({"Name": "node-read", "Rules": "node_prefix \"\" { policy = \"read\" }"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let created: Value = test::read_body_json(resp).await;
    let id = created["ID"].as_str().unwrap().to_string();
    assert_eq!(created["Syntax"], 2);

    let req = test::TestRequest::get()
        .uri("/v1/acl/policy/name/node-read")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let read: Value = test::read_body_json(resp).await;
    assert_eq!(read["ID"], id.as_str());

    // ID in payload must match the path
    let req = test::TestRequest::put()
        .uri(&format!("/v1/acl/policy/{}", id))
        .set_json(json!({"ID": "something-else", "Name": "node-read"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::put()
        .uri(&format!("/v1/acl/policy/{}", id))
        .set_json(json!({"Name": "node-read", "Description": "read nodes"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["Description"], "read nodes");

    let req = test::TestRequest::delete()
        .uri(&format!("/v1/acl/policy/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/v1/acl/policy/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_http_role_by_name_and_filter() {
    let app = create_test_app(config()).await;

    let req = test::TestRequest::put()
        .uri("/v1/acl/policy")
        .set_json(json!({"Name": "kv-read", "Rules": "key_prefix \"\" { policy = \"read\" }"}))
        .to_request();
    let policy: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::put()
        .uri("/v1/acl/role")
        .set_json(json!({"Name": "reader", "Policies": [{"Name": "kv-read"}]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/role/name/reader")
        .to_request();
    let role: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(role["Policies"][0]["ID"], policy["ID"]);

    let req = test::TestRequest::get()
        .uri("/v1/acl/roles?policy=kv-read")
        .to_request();
    let roles: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(roles.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/v1/acl/roles?policy=other")
        .to_request();
    let roles: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(roles, json!([]));
}

#[actix_web::test]
async fn test_http_token_lifecycle() {
    let app = create_test_app(config()).await;

    // Client-chosen accessor IDs are refused
    let req = test::TestRequest::put()
        .uri("/v1/acl/token")
        .set_json(json!({"AccessorID": "mine", "Description": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::put()
        .uri("/v1/acl/token")
        .set_json(json!({
            "Description": "ci",
            "Policies": [{"Name": "global-management"}]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let token: Value = test::read_body_json(resp).await;
    let accessor = token["AccessorID"].as_str().unwrap().to_string();
    let secret = token["SecretID"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/v1/acl/token/self")
        .insert_header((X_CONSUL_TOKEN, secret.as_str()))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["AccessorID"], accessor.as_str());

    let req = test::TestRequest::get()
        .uri(&format!("/v1/acl/token/self?token={}", secret))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::put()
        .uri(&format!("/v1/acl/token/{}/clone", accessor))
        .set_json(json!({"Description": "ci copy"}))
        .to_request();
    let clone: Value = test::call_and_read_body_json(&app, req).await;
    assert_ne!(clone["AccessorID"], accessor.as_str());
    assert_ne!(clone["SecretID"], secret.as_str());
    assert_eq!(clone["Description"], "ci copy");

    let req = test::TestRequest::get()
        .uri("/v1/acl/tokens?policy=global-management")
        .to_request();
    let tokens: Value = test::call_and_read_body_json(&app, req).await;
    let tokens = tokens.as_array().unwrap();
    assert!(tokens.len() >= 3);
    assert!(tokens.iter().all(|t| t.get("SecretID").is_none()));

    let req = test::TestRequest::delete()
        .uri(&format!("/v1/acl/token/{}", accessor))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/token/self")
        .insert_header((X_CONSUL_TOKEN, secret.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// Authorization batch
// ============================================================================

#[actix_web::test]
async fn test_http_authorize_batch() {
    let app = create_test_app(config()).await;

    let req = test::TestRequest::post()
        .uri("/v1/internal/acl/authorize")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .set_json(json!([
            {"Resource": "node", "Segment": "web-1", "Access": "write"},
            {"Resource": "acl", "Access": "read"},
        ]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    let answers = body.as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["Resource"], "node");
    assert_eq!(answers[0]["Segment"], "web-1");
    assert_eq!(answers[0]["Allow"], true);
    assert_eq!(answers[1]["Allow"], true);

    // Anonymous under default deny
    let req = test::TestRequest::post()
        .uri("/v1/acl/authorize")
        .set_json(json!([{"Resource": "node", "Segment": "web-1", "Access": "read"}]))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body[0]["Allow"], false);
}

#[actix_web::test]
async fn test_http_authorize_rejects_bad_batches() {
    let app = create_test_app(config()).await;

    let oversized: Vec<Value> = (0..65)
        .map(|i| json!({"Resource": "node", "Segment": format!("n{}", i), "Access": "read"}))
        .collect();
    let req = test::TestRequest::post()
        .uri("/v1/internal/acl/authorize")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .set_json(Value::Array(oversized))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/v1/internal/acl/authorize")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .set_json(json!([{"Resource": "spaceship", "Access": "read"}]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/v1/internal/acl/authorize")
        .insert_header((X_CONSUL_TOKEN, "not-a-token"))
        .set_json(json!([{"Resource": "node", "Access": "read"}]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri("/v1/internal/acl/authorize?dc=dc9")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .set_json(json!([{"Resource": "node", "Access": "read"}]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}

// ============================================================================
// Auth methods, binding rules, login and logout
// ============================================================================

#[actix_web::test]
async fn test_http_login_logout() {
    let app = create_test_app(config()).await;

    let req = test::TestRequest::put()
        .uri("/v1/acl/policy")
        .set_json(json!({"Name": "team-web", "Rules": "service_prefix \"web\" { policy = \"write\" }"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::put()
        .uri("/v1/acl/auth-method")
        .set_json(json!({
            "Name": "static-users",
            "Type": "static",
            "MaxTokenTTL": "1h",
            "Config": {"Tokens": {"bearer-ana": {"team": "web"}}}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::put()
        .uri("/v1/acl/binding-rule")
        .set_json(json!({
            "AuthMethod": "static-users",
            "Selector": "team == \"web\"",
            "BindType": "policy",
            "BindName": "team-${team}"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/binding-rules?authmethod=static-users")
        .to_request();
    let rules: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri("/v1/acl/login")
        .set_json(json!({"AuthMethod": "static-users", "BearerToken": "bearer-ana"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let token: Value = test::read_body_json(resp).await;
    assert_eq!(token["AuthMethod"], "static-users");
    assert_eq!(token["Local"], true);
    assert_eq!(token["Policies"][0]["Name"], "team-web");
    assert!(token.get("ExpirationTime").is_some());
    let secret = token["SecretID"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/v1/acl/login")
        .set_json(json!({"AuthMethod": "static-users", "BearerToken": "bearer-eve"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // Only login tokens can be logged out
    let req = test::TestRequest::post()
        .uri("/v1/acl/logout")
        .insert_header((X_CONSUL_TOKEN, ROOT))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri("/v1/acl/logout")
        .insert_header((X_CONSUL_TOKEN, secret.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/token/self")
        .insert_header((X_CONSUL_TOKEN, secret.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_http_auth_method_config_round_trip() {
    let app = create_test_app(config()).await;

    let req = test::TestRequest::put()
        .uri("/v1/acl/auth-method")
        .set_json(json!({
            "Name": "k8s",
            "Type": "kubernetes",
            "Config": {"Host": "https://k8s.local:8443"}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/auth-method/k8s")
        .to_request();
    let method: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(method["Config"]["Host"], "https://k8s.local:8443");

    let req = test::TestRequest::get()
        .uri("/v1/acl/auth-methods")
        .to_request();
    let methods: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(methods[0]["Config"]["Host"], "https://k8s.local:8443");

    let req = test::TestRequest::delete()
        .uri("/v1/acl/auth-method/k8s")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/v1/acl/auth-method/k8s")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
