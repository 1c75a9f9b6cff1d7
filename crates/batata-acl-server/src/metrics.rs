// Metrics recorder and exposition for the ACL server
// The counters themselves are recorded by batata-acl through the metrics facade

use actix_web::{HttpResponse, web};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the ACL counters.
/// Should be called once at application startup
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "acl_authorize_requests_total",
        "Total number of authorization batches, labelled by local or remote path"
    );
    describe_counter!(
        "acl_authorize_checks_total",
        "Total number of individual authorization checks answered"
    );
    describe_counter!(
        "acl_login_total",
        "Total number of login attempts, labelled by result"
    );
    describe_counter!(
        "acl_token_cache_hits_total",
        "Total number of resolved-token cache hits"
    );
    describe_counter!(
        "acl_token_cache_misses_total",
        "Total number of resolved-token cache misses"
    );
}

/// GET /metrics in Prometheus text format
pub async fn render_metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(handle.render())
}
