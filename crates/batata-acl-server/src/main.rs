//! Main entry point for the Batata ACL server.

use actix_web::{App, HttpServer, middleware, web};
use batata_acl_server::logging::{LoggingConfig, init_logging};
use batata_acl_server::metrics::{init_metrics, render_metrics};
use batata_acl_server::settings::{Cli, Settings};
use batata_acl_server::{build_service, route};
use clap::Parser;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;

    let _logging_guard = init_logging(&LoggingConfig::from_settings(&settings.log))?;
    let metrics_handle = web::Data::new(init_metrics()?);

    let (address, port) = settings.bind_address();
    info!(
        datacenter = %settings.acl.datacenter,
        primary_datacenter = %settings.acl.primary_datacenter(),
        enabled = settings.acl.enabled,
        default_policy = ?settings.acl.default_policy,
        remote_datacenters = settings.acl.remote_datacenters.len(),
        "Starting ACL server on {}:{}",
        address,
        port
    );

    let service = web::Data::new(build_service(settings.acl.clone())?);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(metrics_handle.clone())
            .wrap(middleware::Logger::default())
            .configure(route::configure)
            .route("/metrics", web::get().to(render_metrics))
    });
    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }
    server.bind((address, port))?.run().await?;

    info!("ACL server stopped");
    Ok(())
}
