use std::sync::Arc;

use anyhow::Context;

use catalog_api::app;
use catalog_api::config::AppConfig;
use catalog_infra::command_dispatcher::spawn_audit_log;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    catalog_observability::init(config.log_format);

    let services = Arc::new(app::build_services(&config).await?);
    let _audit = spawn_audit_log(services.dispatcher.bus());
    let app = app::router(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
