use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use keyward_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keyward_observability::init();

    let config = AppConfig::from_env()?;
    let services = keyward_api::app::services::build_services(&config).await?;
    let app = keyward_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
