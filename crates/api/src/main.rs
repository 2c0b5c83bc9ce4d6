use std::sync::Arc;

use anyhow::Context;
use itemflow_infra::AppConfig;

use itemflow_api::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    itemflow_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let services = Arc::new(app::services::build_services(&config));
    let _sweeper = app::spawn_job_sweeper(services.clone(), config.job_sweep_interval);
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        transactions = ?config.transactions,
        max_retries = config.retry.max_retries,
        "listening"
    );

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
