use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = stockledger_infra::config::load_config().context("loading configuration")?;
    let app = stockledger_api::app::build_app(&config)
        .await
        .context("wiring services")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
