use nimbus_api::app::{build_app, services::build_services};
use nimbus_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    nimbus_observability::init();

    let config = AppConfig::from_env()?;
    if config.insecure_jwt_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let crm = build_services(&config).await?;
    let app = build_app(crm, &config.jwt_secret);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
