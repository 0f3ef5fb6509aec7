use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower::make::Shared;
use tracing_subscriber::EnvFilter;

use clientdesk::config::AppConfig;
use clientdesk::routes;
use clientdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        supabase_url = %config.supabase_url,
        service_role = config.has_service_role(),
        local_jwt = config.supabase_jwt_secret.is_some(),
        database_url = config.redacted_database_url().as_deref().unwrap_or("<rest>"),
        s3_endpoint = config.aws_endpoint_url.as_deref().unwrap_or("<rest>"),
        admin_allowlist = !config.admin_emails.is_empty(),
        server_host = %config.server_host,
        server_port = config.server_port,
        "loaded backend configuration"
    );
    if !config.has_service_role() {
        tracing::warn!(
            "SUPABASE_SERVICE_ROLE_KEY is not set; deletions run with the caller's row-level permissions"
        );
    }

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::from_config(config).await?;
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, Shared::new(router)).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
