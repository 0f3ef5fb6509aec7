use std::env;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use clientdesk::{
    cascade::CascadeExecutor, config::AppConfig, db, privilege::Grant, state::AppState,
};

const USAGE: &str = "Usage: maintenance migrate | maintenance delete-client <client-id>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("delete-client") => {
            let raw = args.next().ok_or_else(|| anyhow!("{USAGE}"))?;
            let client_id = Uuid::parse_str(raw.trim())
                .with_context(|| format!("invalid client id {raw}"))?;
            delete_client(client_id).await?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn migrate() -> Result<()> {
    let config = AppConfig::from_env()?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    tracing::info!(
        component = "maintenance",
        database_url = config.redacted_database_url().as_deref().unwrap_or_default(),
        "running migrations"
    );

    let pool = db::init_pool_with_size(database_url, 1)?;
    let applied = db::run_migrations(&pool)?;
    println!("Applied {applied} migration(s).");
    Ok(())
}

/// Runs the client cascade with elevated access, for operators cleaning up
/// after a request that failed halfway.
async fn delete_client(client_id: Uuid) -> Result<()> {
    let config = AppConfig::from_env()?;
    config.ensure_elevated_access()?;
    tracing::info!(
        component = "maintenance",
        %client_id,
        service_role = config.has_service_role(),
        direct_database = config.database_url.is_some(),
        "deleting client"
    );

    let state = AppState::from_config(config).await?;
    let executor = CascadeExecutor::new(state.records, state.storage, Grant::Elevated);
    let report = executor
        .delete_client(client_id)
        .await
        .with_context(|| format!("failed to delete client {client_id}"))?;

    println!(
        "Client {client_id} deleted ({} file(s) removed).",
        report.removed_files
    );
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
