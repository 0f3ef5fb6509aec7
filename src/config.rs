use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::auth::AdminAllowlist;
use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: Option<String>,
    pub supabase_jwt_secret: Option<String>,
    pub supabase_jwt_audience: String,
    pub supabase_project_ref: Option<String>,
    pub admin_emails: AdminAllowlist,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub backend_timeout: Duration,
    pub database_url: Option<String>,
    pub database_max_pool_size: u32,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let supabase_url = first_var(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
            .context("SUPABASE_URL must be set")?
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = first_var(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"])
            .context("SUPABASE_ANON_KEY must be set")?;
        let supabase_service_role_key = non_empty_var("SUPABASE_SERVICE_ROLE_KEY");
        let supabase_jwt_secret = non_empty_var("SUPABASE_JWT_SECRET");
        let supabase_jwt_audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());
        let supabase_project_ref = non_empty_var("SUPABASE_PROJECT_REF")
            .or_else(|| project_ref_from_url(&supabase_url));
        let admin_emails = AdminAllowlist::parse(&env::var("ADMIN_EMAILS").unwrap_or_default());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let backend_timeout_secs: u64 = env::var("BACKEND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("BACKEND_TIMEOUT_SECS must be an integer")?;
        let database_url = non_empty_var("DATABASE_URL");
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let aws_endpoint_url = non_empty_var("AWS_ENDPOINT_URL");
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            supabase_jwt_secret,
            supabase_jwt_audience,
            supabase_project_ref,
            admin_emails,
            server_host,
            server_port,
            cors_allowed_origin,
            backend_timeout: Duration::from_secs(backend_timeout_secs.max(1)),
            database_url,
            database_max_pool_size,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
        })
    }

    pub fn has_service_role(&self) -> bool {
        self.supabase_service_role_key.is_some()
    }

    /// Elevated row access needs the service key or a direct database;
    /// elevated object access needs the service key or an S3 endpoint.
    pub fn ensure_elevated_access(&self) -> Result<()> {
        if !self.has_service_role() && self.database_url.is_none() {
            bail!("elevated row access requires SUPABASE_SERVICE_ROLE_KEY or DATABASE_URL");
        }
        if !self.has_service_role() && self.aws_endpoint_url.is_none() {
            bail!("elevated storage access requires SUPABASE_SERVICE_ROLE_KEY or AWS_ENDPOINT_URL");
        }
        Ok(())
    }

    pub fn redacted_database_url(&self) -> Option<String> {
        self.database_url.as_deref().map(redact_database_url)
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_empty_var(name))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `https://abcd1234.supabase.co` -> `abcd1234`. Self-hosted URLs have no
/// project ref and must set `SUPABASE_PROJECT_REF` explicitly.
fn project_ref_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    let (project_ref, rest) = host.split_once('.')?;
    rest.ends_with("supabase.co").then(|| project_ref.to_string())
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
