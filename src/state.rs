use std::sync::Arc;

use anyhow::Result;

use crate::{
    auth::{
        identity::{AuthApi, IdentityProvider},
        jwt::JwtVerifier,
        AdminUser,
    },
    cascade::CascadeExecutor,
    config::AppConfig,
    db,
    privilege::Grant,
    records::{pg::PgRecordStore, rest::PostgrestStore, RecordStore},
    s3,
    storage::{ObjectStorage, S3Storage, StorageApi},
    supabase::{build_http_client, ApiKeys},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub records: Arc<dyn RecordStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            records,
            storage,
            identity,
        }
    }

    /// Wires the backends selected by the configuration: direct Postgres when
    /// `DATABASE_URL` is set, an S3 endpoint when `AWS_ENDPOINT_URL` is set,
    /// local token verification when `SUPABASE_JWT_SECRET` is set. The hosted
    /// HTTP APIs are used otherwise.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let keys = ApiKeys::from_config(&config);

        let records: Arc<dyn RecordStore> = match &config.database_url {
            Some(database_url) => {
                let pool = db::init_pool_with_size(database_url, config.database_max_pool_size)?;
                Arc::new(PgRecordStore::new(pool))
            }
            None => Arc::new(PostgrestStore::new(
                http.clone(),
                config.supabase_url.clone(),
                keys.clone(),
            )),
        };

        let storage: Arc<dyn ObjectStorage> = if config.aws_endpoint_url.is_some() {
            let base = s3::load_sdk_config(&config).await;
            let elevated = s3::client_with(&base, s3::static_credentials(&config));
            Arc::new(S3Storage::new(
                base,
                elevated,
                config.supabase_project_ref.clone(),
                config.supabase_anon_key.clone(),
            ))
        } else {
            Arc::new(StorageApi::new(
                http.clone(),
                config.supabase_url.clone(),
                keys,
            ))
        };

        let identity: Arc<dyn IdentityProvider> = match JwtVerifier::from_config(&config) {
            Some(verifier) => Arc::new(verifier),
            None => Arc::new(AuthApi::new(
                http,
                config.supabase_url.clone(),
                config.supabase_anon_key.clone(),
            )),
        };

        Ok(Self::new(config, records, storage, identity))
    }

    /// A cascade executor acting with the privilege this deployment grants
    /// `user`.
    pub fn executor_for(&self, user: &AdminUser) -> CascadeExecutor {
        let grant = Grant::select(self.config.has_service_role(), user);
        CascadeExecutor::new(self.records.clone(), self.storage.clone(), grant)
    }
}
