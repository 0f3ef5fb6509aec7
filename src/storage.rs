use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{Delete, Error as S3Error, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use reqwest::Client;
use serde_json::json;

use crate::privilege::Grant;
use crate::s3;
use crate::supabase::{check, ApiKeys};

/// Keys per S3 `DeleteObjects` request allowed by the protocol.
const S3_DELETE_LIMIT: usize = 1000;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Removes `paths` from `bucket`. Errors carry the backend's message so
    /// callers can recognise "not found" responses.
    async fn remove_objects(&self, grant: &Grant, bucket: &str, paths: &[String]) -> Result<()>;
}

/// The hosted storage HTTP API (`DELETE /storage/v1/object/{bucket}`).
pub struct StorageApi {
    http: Client,
    base_url: String,
    keys: ApiKeys,
}

impl StorageApi {
    pub fn new(http: Client, base_url: impl Into<String>, keys: ApiKeys) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            keys,
        }
    }
}

#[async_trait]
impl ObjectStorage for StorageApi {
    async fn remove_objects(&self, grant: &Grant, bucket: &str, paths: &[String]) -> Result<()> {
        let request = self
            .http
            .delete(format!("{}/storage/v1/object/{bucket}", self.base_url))
            .json(&json!({ "prefixes": paths }));
        let response = self
            .keys
            .authorize(request, grant)?
            .send()
            .await
            .context("failed to reach storage service")?;
        check(response).await?;
        Ok(())
    }
}

/// An S3-compatible endpoint. Elevated calls use the configured static
/// keys; caller calls use session credentials built from the caller token.
pub struct S3Storage {
    base: SdkConfig,
    elevated: S3Client,
    project_ref: Option<String>,
    anon_key: String,
}

impl S3Storage {
    pub fn new(
        base: SdkConfig,
        elevated: S3Client,
        project_ref: Option<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        Self {
            base,
            elevated,
            project_ref,
            anon_key: anon_key.into(),
        }
    }

    fn client_for(&self, grant: &Grant) -> Result<S3Client> {
        match grant {
            Grant::Elevated => Ok(self.elevated.clone()),
            Grant::Caller(caller) => {
                let project_ref = self.project_ref.as_deref().ok_or_else(|| {
                    anyhow!("caller-scoped S3 access requires SUPABASE_PROJECT_REF")
                })?;
                let credentials =
                    s3::session_credentials(project_ref, &self.anon_key, caller.access_token());
                Ok(s3::client_with(&self.base, Some(credentials)))
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn remove_objects(&self, grant: &Grant, bucket: &str, paths: &[String]) -> Result<()> {
        let client = self.client_for(grant)?;

        for chunk in paths.chunks(S3_DELETE_LIMIT) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .context("failed to build object identifiers")?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .context("failed to build delete request")?;

            let output = client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|err| {
                    request_failure(bucket, err.code(), DisplayErrorContext(&err).to_string())
                })?;

            let failures = rejected_keys(output.errors());
            if !failures.is_empty() {
                bail!(
                    "failed to delete {} object(s) from {bucket}: {}",
                    failures.len(),
                    failures.join("; ")
                );
            }
        }

        Ok(())
    }
}

/// A missing bucket reads as "not found" so the remover treats it as done.
fn request_failure(bucket: &str, code: Option<&str>, detail: String) -> anyhow::Error {
    match code {
        Some("NoSuchBucket") => anyhow!("bucket {bucket} not found"),
        _ => anyhow!(detail),
    }
}

/// Per-key failures of a `DeleteObjects` call, minus keys that were
/// already gone.
fn rejected_keys(errors: &[S3Error]) -> Vec<String> {
    errors
        .iter()
        .filter(|failure| failure.code() != Some("NoSuchKey"))
        .map(|failure| {
            format!(
                "{}: {}",
                failure.key().unwrap_or("<unknown>"),
                failure
                    .message()
                    .or(failure.code())
                    .unwrap_or("delete failed")
            )
        })
        .collect()
}
