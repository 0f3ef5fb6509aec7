use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::supabase::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves a bearer token to the identity it was issued for.
/// `Ok(None)` means the token is not valid; `Err` means we could not tell.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;
}

/// Token introspection through the hosted auth service (`GET /auth/v1/user`).
pub struct AuthApi {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl AuthApi {
    pub fn new(http: Client, base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            anon_key: anon_key.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for AuthApi {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .context("failed to reach auth service")?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                let err = ApiError::from_response(response).await;
                tracing::debug!(error = %err, "auth service rejected token");
                Ok(None)
            }
            status if status.is_success() => {
                let identity = response
                    .json::<Identity>()
                    .await
                    .context("failed to decode auth user")?;
                Ok(Some(identity))
            }
            _ => Err(ApiError::from_response(response).await)
                .context("auth service returned an error"),
        }
    }
}
