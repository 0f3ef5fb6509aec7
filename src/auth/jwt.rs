use anyhow::Result;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::{Identity, IdentityProvider};
use crate::config::AppConfig;

/// Verifies access tokens locally with the project's JWT secret instead of
/// asking the auth service on every request.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    audience: String,
}

impl JwtVerifier {
    pub fn new(secret: &str, audience: impl Into<String>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            audience: audience.into(),
        }
    }

    /// `None` unless `SUPABASE_JWT_SECRET` is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config
            .supabase_jwt_secret
            .as_deref()
            .map(|secret| Self::new(secret, config.supabase_jwt_audience.clone()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityProvider for JwtVerifier {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        match self.verify_token(token) {
            Ok(claims) => Ok(Some(Identity {
                id: claims.sub,
                email: claims.email,
            })),
            Err(err) => {
                tracing::debug!(error = %err, "rejected access token");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub aud: String,
    pub exp: usize,
}
