pub mod identity;
pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use tracing::warn;

use crate::{error::AppError, state::AppState};
use identity::Identity;

/// Emails permitted to use the admin API. Empty means every authenticated
/// user is permitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowlist(Vec<String>);

impl AdminAllowlist {
    /// Parses a comma-separated list; entries are trimmed and lower-cased.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(|entry| entry.trim().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn permits(&self, email: Option<&str>) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let email = email.unwrap_or_default().trim().to_lowercase();
        self.0.iter().any(|allowed| *allowed == email)
    }
}

/// An authenticated caller that also passed the admin allowlist.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub identity: Identity,
    access_token: String,
}

impl AdminUser {
    pub fn new(identity: Identity, access_token: impl Into<String>) -> Self {
        Self {
            identity,
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized("Missing bearer token"))?;

        let token = bearer.token().trim();
        if token.is_empty() {
            return Err(AppError::unauthorized("Missing bearer token"));
        }

        let identity = match state.identity.resolve(token).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(AppError::unauthorized("Invalid token")),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "token introspection failed");
                return Err(AppError::unauthorized("Invalid token"));
            }
        };

        if !state.config.admin_emails.permits(identity.email.as_deref()) {
            warn!(user_id = %identity.id, "caller is not on the admin allowlist");
            return Err(AppError::forbidden("Forbidden"));
        }

        Ok(AdminUser::new(identity, token))
    }
}
