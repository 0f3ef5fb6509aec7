use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::privilege::Grant;
use crate::utils::json::error_message;

pub fn build_http_client(config: &AppConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.backend_timeout)
        .build()
        .context("failed to build backend HTTP client")
}

/// The API keys the hosted services expect in `apikey`. The anon key pairs
/// with a caller token; the service key stands alone.
#[derive(Clone)]
pub struct ApiKeys {
    anon_key: String,
    service_role_key: Option<String>,
}

impl ApiKeys {
    pub fn new(anon_key: impl Into<String>, service_role_key: Option<String>) -> Self {
        Self {
            anon_key: anon_key.into(),
            service_role_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.supabase_anon_key.clone(),
            config.supabase_service_role_key.clone(),
        )
    }

    pub fn authorize(&self, request: RequestBuilder, grant: &Grant) -> Result<RequestBuilder> {
        let (apikey, bearer) = match grant {
            Grant::Elevated => {
                let key = self
                    .service_role_key
                    .as_deref()
                    .ok_or_else(|| anyhow!("elevated access requires SUPABASE_SERVICE_ROLE_KEY"))?;
                (key, key)
            }
            Grant::Caller(caller) => (self.anon_key.as_str(), caller.access_token()),
        };
        Ok(request.header("apikey", apikey).bearer_auth(bearer))
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let code = body.get("code").and_then(|code| match code {
            Value::String(code) => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        });
        let message = error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("backend request failed")
                .to_string()
        });
        Self {
            status,
            code,
            message,
        }
    }
}

/// Turns a non-success response into an [`ApiError`], passes the rest on.
pub async fn check(response: Response) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_response(response).await)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::auth::identity::Identity;
    use crate::privilege::CallerGrant;

    fn caller() -> Grant {
        Grant::Caller(CallerGrant::new(
            "caller-jwt",
            Identity {
                id: Uuid::new_v4(),
                email: None,
            },
        ))
    }

    fn headers(request: RequestBuilder) -> (String, String) {
        let request = request.build().unwrap();
        let get = |name: &str| {
            request
                .headers()
                .get(name)
                .unwrap()
                .to_str()
                .unwrap()
                .to_string()
        };
        (get("apikey"), get("authorization"))
    }

    #[test]
    fn caller_grant_sends_anon_key_and_user_token() {
        let keys = ApiKeys::new("anon", Some("service".to_string()));
        let client = Client::new();
        let request = keys
            .authorize(client.get("http://localhost/rest/v1/files"), &caller())
            .unwrap();
        let (apikey, authorization) = headers(request);
        assert_eq!(apikey, "anon");
        assert_eq!(authorization, "Bearer caller-jwt");
    }

    #[test]
    fn elevated_grant_sends_service_key_twice() {
        let keys = ApiKeys::new("anon", Some("service".to_string()));
        let client = Client::new();
        let request = keys
            .authorize(client.get("http://localhost/rest/v1/files"), &Grant::Elevated)
            .unwrap();
        let (apikey, authorization) = headers(request);
        assert_eq!(apikey, "service");
        assert_eq!(authorization, "Bearer service");
    }

    #[test]
    fn elevated_grant_without_service_key_is_rejected() {
        let keys = ApiKeys::new("anon", None);
        let client = Client::new();
        assert!(keys
            .authorize(client.get("http://localhost"), &Grant::Elevated)
            .is_err());
    }
}
