use aws_config::meta::region::RegionProviderChain;
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;

/// Shared SDK configuration for the S3-compatible storage endpoint.
/// Credentials are attached per client in [`client_with`].
pub async fn load_sdk_config(config: &AppConfig) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Static access keys from the environment, if both halves are present.
pub fn static_credentials(config: &AppConfig) -> Option<Credentials> {
    match (&config.aws_access_key_id, &config.aws_secret_access_key) {
        (Some(access_key), Some(secret_key)) => Some(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        )),
        _ => None,
    }
}

/// Session credentials for acting as the caller: the project ref and anon
/// key identify the project, the caller's JWT is the session token, so
/// storage policies see the caller rather than the service.
pub fn session_credentials(project_ref: &str, anon_key: &str, access_token: &str) -> Credentials {
    Credentials::new(
        project_ref.to_string(),
        anon_key.to_string(),
        Some(access_token.to_string()),
        None,
        "caller-session",
    )
}

pub fn client_with(base: &SdkConfig, credentials: Option<Credentials>) -> S3Client {
    let mut builder = S3ConfigBuilder::from(base).force_path_style(true);
    if let Some(credentials) = credentials {
        builder = builder.credentials_provider(credentials);
    }
    S3Client::from_conf(builder.build())
}
