/// Factory: build the auth services from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::oidc::{OidcClient, OidcError, ProviderMetadata};
use crate::services::auth::AccessTokenVerifier;

const ACCESS_TOKEN_LEEWAY_SECONDS: u64 = 60;

/// Discover the provider and build the relying-party client.
pub async fn build_oidc_client(
    config: &Config,
    http: reqwest::Client,
) -> Result<Arc<OidcClient>, OidcError> {
    let metadata = ProviderMetadata::discover(&http, &config.oidc.issuer).await?;
    tracing::info!(
        issuer = %metadata.issuer,
        end_session = metadata.end_session_endpoint.is_some(),
        "identity provider discovered"
    );

    Ok(Arc::new(OidcClient::new(config.oidc.clone(), metadata, http)))
}

/// `None` when no verification key is configured (bearer tokens are then ignored).
pub fn build_access_verifier(config: &Config) -> Result<Option<Arc<AccessTokenVerifier>>, String> {
    let Some(pem) = config.access_jwt_public_key_pem.as_deref() else {
        return Ok(None);
    };

    let verifier = AccessTokenVerifier::new(
        pem,
        &config.oidc.issuer,
        &config.oidc.audience,
        ACCESS_TOKEN_LEEWAY_SECONDS,
    )?;

    Ok(Some(Arc::new(verifier)))
}
