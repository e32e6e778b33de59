//! OIDC relying-party client: login redirect, code exchange, ID token checks, logout URL.
//!
//! The identity provider is an external collaborator; this module only speaks the
//! standard authorization-code contract (discovery document + token endpoint).

pub mod authorization;
pub mod keys;

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::OidcSettings;
use crate::services::auth::session::PendingLogin;

pub use authorization::{AuthorizationRequest, with_audience};
pub use keys::KeySet;

// Clock skew tolerated on `exp`.
const ID_TOKEN_LEEWAY_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("provider discovery failed: {0}")]
    Discovery(String),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("invalid id token: {0}")]
    InvalidIdToken(String),
    #[error("provider signing keys unavailable: {0}")]
    Keys(String),
    #[error("unknown or expired login state")]
    UnknownState,
    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),
    #[error("invalid provider url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Subset of the OpenID provider discovery document the gateway uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl ProviderMetadata {
    /// Fetch `{issuer}/.well-known/openid-configuration`.
    pub async fn discover(http: &reqwest::Client, issuer: &str) -> Result<Self, OidcError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| OidcError::Discovery(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Discovery(format!(
                "{url}: status {}",
                response.status()
            )));
        }

        response
            .json::<Self>()
            .await
            .map_err(|e| OidcError::Discovery(format!("{url}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// Claims read from the ID token after a successful code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result of a completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub claims: IdTokenClaims,
    pub id_token: String,
}

#[derive(Debug, Clone)]
pub struct OidcClient {
    settings: OidcSettings,
    metadata: ProviderMetadata,
    keys: Arc<KeySet>,
    http: reqwest::Client,
}

impl OidcClient {
    pub fn new(settings: OidcSettings, metadata: ProviderMetadata, http: reqwest::Client) -> Self {
        let keys = KeySet::remote(http.clone(), metadata.jwks_uri.clone());
        Self {
            settings,
            metadata,
            keys: Arc::new(keys),
            http,
        }
    }

    /// Replace the provider key set (keys known up front).
    pub fn with_key_set(mut self, keys: KeySet) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn registration_id(&self) -> &str {
        &self.settings.registration_id
    }

    pub fn login_path(&self) -> String {
        format!("/oauth2/authorization/{}", self.settings.registration_id)
    }

    pub fn redirect_uri(&self, base_url: &str) -> String {
        format!(
            "{}/login/oauth2/code/{}",
            base_url.trim_end_matches('/'),
            self.settings.registration_id
        )
    }

    /// Build the authorization request for a new login, plus the state to keep until the callback.
    pub fn authorization_request(
        &self,
        base_url: &str,
        return_to: &str,
    ) -> (AuthorizationRequest, PendingLogin) {
        let state = random_token();
        let nonce = random_token();
        let code_verifier = format!("{}{}", random_token(), random_token());
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        let redirect_uri = self.redirect_uri(base_url);

        let request = AuthorizationRequest {
            authorization_uri: self.metadata.authorization_endpoint.clone(),
            client_id: self.settings.client_id.clone(),
            redirect_uri: redirect_uri.clone(),
            scopes: self.settings.scopes.clone(),
            state: state.clone(),
            nonce: nonce.clone(),
            additional_parameters: BTreeMap::from([
                ("code_challenge".to_string(), code_challenge),
                ("code_challenge_method".to_string(), "S256".to_string()),
            ]),
        };

        let pending = PendingLogin {
            state,
            nonce,
            code_verifier,
            redirect_uri,
            return_to: return_to.to_string(),
        };

        (with_audience(request, &self.settings.audience), pending)
    }

    /// Exchange the authorization code and validate the returned ID token.
    pub async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<LoginOutcome, OidcError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", pending.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
        ];

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| OidcError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OidcError::TokenExchange(format!("status {status}: {body}")));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| OidcError::TokenExchange(e.to_string()))?;

        let id_token = tokens
            .id_token
            .ok_or_else(|| {
                OidcError::InvalidIdToken("token response has no id_token".into())
            })?;

        let claims = self.validate_id_token(&id_token, &pending.nonce).await?;

        Ok(LoginOutcome { claims, id_token })
    }

    /// Verify the ID token signature and claims (iss / aud / exp / nonce / sub).
    ///
    /// HMAC-signed tokens are checked with the client secret; everything else
    /// against the provider's published keys.
    pub async fn validate_id_token(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, OidcError> {
        let header = jsonwebtoken::decode_header(id_token).map_err(invalid_id_token)?;

        let key = match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(self.settings.client_secret.as_bytes())
            }
            _ => self.keys.decoding_key(header.kid.as_deref()).await?,
        };

        // Providers differ on the trailing slash in `iss`.
        let issuer = self.metadata.issuer.trim_end_matches('/');
        let issuer_with_slash = format!("{}/", issuer);

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[issuer, issuer_with_slash.as_str()]);
        validation.set_audience(&[self.settings.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = ID_TOKEN_LEEWAY_SECONDS;

        let claims = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(invalid_id_token)?
            .claims;

        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(OidcError::InvalidIdToken("nonce mismatch".into()));
        }
        if claims.sub.trim().is_empty() {
            return Err(OidcError::InvalidIdToken("empty subject".into()));
        }

        Ok(claims)
    }

    /// Where to send the user agent after the local session is gone.
    ///
    /// Falls back to `post_logout_redirect_uri` itself when the provider has
    /// no end-session endpoint.
    pub fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Result<String, OidcError> {
        let Some(endpoint) = self.metadata.end_session_endpoint.as_deref() else {
            return Ok(post_logout_redirect_uri.to_string());
        };

        let mut url = Url::parse(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            query
                .append_pair("client_id", &self.settings.client_id)
                .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        }
        Ok(url.into())
    }
}

fn invalid_id_token(e: jsonwebtoken::errors::Error) -> OidcError {
    OidcError::InvalidIdToken(e.to_string())
}

fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}
