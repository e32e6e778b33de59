//! Signing keys published by the identity provider (`jwks_uri`).
//!
//! Fetched on first use and cached. A token whose `kid` is not in the cache
//! triggers one refetch, at most once per `MIN_REFRESH_INTERVAL`, so rotated
//! keys are picked up while unknown `kid`s cannot hammer the provider.

use std::time::Duration;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::OidcError;

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Cached {
    set: JwkSet,
    fetched_at: Option<Instant>,
}

#[derive(Debug)]
pub struct KeySet {
    http: reqwest::Client,
    jwks_uri: String,
    cached: RwLock<Cached>,
}

impl KeySet {
    /// Empty cache; the first lookup fetches `jwks_uri`.
    pub fn remote(http: reqwest::Client, jwks_uri: impl Into<String>) -> Self {
        Self {
            http,
            jwks_uri: jwks_uri.into(),
            cached: RwLock::new(Cached {
                set: JwkSet { keys: Vec::new() },
                fetched_at: None,
            }),
        }
    }

    /// Start from an already known set, counted as freshly fetched.
    pub fn preloaded(http: reqwest::Client, jwks_uri: impl Into<String>, set: JwkSet) -> Self {
        let keys = Self::remote(http, jwks_uri);
        {
            let mut cached = keys.cached.write();
            cached.set = set;
            cached.fetched_at = Some(Instant::now());
        }
        keys
    }

    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, OidcError> {
        if let Some(key) = self.lookup(kid)? {
            return Ok(key);
        }
        if !self.refresh_due() {
            return Err(no_matching_key());
        }

        let set = self.fetch().await?;
        {
            let mut cached = self.cached.write();
            cached.set = set;
            cached.fetched_at = Some(Instant::now());
        }
        tracing::debug!(jwks_uri = %self.jwks_uri, "provider signing keys refreshed");

        self.lookup(kid)?.ok_or_else(no_matching_key)
    }

    fn lookup(&self, kid: Option<&str>) -> Result<Option<DecodingKey>, OidcError> {
        let cached = self.cached.read();
        let jwk = match kid {
            Some(kid) => cached.set.find(kid),
            // Without a `kid` only a single-key set is unambiguous.
            None if cached.set.keys.len() == 1 => cached.set.keys.first(),
            None => None,
        };

        jwk.map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|e| OidcError::InvalidIdToken(format!("unusable signing key: {e}")))
    }

    fn refresh_due(&self) -> bool {
        self.cached
            .read()
            .fetched_at
            .is_none_or(|at| at.elapsed() >= MIN_REFRESH_INTERVAL)
    }

    async fn fetch(&self) -> Result<JwkSet, OidcError> {
        let keys_error = |e: reqwest::Error| OidcError::Keys(format!("{}: {e}", self.jwks_uri));

        self.http
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(keys_error)?
            .json::<JwkSet>()
            .await
            .map_err(keys_error)
    }
}

fn no_matching_key() -> OidcError {
    OidcError::InvalidIdToken("no matching signing key".into())
}
