//! Server-side sessions and pending OAuth2 logins, kept in the cache backend.
//!
//! The browser only ever holds an opaque session id; deleting the cache entry
//! invalidates the session for every replica at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::cache::client::ttl_seconds;
use crate::services::cache::{CacheClient, CacheError};

const SESSION_PREFIX: &str = "gateway:session";
const LOGIN_PREFIX: &str = "gateway:oauth2:state";
// A user has this long to finish the login at the identity provider.
const PENDING_LOGIN_TTL_SECONDS: u64 = 600;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("could not allocate a unique session id")]
    IdCollision,
}

/// Logged-in principal, as stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    // Sent back to the IdP as `id_token_hint` on logout.
    #[serde(default)]
    pub id_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the callback needs to finish a login started by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub return_to: String,
}

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.cache.backend_name())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheClient>, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl: ttl_seconds(ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a new session and return its id.
    pub async fn create(&self, session: &Session) -> Result<String, SessionError> {
        let value = serde_json::to_string(session)?;

        for _ in 0..3 {
            let id = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
            if self
                .cache
                .set_if_absent_with_ttl(&session_key(&id), &value, self.ttl)
                .await?
            {
                tracing::debug!(subject = %session.subject, "session created");
                return Ok(id);
            }
        }

        Err(SessionError::IdCollision)
    }

    pub async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        match self.cache.get_string(&session_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove the session. Returns whether it existed.
    pub async fn invalidate(&self, id: &str) -> Result<bool, SessionError> {
        let removed = self.cache.del(&session_key(id)).await?;
        Ok(removed > 0)
    }

    pub async fn save_pending_login(&self, pending: &PendingLogin) -> Result<(), SessionError> {
        let value = serde_json::to_string(pending)?;
        self.cache
            .set_with_ttl(
                &login_key(&pending.state),
                &value,
                ttl_seconds(PENDING_LOGIN_TTL_SECONDS),
            )
            .await?;
        Ok(())
    }

    /// Consume the pending login for `state`; a second call for the same state returns `None`.
    pub async fn take_pending_login(
        &self,
        state: &str,
    ) -> Result<Option<PendingLogin>, SessionError> {
        match self.cache.take_string(&login_key(state)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn session_key(id: &str) -> String {
    format!("{}:{}", SESSION_PREFIX, id)
}

fn login_key(state: &str) -> String {
    format!("{}:{}", LOGIN_PREFIX, state)
}
