/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 *   - backend client + its breaker, OIDC client, session store, CORS policy, access rules
 * - Clone is cheap (everything inside is Arc or Arc-backed)
 */
use std::sync::Arc;

use crate::config::Config;
use crate::error::GatewayError;
use crate::middleware::auth::authorize::AccessRules;
use crate::middleware::cors::CorsPolicy;
use crate::services::auth::{AccessTokenVerifier, OidcClient, SessionStore};
use crate::services::breaker::CircuitBreaker;
use crate::services::cache::CacheClient;
use crate::services::user_service::UserServiceClient;

pub const USER_SERVICE_BREAKER: &str = "user-service";

/// Settings the security stages and auth handlers read per request.
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub public_base_url: String,
    pub csrf_enabled: bool,
    pub secure_cookies: bool,
}

impl SecuritySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_base_url: config.public_base_url.clone(),
            csrf_enabled: config.csrf_enabled,
            secure_cookies: config.public_base_url.starts_with("https://"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub users: UserServiceClient,
    pub breaker: Arc<CircuitBreaker>,
    pub oidc: Arc<OidcClient>,
    pub sessions: SessionStore,
    pub access_verifier: Option<Arc<AccessTokenVerifier>>,
    pub cors: Arc<CorsPolicy>,
    pub access_rules: Arc<AccessRules>,
    pub security: Arc<SecuritySettings>,
}

impl AppState {
    pub fn new(
        config: &Config,
        oidc: Arc<OidcClient>,
        cache: Arc<dyn CacheClient>,
        access_verifier: Option<Arc<AccessTokenVerifier>>,
    ) -> Result<Self, GatewayError> {
        let users = UserServiceClient::new(&config.user_service_url, config.backend_timeout)?;

        Ok(Self {
            users,
            breaker: Arc::new(CircuitBreaker::new(USER_SERVICE_BREAKER, config.breaker)),
            oidc,
            sessions: SessionStore::new(cache, config.session_ttl_seconds),
            access_verifier,
            cors: Arc::new(CorsPolicy::from_config(config)),
            access_rules: Arc::new(AccessRules::gateway()),
            security: Arc::new(SecuritySettings::from_config(config)),
        })
    }
}
