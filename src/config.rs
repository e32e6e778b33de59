/*
 * Responsibility
 * - Load settings from the environment (.env supported): IdP client, CORS, backend, breaker
 * - Validate settings (startup fails when something required is missing)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// OAuth2/OIDC client registration for the identity provider.
#[derive(Clone)]
pub struct OidcSettings {
    pub issuer: String,
    pub registration_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    // Injected into every authorization request, even when empty.
    pub audience: String,
}

impl fmt::Debug for OidcSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the client secret
        f.debug_struct("OidcSettings")
            .field("issuer", &self.issuer)
            .field("registration_id", &self.registration_id)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Thresholds for the backend circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Failure percentage (1..=100) at which the breaker opens.
    pub failure_rate_threshold: u8,
    /// Number of most recent outcomes considered.
    pub sliding_window_size: usize,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: usize,
    pub open_cooldown: Duration,
    pub permitted_half_open_calls: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_cooldown: Duration::from_secs(60),
            permitted_half_open_calls: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub public_base_url: String,

    pub oidc: OidcSettings,
    pub access_jwt_public_key_pem: Option<String>,

    pub cors_allowed_origins: Vec<String>,
    pub csrf_enabled: bool,

    pub session_ttl_seconds: u64,
    pub valkey_url: Option<String>,

    pub user_service_url: String,
    pub backend_timeout: Duration,
    pub breaker: BreakerSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_base_url).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;

        let oidc = OidcSettings {
            issuer: required("OIDC_ISSUER")?.trim_end_matches('/').to_string(),
            registration_id: std::env::var("OIDC_REGISTRATION_ID")
                .unwrap_or_else(|_| "okta".to_string()),
            client_id: required("OIDC_CLIENT_ID")?,
            client_secret: required("OIDC_CLIENT_SECRET")?,
            scopes: std::env::var("OIDC_SCOPES")
                .unwrap_or_else(|_| "openid profile email".to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            audience: std::env::var("OIDC_AUDIENCE").unwrap_or_default(),
        };

        let access_jwt_public_key_pem = std::env::var("AUTH_JWT_PUBLIC_KEY_PEM")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.replace("\\n", "\n"));

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let csrf_enabled = match std::env::var("CSRF_ENABLED") {
            Ok(v) => v
                .parse::<bool>()
                .map_err(|_| ConfigError::Invalid("CSRF_ENABLED"))?,
            Err(_) => true,
        };

        let session_ttl_seconds = parse_or("SESSION_TTL_SECONDS", 1800)?;
        let valkey_url = std::env::var("VALKEY_URL").ok().filter(|s| !s.is_empty());

        let user_service_url = std::env::var("USER_SERVICE_URL")
            .unwrap_or_else(|_| "http://user-service".to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&user_service_url)
            .map_err(|_| ConfigError::Invalid("USER_SERVICE_URL"))?;

        let backend_timeout = Duration::from_millis(parse_or("BACKEND_TIMEOUT_MS", 5000)?);

        let defaults = BreakerSettings::default();
        let breaker = BreakerSettings {
            failure_rate_threshold: parse_or(
                "CB_FAILURE_RATE_THRESHOLD",
                defaults.failure_rate_threshold,
            )?,
            sliding_window_size: parse_or("CB_SLIDING_WINDOW_SIZE", defaults.sliding_window_size)?,
            minimum_calls: parse_or("CB_MINIMUM_CALLS", defaults.minimum_calls)?,
            open_cooldown: Duration::from_secs(parse_or(
                "CB_OPEN_COOLDOWN_SECONDS",
                defaults.open_cooldown.as_secs(),
            )?),
            permitted_half_open_calls: parse_or(
                "CB_HALF_OPEN_PERMITTED_CALLS",
                defaults.permitted_half_open_calls,
            )?,
        };
        validate_breaker(&breaker)?;

        Ok(Self {
            addr,
            app_env,
            public_base_url,
            oidc,
            access_jwt_public_key_pem,
            cors_allowed_origins,
            csrf_enabled,
            session_ttl_seconds,
            valkey_url,
            user_service_url,
            backend_timeout,
            breaker,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn validate_breaker(settings: &BreakerSettings) -> Result<(), ConfigError> {
    if settings.failure_rate_threshold == 0 || settings.failure_rate_threshold > 100 {
        return Err(ConfigError::Invalid("CB_FAILURE_RATE_THRESHOLD"));
    }
    if settings.sliding_window_size == 0 {
        return Err(ConfigError::Invalid("CB_SLIDING_WINDOW_SIZE"));
    }
    if settings.minimum_calls == 0 || settings.minimum_calls > settings.sliding_window_size {
        return Err(ConfigError::Invalid("CB_MINIMUM_CALLS"));
    }
    if settings.permitted_half_open_calls == 0 {
        return Err(ConfigError::Invalid("CB_HALF_OPEN_PERMITTED_CALLS"));
    }
    Ok(())
}
