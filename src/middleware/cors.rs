//! CORS stage of the security chain.
//!
//! Note:
//! - CORS is enforced by browsers; native apps and server-to-server calls carry no `Origin`
//!   and pass straight through.
//! - Runs first in the chain, so a disallowed cross-origin request is refused before CSRF,
//!   authentication or any backend call.
//!
//! Policy:
//! - Origins: `CORS_ALLOWED_ORIGINS` (comma-separated, exact match; `*` allows any origin),
//!   WITHOUT credentials.
//! - Methods: GET, POST, PATCH, DELETE.
//! - Headers: Authorization, Content-Type, XSRF-TOKEN, X-XSRF-TOKEN, Cookie.
//! - Requests from the gateway's own public origin are not cross-origin.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::error::GatewayError;
use crate::state::AppState;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(60 * 10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<HeaderName>,
    own_origin: Option<String>,
}

impl CorsPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cors_allowed_origins, &config.public_base_url)
    }

    pub fn new(allowed_origins: &[String], public_base_url: &str) -> Self {
        let origins = if allowed_origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            // An empty allowlist allows no cross-origin caller at all.
            AllowedOrigins::List(
                allowed_origins
                    .iter()
                    .map(|o| o.trim_end_matches('/'))
                    .filter_map(|o| HeaderValue::from_str(o).ok())
                    .collect(),
            )
        };

        let own_origin = url::Url::parse(public_base_url)
            .ok()
            .map(|u| u.origin().ascii_serialization());

        Self {
            origins,
            methods: vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE],
            headers: vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("xsrf-token"),
                HeaderName::from_static("x-xsrf-token"),
                header::COOKIE,
            ],
            own_origin,
        }
    }

    pub fn is_same_origin(&self, origin: &HeaderValue) -> bool {
        match (&self.own_origin, origin.to_str()) {
            (Some(own), Ok(origin)) => own.eq_ignore_ascii_case(origin),
            _ => false,
        }
    }

    pub fn allows_origin(&self, origin: &HeaderValue) -> bool {
        match &self.origins {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => list.iter().any(|v| v == origin),
        }
    }

    // HEAD rides along with GET, as browsers expect.
    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.contains(method)
            || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    pub fn allows_headers(&self, requested: &str) -> bool {
        requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .all(|h| {
                self.headers
                    .iter()
                    .any(|allowed| allowed.as_str().eq_ignore_ascii_case(h))
            })
    }

    /// Response-side CORS headers and preflight answers for permitted requests.
    pub fn layer(&self) -> CorsLayer {
        let layer = match &self.origins {
            AllowedOrigins::Any => CorsLayer::new().allow_origin(Any),
            AllowedOrigins::List(list) => {
                CorsLayer::new().allow_origin(AllowOrigin::list(list.iter().cloned()))
            }
        };

        layer
            .allow_methods(self.methods.clone())
            .allow_headers(self.headers.clone())
            .max_age(PREFLIGHT_MAX_AGE)
    }

    /// `Err(reason)` when a cross-origin request has to be refused.
    fn check(&self, req: &Request) -> Result<(), &'static str> {
        let Some(origin) = req.headers().get(header::ORIGIN) else {
            return Ok(());
        };
        if self.is_same_origin(origin) {
            return Ok(());
        }
        if !self.allows_origin(origin) {
            return Err("cors: origin not allowed");
        }

        let preflight_method = req
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .filter(|_| req.method() == Method::OPTIONS);

        match preflight_method {
            Some(requested) => {
                let method = requested
                    .to_str()
                    .ok()
                    .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
                    .ok_or("cors: invalid preflight method")?;
                if !self.allows_method(&method) {
                    return Err("cors: method not allowed");
                }
                let requested_headers = req
                    .headers()
                    .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if !self.allows_headers(requested_headers) {
                    return Err("cors: header not allowed");
                }
            }
            None => {
                if !self.allows_method(req.method()) {
                    return Err("cors: method not allowed");
                }
            }
        }

        Ok(())
    }
}

/// Refuse cross-origin requests the policy does not allow.
pub async fn enforce(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if let Err(reason) = state.cors.check(&req) {
        tracing::warn!(
            reason,
            method = %req.method(),
            path = req.uri().path(),
            origin = ?req.headers().get(header::ORIGIN),
            "cross-origin request refused"
        );
        return Err(GatewayError::forbidden(reason));
    }

    Ok(next.run(req).await)
}
