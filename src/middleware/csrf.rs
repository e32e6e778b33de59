//! CSRF stage of the security chain (double-submit cookie).
//!
//! The token lives in the script-readable `XSRF-TOKEN` cookie; state-changing
//! requests must echo it in the `X-XSRF-TOKEN` header. A missing cookie is
//! issued on the way out so the SPA has one for its next write.

use axum::extract::{Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::middleware::cookies::{self, CSRF_COOKIE};
use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-xsrf-token";

/// Public user registration is called by clients that never loaded the SPA.
pub fn is_exempt(method: &Method, path: &str) -> bool {
    *method == Method::POST && path == "/users"
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn tokens_match(cookie: &str, header: &str) -> bool {
    cookie.as_bytes().ct_eq(header.as_bytes()).into()
}

pub async fn protect(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if !state.security.csrf_enabled {
        return Ok(next.run(req).await);
    }

    let cookie_token = cookies::read(req.headers(), CSRF_COOKIE);

    if !is_safe(req.method()) && !is_exempt(req.method(), req.uri().path()) {
        let header_token = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok());

        match (cookie_token.as_deref(), header_token) {
            (Some(expected), Some(actual)) if tokens_match(expected, actual) => {}
            (Some(_), Some(_)) => {
                tracing::warn!(path = req.uri().path(), "csrf token mismatch");
                return Err(GatewayError::forbidden("csrf token mismatch"));
            }
            _ => {
                tracing::warn!(path = req.uri().path(), "csrf token missing");
                return Err(GatewayError::forbidden("csrf token missing"));
            }
        }
    }

    let mut response = next.run(req).await;

    if cookie_token.is_none() {
        let token = Uuid::new_v4().to_string();
        let cookie = cookies::csrf(&token, state.security.secure_cookies)
            .map_err(GatewayError::unclassified)?;
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }

    Ok(response)
}
