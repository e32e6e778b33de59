//! Authorization stage: the ordered access-rule table.
//!
//! Rules are checked top to bottom and the first match wins; anything not
//! listed requires an authenticated caller. Unauthenticated callers get the
//! entry point: browsers are redirected to the login, everything else gets 401.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::extractors::Principal;
use crate::api::handlers::auth::{RETURN_TO_PARAM, found};
use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    PermitAll,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathMatch {
    Exact(&'static str),
    Prefix(&'static str),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => path == *p,
            Self::Prefix(p) => path.starts_with(p),
        }
    }
}

#[derive(Debug, Clone)]
struct AccessRule {
    // None matches every method.
    method: Option<Method>,
    path: PathMatch,
    access: Access,
}

#[derive(Debug, Clone)]
pub struct AccessRules {
    rules: Vec<AccessRule>,
    fallback: Access,
}

impl AccessRules {
    /// The gateway's table.
    pub fn gateway() -> Self {
        let permit = |method: Option<Method>, path: PathMatch| AccessRule {
            method,
            path,
            access: Access::PermitAll,
        };

        Self {
            rules: vec![
                permit(Some(Method::POST), PathMatch::Exact("/users")),
                permit(None, PathMatch::Exact("/health")),
                permit(None, PathMatch::Exact("/logout")),
                permit(None, PathMatch::Prefix("/oauth2/authorization/")),
                permit(None, PathMatch::Prefix("/login/oauth2/code/")),
            ],
            fallback: Access::Authenticated,
        }
    }

    pub fn required(&self, method: &Method, path: &str) -> Access {
        self.rules
            .iter()
            .find(|rule| {
                rule.method.as_ref().is_none_or(|m| m == method) && rule.path.matches(path)
            })
            .map_or(self.fallback, |rule| rule.access)
    }
}

pub async fn authorize(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let access = state.access_rules.required(req.method(), req.uri().path());

    if access == Access::Authenticated && req.extensions().get::<Principal>().is_none() {
        tracing::debug!(
            method = %req.method(),
            path = req.uri().path(),
            "unauthenticated request to protected route"
        );
        return entry_point(&state, &req);
    }

    next.run(req).await
}

fn entry_point(state: &AppState, req: &Request) -> Response {
    if !wants_html(req.headers()) {
        return GatewayError::AuthRequired.into_response();
    }

    let return_to = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(RETURN_TO_PARAM, return_to)
        .finish();

    found(&format!("{}?{}", state.oidc.login_path(), query))
}

/// A top-level browser navigation (not a script-initiated call).
fn wants_html(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));
    let is_xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));

    accepts_html && !is_xhr
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn registration_is_public_but_lookups_are_not() {
        let rules = AccessRules::gateway();
        assert_eq!(rules.required(&Method::POST, "/users"), Access::PermitAll);
        assert_eq!(rules.required(&Method::GET, "/users"), Access::Authenticated);
        assert_eq!(
            rules.required(&Method::GET, "/users/byId/1"),
            Access::Authenticated
        );
        assert_eq!(
            rules.required(&Method::GET, "/users/byEmail/a@b.c"),
            Access::Authenticated
        );
    }

    #[test]
    fn login_logout_and_health_are_public() {
        let rules = AccessRules::gateway();
        assert_eq!(rules.required(&Method::GET, "/health"), Access::PermitAll);
        assert_eq!(rules.required(&Method::POST, "/logout"), Access::PermitAll);
        assert_eq!(
            rules.required(&Method::GET, "/oauth2/authorization/okta"),
            Access::PermitAll
        );
        assert_eq!(
            rules.required(&Method::GET, "/login/oauth2/code/okta"),
            Access::PermitAll
        );
    }

    #[test]
    fn unknown_routes_require_authentication() {
        let rules = AccessRules::gateway();
        assert_eq!(rules.required(&Method::GET, "/admin"), Access::Authenticated);
        assert_eq!(
            rules.required(&Method::GET, "/healthz"),
            Access::Authenticated
        );
    }

    #[test]
    fn browser_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_html(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert!(wants_html(&headers));

        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(!wants_html(&headers));
    }
}
