//! Authentication stage: resolve who is calling, never reject.
//!
//! - `Authorization: Bearer <jwt>` is verified when a verification key is configured.
//! - Otherwise the `SESSION` cookie is looked up in the session store.
//!
//! A resolved caller is put into the request extensions as a `Principal`;
//! deciding whether one is required is left to the authorization stage.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::extractors::Principal;
use crate::middleware::cookies::{self, SESSION_COOKIE};
use crate::state::AppState;

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(principal) = resolve(&state, req.headers()).await {
        tracing::debug!(
            subject = %principal.subject,
            source = ?principal.source,
            "request authenticated"
        );
        req.extensions_mut().insert(principal);
    }

    next.run(req).await
}

async fn resolve(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    if let (Some(token), Some(verifier)) =
        (bearer_token(headers), state.access_verifier.as_ref())
    {
        match verifier.verify_verified(token) {
            Ok(verified) => return Some(Principal::from_token(verified)),
            Err(err) => tracing::warn!(error = %err, "access token verification failed"),
        }
    }

    let session_id = cookies::read(headers, SESSION_COOKIE)?;
    match state.sessions.load(&session_id).await {
        Ok(Some(session)) => Some(Principal::from_session(session)),
        Ok(None) => None,
        // Store trouble counts as "not logged in".
        Err(err) => {
            tracing::warn!(error = %err, "session lookup failed");
            None
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn ignores_other_schemes_and_empty_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcg=="),
        );
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
