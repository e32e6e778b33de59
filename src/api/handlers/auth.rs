/*
 * Responsibility
 * - GET /oauth2/authorization/{registration}: start the authorization-code login
 * - GET /login/oauth2/code/{registration}: finish it, create the session
 * - GET|POST /logout: drop the session, then send the browser to the IdP end-session endpoint
 */
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::GatewayError,
    middleware::cookies::{self, SESSION_COOKIE},
    services::auth::{Session, oidc::OidcError},
    state::AppState,
};

pub const RETURN_TO_PARAM: &str = "return_to";

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// 302 Found to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => GatewayError::unclassified("invalid redirect location").into_response(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Path(registration): Path<String>,
    Query(params): Query<LoginParams>,
    uri: Uri,
) -> Result<Response, GatewayError> {
    ensure_registration(&state, &registration, &uri)?;

    let return_to = local_path_or_root(params.return_to.as_deref());
    let (request, pending) = state
        .oidc
        .authorization_request(&state.security.public_base_url, &return_to);
    state.sessions.save_pending_login(&pending).await?;

    let url = request.to_url().map_err(GatewayError::unclassified)?;
    tracing::info!(%registration, "redirecting to identity provider");

    Ok(found(url.as_str()))
}

pub async fn callback(
    State(state): State<AppState>,
    Path(registration): Path<String>,
    Query(params): Query<CallbackParams>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    ensure_registration(&state, &registration, &uri)?;

    if let Some(error) = params.error {
        tracing::warn!(%error, "identity provider returned an error");
        let reason = params.error_description.unwrap_or(error);
        return Err(OidcError::AuthorizationDenied(reason).into());
    }
    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        return Err(GatewayError::Rejected {
            status: StatusCode::BAD_REQUEST,
            message: "authorization response is missing code or state".into(),
        });
    };

    let pending = state
        .sessions
        .take_pending_login(&login_state)
        .await?
        .ok_or(OidcError::UnknownState)?;
    let outcome = state.oidc.exchange_code(&code, &pending).await?;

    // A login always gets a fresh session id.
    if let Some(previous) = cookies::read(&headers, SESSION_COOKIE) {
        state.sessions.invalidate(&previous).await?;
    }

    let session = Session {
        subject: outcome.claims.sub,
        email: outcome.claims.email,
        name: outcome.claims.name,
        id_token: Some(outcome.id_token),
        created_at: Utc::now(),
    };
    let session_id = state.sessions.create(&session).await?;
    tracing::info!(subject = %session.subject, "login completed");

    let cookie = cookies::session(
        &session_id,
        state.sessions.ttl().as_secs(),
        state.security.secure_cookies,
    )
    .map_err(GatewayError::unclassified)?;

    let mut response = found(&pending.return_to);
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

/// The session entry is deleted before the redirect is sent.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let mut id_token_hint = None;

    if let Some(session_id) = cookies::read(&headers, SESSION_COOKIE) {
        if let Some(session) = state.sessions.load(&session_id).await? {
            id_token_hint = session.id_token;
        }
        if state.sessions.invalidate(&session_id).await? {
            tracing::info!("session invalidated");
        }
    }

    let target = state
        .oidc
        .end_session_url(id_token_hint.as_deref(), &state.security.public_base_url)?;

    let cookie = cookies::expire(SESSION_COOKIE, state.security.secure_cookies)
        .map_err(GatewayError::unclassified)?;
    let mut response = found(&target);
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

fn ensure_registration(
    state: &AppState,
    registration: &str,
    uri: &Uri,
) -> Result<(), GatewayError> {
    if registration == state.oidc.registration_id() {
        Ok(())
    } else {
        Err(GatewayError::NotFound {
            path: uri.path().to_string(),
        })
    }
}

// Only same-site relative paths; anything else would be an open redirect.
fn local_path_or_root(candidate: Option<&str>) -> String {
    match candidate {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
