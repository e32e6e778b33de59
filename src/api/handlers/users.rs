/*
 * Responsibility
 * - /users handlers: forward to the user service, one backend call per request
 * - every backend call runs under the user-service circuit breaker
 * - 2xx bodies are relayed unchanged (after a shape check); every failure goes through the error mapper
 */
use std::future::Future;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};

use crate::{
    api::{
        dto::users::{CreateUserRequest, UserResponse},
        extractors::PrincipalExtractor,
    },
    error::GatewayError,
    services::user_service::{BackendResponse, REQUEST_ID_HEADER},
    state::AppState,
};

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(user) = payload?;
    let request_id = request_id(&headers);

    Ok(proxy(&state, || state.users.create_user(&user, request_id)).await)
}

pub async fn get_user_by_id(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, GatewayError> {
    let Path(id) = path?;
    tracing::debug!(subject = %principal.subject, id, "user lookup by id");

    Ok(proxy(&state, || state.users.get_by_id(id, request_id(&headers))).await)
}

pub async fn get_user_by_email(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, GatewayError> {
    let Path(email) = path?;
    tracing::debug!(subject = %principal.subject, "user lookup by email");

    Ok(proxy(&state, || {
        state.users.get_by_email(&email, request_id(&headers))
    })
    .await)
}

/// Run one backend call under the breaker and turn the outcome into a response.
///
/// An open breaker answers 503 without calling `call` at all.
async fn proxy<F, Fut>(state: &AppState, call: F) -> Response
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<BackendResponse, GatewayError>>,
{
    state
        .breaker
        .run(
            move || async move { relay(call().await?) },
            |err| GatewayError::from(err).into_response(),
        )
        .await
}

// Non-2xx answers never get here; the client already returned them as `Err`.
fn relay(backend: BackendResponse) -> Result<Response, GatewayError> {
    if !backend.body.is_empty() {
        serde_json::from_slice::<UserResponse>(&backend.body).map_err(|e| {
            GatewayError::unclassified(format!("unexpected user payload from backend: {e}"))
        })?;
    }

    let content_type = backend
        .content_type
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let mut response = (backend.status, backend.body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);

    Ok(response)
}

fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}
