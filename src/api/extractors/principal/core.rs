use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GatewayError;
use crate::state::AppState;

use super::Principal;

/// Handler-side access to the authenticated caller.
/// Relies on the authentication stage having put a `Principal` into the request
/// extensions; when it is missing the request is rejected as unauthenticated.
pub struct PrincipalExtractor(pub Principal);

impl FromRequestParts<AppState> for PrincipalExtractor
where
    AppState: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(PrincipalExtractor)
            .ok_or(GatewayError::AuthRequired)
    }
}
