//! The security filter chain.
//!
//! Stage order is fixed and explicit; `ServiceBuilder` runs the first layer outermost:
//!
//! 1. CORS: refuse disallowed cross-origin requests, answer preflights
//! 2. CSRF: double-submit token check for state-changing requests
//! 3. Authentication: resolve the caller (session cookie or bearer token)
//! 4. Authorization: access-rule table, login redirect / 401 for anonymous callers
//!
//! Any stage that refuses a request short-circuits; later stages and handlers never run.

use axum::Router;
use axum::middleware::from_fn_with_state;
use tower::ServiceBuilder;

use crate::middleware::auth::{access, authorize};
use crate::middleware::{cors, csrf};
use crate::state::AppState;

/// Wrap every route (and the fallback) in the security stages.
///
/// Must be called after all routes and fallbacks have been added.
pub fn apply(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let stages = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), cors::enforce))
        .layer(state.cors.layer())
        .layer(from_fn_with_state(state.clone(), csrf::protect))
        .layer(from_fn_with_state(state.clone(), access::authenticate))
        .layer(from_fn_with_state(state.clone(), authorize::authorize));

    router.layer(stages)
}
