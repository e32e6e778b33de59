/*
 * Responsibility
 * - URL structure of the gateway
 * - which routes are public is decided by the access-rule table (middleware::auth::authorize),
 *   not here
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{
    auth::{callback, login, logout},
    fallback::{method_not_allowed, not_found},
    health::health,
    users::{create_user, get_user_by_email, get_user_by_id},
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/users/byId/{id}", get(get_user_by_id))
        .route("/users/byEmail/{email}", get(get_user_by_email))
        .route("/oauth2/authorization/{registration}", get(login))
        .route("/login/oauth2/code/{registration}", get(callback))
        .route("/logout", get(logout).post(logout))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
}
