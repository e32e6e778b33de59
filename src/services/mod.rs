/*
 * Responsibility
 * - Domain services behind the HTTP layer
 *   - user_service: backend client, breaker: circuit breaker guarding it
 *   - auth: OIDC login, sessions, bearer tokens; cache: session storage backends
 */
pub mod auth;
pub mod breaker;
pub mod cache;
pub mod user_service;
