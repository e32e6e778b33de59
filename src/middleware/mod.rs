/*
 * Responsibility
 * - Public surface of the middleware layer
 * - chain: the ordered security stages (CORS -> CSRF -> authentication -> authorization)
 * - http / security_headers: transport concerns wrapped around everything
 */
pub mod auth;
pub mod chain;
pub mod cookies;
pub mod cors;
pub mod csrf;
pub mod http;
pub mod security_headers;
