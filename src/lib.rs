/*
 * Responsibility
 * - Crate surface: modules are public so integration tests can assemble the gateway
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
