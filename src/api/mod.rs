/*
 * Responsibility
 * - HTTP surface of the gateway: routes, handlers, DTOs, extractors
 */
pub mod dto;
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::routes;
