/*!
 * Authenticated principal extractor
 *
 * Responsibility:
 * - Hand the principal resolved by the authentication stage to handlers
 * - Keep the axum wiring in `core` and the plain types in `types`
 *
 * Public API:
 * - Principal / AuthSource
 * - PrincipalExtractor
 */

mod core;
mod types;

pub use core::PrincipalExtractor;
pub use types::{AuthSource, Principal};
