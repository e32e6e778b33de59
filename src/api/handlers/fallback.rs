/*
 * Responsibility
 * - Unknown paths and unsupported methods, answered with the uniform error body
 */
use axum::http::{Method, StatusCode, Uri};

use crate::error::GatewayError;

pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound {
        path: uri.path().to_string(),
    }
}

pub async fn method_not_allowed(method: Method) -> GatewayError {
    GatewayError::Rejected {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: format!("method {} not allowed", method),
    }
}
