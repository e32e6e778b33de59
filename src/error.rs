/*
 * Responsibility
 * - The gateway-wide failure type (GatewayError), one variant per taxonomy row
 * - The mapper: GatewayError -> ErrorRecord (status / message / details)
 * - IntoResponse (uniform JSON body: { status, message, details })
 */
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::services::auth::oidc::OidcError;
use crate::services::auth::session::SessionError;
use crate::services::breaker::CallError;

/// Why a connection to a downstream service could not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamFailure {
    Timeout,
    UnresolvedHost,
    Tls,
    Connect,
}

impl DownstreamFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::UnresolvedHost => "unresolved_host",
            Self::Tls => "tls",
            Self::Connect => "connect",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend responded with {status}")]
    DownstreamHttp { status: StatusCode, body: String },
    #[error("downstream call failed ({}): {detail}", .kind.as_str())]
    Downstream {
        kind: DownstreamFailure,
        detail: String,
    },
    #[error("call not permitted: circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },
    #[error("authorization required")]
    AuthRequired,
    #[error("no route for {path}")]
    NotFound { path: String },
    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },
    #[error("request rejected: {message}")]
    Rejected { status: StatusCode, message: String },
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

/// What the client sees for a failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub status: StatusCode,
    pub message: String,
    pub details: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
    pub details: Map<String, Value>,
}

impl From<ErrorRecord> for ErrorResponse {
    fn from(record: ErrorRecord) -> Self {
        Self {
            status: record.status.as_u16(),
            message: record.message,
            details: record.details,
        }
    }
}

impl GatewayError {
    pub fn downstream(kind: DownstreamFailure, detail: impl Into<String>) -> Self {
        Self::Downstream {
            kind,
            detail: detail.into(),
        }
    }

    pub fn forbidden(reason: &'static str) -> Self {
        Self::Forbidden { reason }
    }

    pub fn unclassified(message: impl std::fmt::Display) -> Self {
        Self::Unclassified(anyhow::anyhow!("{message}"))
    }

    /// Map this failure onto exactly one row of the error taxonomy.
    ///
    /// Only logs; the returned record is a pure function of `self`.
    pub fn to_record(&self) -> ErrorRecord {
        let mut details = Map::new();

        let (status, message) = match self {
            Self::DownstreamHttp { status, body } => {
                details.insert("upstream_status".into(), json!(status.as_u16()));
                details.insert("body".into(), body_as_value(body));
                (*status, backend_message(body))
            }
            Self::Downstream { kind, detail } => {
                details.insert("cause".into(), json!(kind.as_str()));
                tracing::error!(cause = kind.as_str(), %detail, "downstream connection failed");
                let (status, message) = match kind {
                    DownstreamFailure::Timeout => {
                        (StatusCode::GATEWAY_TIMEOUT, "upstream service timed out")
                    }
                    DownstreamFailure::UnresolvedHost => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "upstream service host could not be resolved",
                    ),
                    DownstreamFailure::Tls => (
                        StatusCode::BAD_GATEWAY,
                        "secure connection to upstream service failed",
                    ),
                    DownstreamFailure::Connect => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "upstream service is unreachable",
                    ),
                };
                (status, message.to_string())
            }
            Self::CircuitOpen { breaker } => {
                details.insert("breaker".into(), json!(breaker));
                details.insert("state".into(), json!("open"));
                tracing::warn!(%breaker, "call rejected by open circuit breaker");
                (StatusCode::SERVICE_UNAVAILABLE, "service unavailable".into())
            }
            Self::AuthRequired => (StatusCode::UNAUTHORIZED, "authorization required".into()),
            Self::NotFound { path } => {
                details.insert("path".into(), json!(path));
                (StatusCode::NOT_FOUND, "resource not found".into())
            }
            Self::Forbidden { reason } => {
                details.insert("reason".into(), json!(reason));
                (
                    StatusCode::FORBIDDEN,
                    "you do not have permission to access this resource".into(),
                )
            }
            Self::Rejected { status, message } => (*status, message.clone()),
            Self::Unclassified(err) => {
                tracing::error!(error = ?err, "unclassified failure");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        if status.is_server_error()
            && matches!(self, Self::DownstreamHttp { .. } | Self::Rejected { .. })
        {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        ErrorRecord {
            status,
            message,
            details,
        }
    }
}

// Plain-text bodies are relayed as-is; a bare JSON string literal is unwrapped.
fn backend_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        _ => body.to_string(),
    }
}

fn body_as_value(body: &str) -> Value {
    serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let record = self.to_record();
        let status = record.status;
        (status, Json(ErrorResponse::from(record))).into_response()
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(e: JsonRejection) -> Self {
        Self::Rejected {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<PathRejection> for GatewayError {
    fn from(e: PathRejection) -> Self {
        Self::Rejected {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(e: SessionError) -> Self {
        Self::Unclassified(anyhow::Error::new(e))
    }
}

impl From<CallError<GatewayError>> for GatewayError {
    fn from(e: CallError<GatewayError>) -> Self {
        match e {
            CallError::NotPermitted { breaker } => Self::CircuitOpen { breaker },
            CallError::Failed(err) => err,
        }
    }
}

impl From<OidcError> for GatewayError {
    fn from(e: OidcError) -> Self {
        match e {
            // Callback replayed, forged or expired: the user has to log in again.
            OidcError::UnknownState | OidcError::InvalidIdToken(_) => Self::AuthRequired,
            OidcError::AuthorizationDenied(message) => Self::Rejected {
                status: StatusCode::UNAUTHORIZED,
                message,
            },
            other => Self::Unclassified(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_category() -> Vec<(GatewayError, StatusCode)> {
        vec![
            (
                GatewayError::DownstreamHttp {
                    status: StatusCode::NOT_FOUND,
                    body: "user not found".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::downstream(DownstreamFailure::Timeout, "elapsed"),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::downstream(DownstreamFailure::UnresolvedHost, "dns"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::downstream(DownstreamFailure::Tls, "handshake"),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::downstream(DownstreamFailure::Connect, "refused"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::CircuitOpen {
                    breaker: "user-service".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GatewayError::AuthRequired, StatusCode::UNAUTHORIZED),
            (
                GatewayError::NotFound {
                    path: "/nope".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::forbidden("csrf token missing"),
                StatusCode::FORBIDDEN,
            ),
            (
                GatewayError::unclassified("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ]
    }

    #[test]
    fn every_category_maps_to_its_status() {
        for (err, expected) in every_category() {
            assert_eq!(err.to_record().status, expected, "{err}");
        }
    }

    #[test]
    fn mapping_does_not_depend_on_call_order() {
        let forward: Vec<_> = every_category()
            .iter()
            .map(|(e, _)| e.to_record())
            .collect();
        let mut backward: Vec<_> = every_category()
            .iter()
            .rev()
            .map(|(e, _)| e.to_record())
            .collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn backend_body_becomes_the_message() {
        let err = GatewayError::DownstreamHttp {
            status: StatusCode::NOT_FOUND,
            body: "user not found".into(),
        };
        let record = err.to_record();
        assert_eq!(record.message, "user not found");
        assert_eq!(record.details["upstream_status"], json!(404));
    }

    #[test]
    fn json_string_body_is_unwrapped() {
        let err = GatewayError::DownstreamHttp {
            status: StatusCode::CONFLICT,
            body: "\"email already registered\"".into(),
        };
        assert_eq!(err.to_record().message, "email already registered");
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(
            GatewayError::CircuitOpen {
                breaker: "b".into()
            }
            .to_record()
            .message,
            "service unavailable"
        );
        assert_eq!(
            GatewayError::AuthRequired.to_record().message,
            "authorization required"
        );
        assert_eq!(
            GatewayError::forbidden("x").to_record().message,
            "you do not have permission to access this resource"
        );
    }

    #[test]
    fn unclassified_keeps_its_own_message() {
        let record = GatewayError::unclassified("session store offline").to_record();
        assert_eq!(record.message, "session store offline");
        assert!(record.details.is_empty());
    }

    #[tokio::test]
    async fn response_body_has_uniform_shape() {
        let response = GatewayError::AuthRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!(401));
        assert_eq!(body["message"], json!("authorization required"));
        assert!(body["details"].is_object());
    }
}
