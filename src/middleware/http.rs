//! Transport-level middleware wrapped around the whole gateway.
//!
//! - Request-Id generation + propagation (`x-request-id`); handlers forward it to the backend
//! - Access logging (TraceLayer), with the request id on the span
//! - Body size limit
//! - Overall request timeout, kept above the backend timeout so backend
//!   timeouts surface as 504 from the error mapper rather than from here

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::error_handling::HandleErrorLayer;
use axum::http::{Request, StatusCode, header::HeaderName};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::services::user_service::REQUEST_ID_HEADER;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;
const TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub fn apply(router: Router, backend_timeout: Duration) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let layers = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                tracing::warn!("request exceeded the gateway timeout");
                GatewayError::Rejected {
                    status: StatusCode::REQUEST_TIMEOUT,
                    message: "request timed out".into(),
                }
            } else {
                GatewayError::unclassified(err)
            }
        }))
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id
                )
            }),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::new(backend_timeout + TIMEOUT_MARGIN));

    router.layer(layers)
}
