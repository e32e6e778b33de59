//! HTTP client for the backend user-management service.
//!
//! Mirrors the gateway's inbound paths one-to-one. Transport failures are
//! classified here so the error mapper never has to look at reqwest types.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode, header};
use url::Url;

use crate::api::dto::users::CreateUserRequest;
use crate::error::{DownstreamFailure, GatewayError};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UserServiceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl UserServiceClient {
    /// `timeout` bounds the whole exchange (connect + response body).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(GatewayError::unclassified)?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::unclassified(format!(
                "user service url cannot be a base: {base_url}"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::unclassified)?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn create_user(
        &self,
        user: &CreateUserRequest,
        request_id: Option<&str>,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self.url(&["users"]);
        let request = self.http.post(url).json(user);
        self.send(request, request_id).await
    }

    pub async fn get_by_id(
        &self,
        id: i64,
        request_id: Option<&str>,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self.url(&["users", "byId", &id.to_string()]);
        self.send(self.http.get(url), request_id).await
    }

    pub async fn get_by_email(
        &self,
        email: &str,
        request_id: Option<&str>,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self.url(&["users", "byEmail", email]);
        self.send(self.http.get(url), request_id).await
    }

    // Path segments are percent-encoded by `url`.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Every non-2xx backend response comes back as `Err`, so the breaker
    /// records a 404 as a failed call just like a 500.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        request_id: Option<&str>,
    ) -> Result<BackendResponse, GatewayError> {
        let request = match request_id {
            Some(id) => request.header(REQUEST_ID_HEADER, id),
            None => request,
        };

        let response = request.send().await.map_err(|e| classify(&e))?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|e| classify(&e))?;

        tracing::debug!(status = status.as_u16(), "user service responded");

        if !status.is_success() {
            return Err(GatewayError::DownstreamHttp {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Sort a transport failure into the downstream taxonomy.
///
/// Only the cause chain is inspected. reqwest's own message embeds the request
/// URL, and user-supplied path segments must not steer the classification.
pub fn classify(err: &reqwest::Error) -> GatewayError {
    let detail = cause_chain(err).unwrap_or_else(|| err.to_string());

    if err.is_timeout() {
        return GatewayError::downstream(DownstreamFailure::Timeout, detail);
    }

    match io_error_kind(err) {
        Some(io::ErrorKind::TimedOut) => {
            return GatewayError::downstream(DownstreamFailure::Timeout, detail);
        }
        Some(
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted,
        ) => {
            return GatewayError::downstream(DownstreamFailure::Connect, detail);
        }
        _ => {}
    }

    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("dns error")
        || lowered.contains("failed to lookup address")
        || lowered.contains("name or service not known")
        || lowered.contains("no such host")
    {
        return GatewayError::downstream(DownstreamFailure::UnresolvedHost, detail);
    }
    if lowered.contains("tls")
        || lowered.contains("ssl")
        || lowered.contains("certificate")
        || lowered.contains("handshake")
    {
        return GatewayError::downstream(DownstreamFailure::Tls, detail);
    }
    if err.is_connect() || err.is_request() {
        return GatewayError::downstream(DownstreamFailure::Connect, detail);
    }

    GatewayError::unclassified(detail)
}

// Causes below the top-level reqwest error, joined; `None` when there are none.
fn cause_chain(err: &reqwest::Error) -> Option<String> {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    (!parts.is_empty()).then(|| parts.join(": "))
}

fn io_error_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        source = cause.source();
    }
    None
}
