//! Rate limiting middleware for the HTTP pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::gate::{ClientRequest, Decision, GateResponse, RateGate};

/// Axum middleware that runs every request through the gate.
///
/// The request's path and peer address form the gate's request descriptor.
/// Allowed requests continue down the pipeline untouched; denied requests get
/// the canonical 429. A counter store failure surfaces as 500, the pipeline's
/// convention for failed middleware — the gate does not guess a decision.
pub async fn enforce_rate_limit(
    State(gate): State<Arc<RateGate>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let descriptor = ClientRequest::new(request.uri().path(), Some(addr.ip()));

    match gate.check(&descriptor).await {
        Ok(Decision::Allow) => next.run(request).await,
        Ok(Decision::Deny { retry_after }) => {
            into_http_response(GateResponse::too_many_requests(retry_after))
        }
        Err(e) => {
            error!(error = %e, path = %descriptor.path(), "Rate limit check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "rate limit check failed").into_response()
        }
    }
}

/// Convert a gate response descriptor into an axum response.
pub(crate) fn into_http_response(response: GateResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
