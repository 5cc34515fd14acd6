use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::ServiceError;

/// Rewrites the empty 408 produced by the timeout layer into the standard error body.
///
/// Must sit directly outside `TimeoutLayer` and inside the request id middleware.
pub async fn timeout_envelope_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    if response.status() == StatusCode::REQUEST_TIMEOUT
        && !response.headers().contains_key(header::CONTENT_TYPE)
    {
        tracing::warn!("request exceeded the configured timeout");
        return ServiceError::RequestTimeout.into_response();
    }

    response
}
