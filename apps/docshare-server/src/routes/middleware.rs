//! Response hardening and request throttling middleware

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::db::ClientInfo;
use crate::error::AppError;
use crate::rate_limit::RateLimiter;

/// Headers added to every response that does not already carry them
const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "geolocation=(), microphone=(), camera=()",
    ),
];

/// Add the standard security headers.
///
/// Framing is denied unless the handler set its own `Content-Security-Policy`
/// (the inline viewer does, with `frame-ancestors`).
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.entry(name).or_insert(HeaderValue::from_static(value));
    }
    if !headers.contains_key(header::CONTENT_SECURITY_POLICY) {
        headers
            .entry(header::X_FRAME_OPTIONS)
            .or_insert(HeaderValue::from_static("DENY"));
    }

    response
}

/// Refuse the request with 429 once the client's bucket is empty
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    client: ClientInfo,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client.ip_address.as_deref().unwrap_or("unknown");
    if !limiter.check(key) {
        tracing::warn!(client = key, path = %request.uri().path(), "Rate limit exceeded");
        return Err(AppError::RateLimited(
            "Too many requests, please try again later".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
