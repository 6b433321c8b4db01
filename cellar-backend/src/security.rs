use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    X_XSS_PROTECTION,
};
use axum::middleware::Next;
use axum::response::Response;

/// Development policy: allows inline scripts and local dev servers
const DEBUG_CSP: &str = "default-src 'self' 'unsafe-inline'; \
    img-src 'self' data: blob: https:; \
    script-src 'self' 'unsafe-inline' 'unsafe-eval'; \
    style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
    font-src 'self' https://fonts.gstatic.com; \
    connect-src 'self' http://localhost:* http://127.0.0.1:* ws://localhost:* ws://127.0.0.1:*; \
    frame-ancestors 'none'; \
    base-uri 'self';";

const PRODUCTION_CSP: &str = "default-src 'self'; \
    img-src 'self' data: blob: https:; \
    script-src 'self'; \
    style-src 'self' https://fonts.googleapis.com; \
    font-src 'self' https://fonts.gstatic.com; \
    connect-src 'self'; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self';";

const PERMISSIONS_POLICY: &str =
    "camera=(), microphone=(), geolocation=(), payment=(), usb=(), bluetooth=()";

pub fn content_security_policy(debug: bool) -> &'static str {
    if debug { DEBUG_CSP } else { PRODUCTION_CSP }
}

/// Adds the security headers to every response, error responses included.
pub async fn security_headers(
    State(csp): State<&'static str>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(csp));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static(PERMISSIONS_POLICY),
    );

    response
}
