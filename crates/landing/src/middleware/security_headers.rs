//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! The landing page pulls htmx, canvas-confetti and html2canvas from
//! jsDelivr, fonts from Google Fonts, and shows Google profile photos. The
//! policy allows exactly those origins on top of `'self'`.

use axum::{
    extract::Request,
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

/// Content Security Policy for every response.
///
/// `img-src data:` covers the screenshot preview. `frame-src 'self'` covers
/// the same-origin clone html2canvas renders into.
pub const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'none'; \
     script-src 'self' https://cdn.jsdelivr.net; \
     style-src 'self' https://fonts.googleapis.com; \
     font-src 'self' https://fonts.gstatic.com; \
     img-src 'self' data: https://lh3.googleusercontent.com; \
     media-src 'self'; \
     connect-src 'self'; \
     frame-src 'self'; \
     object-src 'none'; \
     base-uri 'self'; \
     form-action 'self'; \
     frame-ancestors 'none'; \
     upgrade-insecure-requests";

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY`
/// - `X-Content-Type-Options: nosniff`
/// - `Referrer-Policy: strict-origin-when-cross-origin` (the Google consent
///   screen shows the requesting origin)
/// - `Content-Security-Policy` (see [`CONTENT_SECURITY_POLICY_VALUE`])
/// - `Permissions-Policy` - everything off except autoplay for the
///   background video
/// - `Cache-Control: no-store` on pages and fragments, left alone for
///   `/static`
/// - `Cross-Origin-Opener-Policy: same-origin`
/// - `Cross-Origin-Embedder-Policy: credentialless` so CDN scripts load
///   without CORP headers
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let is_static = request.uri().path().starts_with("/static/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             autoplay=(self), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             microphone=(), \
             payment=(), \
             usb=()",
        ),
    );

    if !is_static {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));
    }

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("credentialless"),
    );

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "page" }))
            .route("/static/css/landing.css", get(|| async { "css" }))
            .layer(axum::middleware::from_fn(security_headers_middleware))
    }

    #[tokio::test]
    async fn test_page_gets_no_store_and_csp() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store, max-age=0");
        assert_eq!(headers.get(X_FRAME_OPTIONS).unwrap(), "DENY");
        let csp = headers.get(CONTENT_SECURITY_POLICY).unwrap().to_str().unwrap();
        assert!(csp.contains("img-src 'self' data:"));
        assert!(csp.contains("https://cdn.jsdelivr.net"));
    }

    #[tokio::test]
    async fn test_static_assets_keep_cacheability() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/static/css/landing.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }
}
