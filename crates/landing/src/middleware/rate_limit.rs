//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: sign-in endpoints (~10/min per IP)
//! - `form_rate_limiter`: waitlist and feedback posts (~30/min per IP)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client IP, most trusted first.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "fly-client-ip",
];

/// Key extractor that reads the client IP from proxy headers.
///
/// `X-Forwarded-For` may carry a chain; the first entry is the client.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        CLIENT_IP_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(',').next())
            .find_map(|ip| ip.trim().parse::<IpAddr>().ok())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Rate limiter for sign-in endpoints: ~10 requests per minute per IP.
///
/// # Panics
///
/// Does not panic: `per_second(6)` and `burst_size(5)` are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6) // Replenish 1 token every 6 seconds
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Rate limiter for form posts: ~30 requests per minute per IP.
///
/// # Panics
///
/// Does not panic: `per_second(2)` and `burst_size(20)` are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn form_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(2) // Replenish 1 token every 2 seconds
        .burst_size(20)
        .finish()
        .expect("rate limiter config with per_second(2) and burst_size(20) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tower_governor::key_extractor::KeyExtractor;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/waitlist");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let req = request(&[
            ("x-forwarded-for", "10.0.0.1"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_chain_uses_first_entry() {
        let req = request(&[("x-forwarded-for", "198.51.100.4, 10.0.0.1")]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "198.51.100.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_garbage_falls_through_to_next_header() {
        let req = request(&[("x-forwarded-for", "unknown"), ("x-real-ip", "192.0.2.9")]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "192.0.2.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_no_headers_is_an_error() {
        assert!(ClientIpKeyExtractor.extract(&request(&[])).is_err());
    }
}
