//! Client IP resolution.
//!
//! The storefront runs behind Cloudflare and Fly.io, so the socket peer is
//! usually a proxy. Proxy headers are checked in order of trust:
//! `CF-Connecting-IP`, the first `X-Forwarded-For` hop, `X-Real-IP`,
//! `Fly-Client-IP`; the socket peer address is the last resort.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

/// The client address according to proxy headers, if any.
#[must_use]
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
        .or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .or_else(|| header("fly-client-ip").and_then(|s| s.trim().parse().ok()))
}

/// The client address of a request: proxy headers, then the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Option<IpAddr> {
    forwarded_ip(headers).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Extractor for the client address.
///
/// Falls back to `0.0.0.0` when neither headers nor connection info are
/// available (e.g. the server was not started with connect info).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip(&parts.headers, &parts.extensions).unwrap_or_else(|| {
            tracing::warn!("No client address available");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        Ok(Self(ip))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Extensions, HeaderValue};

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let map = headers(&[
            ("cf-connecting-ip", "198.51.100.1"),
            ("x-forwarded-for", "203.0.113.9"),
        ]);
        assert_eq!(forwarded_ip(&map), Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_first_forwarded_hop() {
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(forwarded_ip(&map), Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_garbage_header_falls_through() {
        let map = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "2001:db8::1")]);
        assert_eq!(forwarded_ip(&map), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_socket_peer_fallback() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo::<SocketAddr>("192.0.2.4:5123".parse().unwrap()));
        assert_eq!(
            client_ip(&HeaderMap::new(), &extensions),
            Some("192.0.2.4".parse().unwrap())
        );
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }
}
