//! Request extractors: client key for rate limiting and Basic credentials
//! for the stats read path.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use pricetrack_service::track::Credentials;

/// Identifier used to rate-limit a client. `None` when no address could be
/// derived; such requests are always limited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub Option<String>);

impl ClientKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Derives the client key from the request.
///
/// `X-Forwarded-For` (first hop) takes priority, then `X-Real-IP`, then the
/// socket address of the direct connection.
pub fn client_key(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    header_ip(headers, "x-forwarded-for")
        .or_else(|| header_ip(headers, "x-real-ip"))
        .or_else(|| connect.map(|ci| ci.0.ip()))
        .map(|ip| ip.to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let connect = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        Ok(Self(client_key(&parts.headers, connect)))
    }
}

/// Parses an `Authorization: Basic <base64(user:password)>` header.
///
/// A missing header or a different scheme counts as no credentials; a
/// `Basic` header that does not decode is malformed.
pub fn basic_credentials(headers: &HeaderMap) -> Credentials {
    let Some(raw) = headers.get(AUTHORIZATION) else {
        return Credentials::Missing;
    };
    let Ok(raw) = raw.to_str() else {
        return Credentials::Malformed;
    };

    let raw = raw.trim();
    let (scheme, encoded) = raw.split_once(' ').unwrap_or((raw, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return Credentials::Missing;
    }

    let decoded = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return Credentials::Malformed,
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Credentials::Malformed;
    };

    match decoded.split_once(':') {
        Some((user, password)) => Credentials::Basic {
            user: user.to_string(),
            password: password.to_string(),
        },
        None => Credentials::Malformed,
    }
}

/// Basic credentials presented with the request.
#[derive(Debug, Clone)]
pub struct BasicAuth(pub Credentials);

impl<S: Send + Sync> FromRequestParts<S> for BasicAuth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(basic_credentials(&parts.headers)))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn connect(addr: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(addr.parse().unwrap())
    }

    #[test]
    fn forwarded_for_takes_priority() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        let ci = connect("127.0.0.1:5000");
        assert_eq!(client_key(&h, Some(&ci)).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_real_ip_then_socket() {
        let h = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_key(&h, None).as_deref(), Some("198.51.100.2"));

        let ci = connect("[::1]:8080");
        assert_eq!(client_key(&HeaderMap::new(), Some(&ci)).as_deref(), Some("::1"));
    }

    #[test]
    fn no_address_means_no_key() {
        assert_eq!(client_key(&HeaderMap::new(), None), None);
        assert_eq!(client_key(&headers(&[("x-forwarded-for", "")]), None), None);
    }

    #[test]
    fn parses_basic_credentials() {
        // admin:pa:ss, password may contain colons
        let h = headers(&[("authorization", "Basic YWRtaW46cGE6c3M=")]);
        assert_eq!(
            basic_credentials(&h),
            Credentials::Basic {
                user: "admin".into(),
                password: "pa:ss".into()
            }
        );

        let h = headers(&[("authorization", "basic YWRtaW46cGE6c3M=")]);
        assert!(matches!(basic_credentials(&h), Credentials::Basic { .. }));
    }

    #[test]
    fn other_schemes_count_as_missing() {
        assert_eq!(basic_credentials(&HeaderMap::new()), Credentials::Missing);
        let h = headers(&[("authorization", "Bearer abc")]);
        assert_eq!(basic_credentials(&h), Credentials::Missing);
    }

    #[test]
    fn undecodable_basic_is_malformed() {
        for value in ["Basic", "Basic !!!", "Basic YWRtaW4="] {
            let h = headers(&[("authorization", value)]);
            assert_eq!(basic_credentials(&h), Credentials::Malformed, "{value}");
        }
    }
}
