pub mod captcha;
pub mod health;
pub mod login;
pub mod status;
pub mod unlock;

pub use captcha::captcha;
pub use health::health;
pub use login::login;
pub use status::{account_status, defense_status, rate_limit_status};
pub use unlock::unlock;

use axum::http::HeaderMap;
use std::{env, net::SocketAddr};

/// Client address an attempt is tracked under: a proxy header when
/// present (name overridable via `VIGIL_IP_HEADER`), the peer address
/// otherwise.
pub(crate) fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    let header = env::var("VIGIL_IP_HEADER").unwrap_or_else(|_| "x-forwarded-for".to_string());

    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_address_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_address(&headers, peer), "203.0.113.9");
    }

    #[test]
    fn test_client_address_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.7:1234".parse().unwrap();
        assert_eq!(client_address(&HeaderMap::new(), peer), "192.0.2.7");
    }
}
