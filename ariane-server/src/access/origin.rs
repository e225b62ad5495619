//! Public origin of a request seen through proxies.

use axum::http::HeaderMap;

/// Used when a request carries no host at all
pub const FALLBACK_HOST: &str = "127.0.0.1:4321";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        // Proxies may append; the first hop is the client-facing one
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `x-forwarded-host`, then `host`.
pub fn request_host(headers: &HeaderMap) -> String {
    header(headers, "x-forwarded-host")
        .or_else(|| header(headers, "host"))
        .unwrap_or(FALLBACK_HOST)
        .to_ascii_lowercase()
}

/// Host without its port.
pub fn hostname(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:4321
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

fn is_local(host: &str) -> bool {
    let name = hostname(host);
    name == "localhost" || name.ends_with(".localhost") || name.starts_with("127.") || name == "::1"
}

/// `<proto>://<host>` for the caller, or `public_origin` when one is configured.
pub fn request_origin(headers: &HeaderMap, public_origin: Option<&str>) -> String {
    if let Some(origin) = public_origin {
        return origin.trim_end_matches('/').to_string();
    }

    let host = request_host(headers);
    let proto = header(headers, "x-forwarded-proto")
        .map(|p| p.to_ascii_lowercase())
        .unwrap_or_else(|| {
            if is_local(&host) {
                "http".to_string()
            } else {
                "https".to_string()
            }
        });
    format!("{proto}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_forwarded_headers_win() {
        let h = headers(&[
            ("host", "internal:8080"),
            ("x-forwarded-host", "example.com"),
            ("x-forwarded-proto", "https"),
        ]);
        assert_eq!(request_origin(&h, None), "https://example.com");
    }

    #[test]
    fn test_proto_defaults() {
        assert_eq!(
            request_origin(&headers(&[("host", "localhost:4321")]), None),
            "http://localhost:4321"
        );
        assert_eq!(
            request_origin(&headers(&[("host", "127.0.0.1:3000")]), None),
            "http://127.0.0.1:3000"
        );
        assert_eq!(
            request_origin(&headers(&[("host", "Example.com")]), None),
            "https://example.com"
        );
        assert_eq!(request_origin(&HeaderMap::new(), None), "http://127.0.0.1:4321");
    }

    #[test]
    fn test_public_origin_overrides() {
        let h = headers(&[("host", "localhost:4321")]);
        assert_eq!(
            request_origin(&h, Some("https://auth.example.com/")),
            "https://auth.example.com"
        );
    }

    #[test]
    fn test_hostname() {
        assert_eq!(hostname("example.com:443"), "example.com");
        assert_eq!(hostname("example.com"), "example.com");
        assert_eq!(hostname("[::1]:4321"), "::1");
    }
}
