//! HTTP request handlers
//!
//! Ceremony, OAuth and logout endpoints live next to their logic in
//! `webauthn`, `oauth` and `logout`; this module holds the small status endpoints and
//! the response helpers they share.

pub mod diag;
pub mod health;
pub mod session;

use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};

pub use crate::state::AppState;
pub use diag::{diag, DiagConfigured, DiagResponse};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use session::{approval_status, session, ApprovalStatusResponse, SessionResponse};

/// Raw `Cookie` request header
pub fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
}

/// Append one `Set-Cookie` header per cookie.
pub fn with_cookies(response: impl IntoResponse, cookies: Vec<String>) -> Response {
    let mut response = response.into_response();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Dropping malformed Set-Cookie value"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_with_cookies_appends_each() {
        let response = with_cookies(
            StatusCode::NO_CONTENT,
            vec!["a=1; Path=/".to_string(), "b=; Max-Age=0; Path=/".to_string()],
        );
        let values: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["a=1; Path=/", "b=; Max-Age=0; Path=/"]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_cookie_header() {
        let mut headers = HeaderMap::new();
        assert!(cookie_header(&headers).is_none());
        headers.insert(header::COOKIE, HeaderValue::from_static("session=abc; x=y"));
        assert_eq!(cookie_header(&headers), Some("session=abc; x=y"));
    }
}
