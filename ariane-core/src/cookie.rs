//! Set-Cookie rendering and Cookie header parsing.

use std::collections::HashMap;
use std::fmt;

/// Session cookie (signed [`SessionPayload`](crate::session::SessionPayload)).
pub const SESSION_COOKIE: &str = "session";
/// WebAuthn ceremony challenge cookie.
pub const CHALLENGE_COOKIE: &str = "webauthn_chal";
/// ID token hint left by the OIDC login, read at sign-out.
pub const ID_TOKEN_COOKIE: &str = "cipher_id_token";
/// Single-logout marker.
pub const SLO_COOKIE: &str = "slo_user";

pub const SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const CHALLENGE_TTL_SECS: u64 = 300;
pub const SLO_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Attributes of a single Set-Cookie header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
            path: "/".to_string(),
            max_age: None,
        }
    }
}

impl CookieOptions {
    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }
}

/// Deployment-wide cookie defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self { secure: true }
    }
}

impl CookiePolicy {
    /// `Secure` unless plain-http development was asked for explicitly.
    /// Production ignores the opt-out.
    pub fn for_environment(production: bool, allow_insecure: bool) -> Self {
        Self {
            secure: production || !allow_insecure,
        }
    }

    pub fn options(&self, max_age: u64) -> CookieOptions {
        CookieOptions {
            secure: self.secure,
            ..CookieOptions::default()
        }
        .with_max_age(max_age)
    }

    pub fn make(&self, name: &str, value: &str, max_age: u64) -> String {
        make_cookie(name, value, &self.options(max_age))
    }

    pub fn clear(&self, name: &str) -> String {
        clear_cookie(
            name,
            &CookieOptions {
                secure: self.secure,
                ..CookieOptions::default()
            },
        )
    }
}

/// Render a Set-Cookie value.
pub fn make_cookie(name: &str, value: &str, opts: &CookieOptions) -> String {
    let mut parts = vec![format!("{name}={value}")];
    if let Some(max_age) = opts.max_age {
        parts.push(format!("Max-Age={max_age}"));
    }
    parts.push(format!("Path={}", opts.path));
    parts.push(format!("SameSite={}", opts.same_site));
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }
    if opts.secure {
        parts.push("Secure".to_string());
    }
    parts.join("; ")
}

/// Render a Set-Cookie value that deletes `name`.
pub fn clear_cookie(name: &str, opts: &CookieOptions) -> String {
    let opts = CookieOptions {
        max_age: Some(0),
        ..opts.clone()
    };
    make_cookie(name, "", &opts)
}

/// Parse a request `Cookie` header. Values are percent-decoded; a value that
/// does not decode is kept verbatim. The first occurrence of a name wins.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let decoded = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.entry(name.to_string()).or_insert(decoded);
    }
    cookies
}

/// Look up one cookie in a request `Cookie` header.
pub fn get_cookie(header: &str, name: &str) -> Option<String> {
    parse_cookie_header(header).remove(name)
}
