//! Which requests the access gate looks at, and under which mode.

use crate::config::AuthMode;

use super::origin::hostname;

/// Reachable without any check
pub const PUBLIC_PATHS: &[&str] = &[
    "/api/oauth/github/start",
    "/api/oauth/github/callback",
    "/api/auth/session",
    "/api/auth/logout",
    "/api/diag",
    "/access-required",
    "/access-denied",
    "/logged-out",
    "/signout",
    "/slo",
    "/health",
    "/ready",
];

const BYPASS_PREFIXES: &[&str] = &[
    "/api/", "/_astro/", "/assets/", "/favicon", "/fonts/", "/images/",
];

const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "woff",
    "woff2",
];

fn is_asset(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((_, ext)) => ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Public pages, API routes and static assets skip the gate.
pub fn is_bypassed(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || BYPASS_PREFIXES.iter().any(|p| path.starts_with(p))
        || is_asset(path)
}

/// `app` never applies on a primary host; those stay public.
pub fn effective_mode(configured: AuthMode, host: &str, primary_hosts: &[String]) -> AuthMode {
    let name = hostname(host);
    if configured == AuthMode::App && primary_hosts.iter().any(|h| h == name) {
        AuthMode::Public
    } else {
        configured
    }
}

pub fn is_protected(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
}
