//! Edge access proxy assertions
//!
//! The proxy in front of the origin signs a short-lived RS256 JWT for each
//! authenticated caller. Keys come from the proxy's JWKS endpoint, fixed by
//! configuration, and are cached for an hour. Request headers never choose
//! the key set or the issuer.

use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, jwk, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use url::Url;

use ariane_core::get_cookie;

use crate::config::EdgeAccessConfig;

pub const ASSERTION_HEADER: &str = "cf-access-jwt-assertion";
pub const EMAIL_HEADER: &str = "cf-access-authenticated-user-email";
pub const ORG_HEADER: &str = "cf-access-org-id";
/// Browser-side copy of the assertion
pub const AUTHORIZATION_COOKIE: &str = "CF_Authorization";

/// JWKS cache TTL (1 hour)
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("No edge assertion presented")]
    Missing,

    #[error("Invalid edge assertion: {0}")]
    Invalid(String),

    #[error("Edge signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// Claims of a verified assertion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeClaims(pub Map<String, Value>);

impl EdgeClaims {
    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Direct lookup first; claim names are often URLs full of dots, so the
    /// dot-path walk is only a fallback for nested claims.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(name) {
            return Some(value);
        }
        if !name.contains('.') {
            return None;
        }
        let mut parts = name.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Accepts a boolean or a string, compared case-insensitively.
    pub fn is_approved(&self, claim: &str, expected: &str) -> bool {
        match self.claim(claim) {
            Some(Value::Bool(b)) => b.to_string() == expected,
            Some(Value::String(s)) => s.to_ascii_lowercase() == expected,
            _ => false,
        }
    }

    pub fn groups(&self, claim: &str) -> Vec<&str> {
        self.claim(claim)
            .and_then(Value::as_array)
            .map(|groups| groups.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Cached JWKS keys with timestamp
struct CachedJwks {
    keys: Vec<jwk::Jwk>,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct JwksResponse {
    keys: Vec<jwk::Jwk>,
}

/// JWKS cache for one endpoint
pub struct JwksCache {
    keys: RwLock<Option<CachedJwks>>,
    jwks_url: String,
    http_client: reqwest::Client,
}

impl JwksCache {
    pub fn new(jwks_url: String, http_client: reqwest::Client) -> Self {
        Self {
            keys: RwLock::new(None),
            jwks_url,
            http_client,
        }
    }

    /// Get cached keys, fetching if expired or not yet cached
    async fn get_keys(&self) -> Result<Vec<jwk::Jwk>, EdgeError> {
        {
            let cache = self.keys.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let mut cache = self.keys.write().await;

        // Another task may have refreshed while we waited
        if let Some(ref cached) = *cache {
            if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                return Ok(cached.keys.clone());
            }
        }

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.jwks_url, "Failed to fetch edge JWKS");
                EdgeError::KeysUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, url = %self.jwks_url, "Edge JWKS endpoint returned error");
            return Err(EdgeError::KeysUnavailable(format!("status {status}")));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse edge JWKS response");
            EdgeError::KeysUnavailable(e.to_string())
        })?;

        let keys = jwks.keys;
        tracing::info!(key_count = keys.len(), url = %self.jwks_url, "Refreshed edge JWKS cache");

        *cache = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    async fn find_key(&self, kid: &str) -> Result<jwk::Jwk, EdgeError> {
        let keys = self.get_keys().await?;
        keys.into_iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| EdgeError::Invalid(format!("no key for kid '{kid}'")))
    }
}

/// Checks edge assertions against the configured proxy.
pub struct EdgeVerifier {
    config: EdgeAccessConfig,
    /// Key set and expected issuer; `None` when no proxy is configured
    anchor: Option<(JwksCache, String)>,
}

/// JWKS URL and issuer for the configured proxy.
///
/// The team domain gives both. A bare `jwks_url` pins the issuer to that
/// URL's origin.
pub fn trust_anchor(config: &EdgeAccessConfig) -> Option<(String, String)> {
    let team_issuer = config
        .team_domain
        .as_deref()
        .map(|team| format!("https://{}", team.trim_end_matches('/')));

    match (&config.jwks_url, team_issuer) {
        (Some(url), Some(issuer)) => Some((url.clone(), issuer)),
        (Some(url), None) => {
            let issuer = Url::parse(url).ok()?.origin().ascii_serialization();
            Some((url.clone(), issuer))
        }
        (None, Some(issuer)) => Some((format!("{issuer}/cdn-cgi/access/certs"), issuer)),
        (None, None) => None,
    }
}

impl EdgeVerifier {
    pub fn new(config: EdgeAccessConfig, http_client: reqwest::Client) -> Self {
        let anchor = trust_anchor(&config)
            .map(|(url, issuer)| (JwksCache::new(url, http_client), issuer));
        Self { config, anchor }
    }

    pub fn config(&self) -> &EdgeAccessConfig {
        &self.config
    }

    /// Whether assertions can be verified at all.
    pub fn is_configured(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn jwks_url(&self) -> Option<&str> {
        self.anchor.as_ref().map(|(cache, _)| cache.jwks_url.as_str())
    }

    pub fn issuer(&self) -> Option<&str> {
        self.anchor.as_ref().map(|(_, issuer)| issuer.as_str())
    }

    /// The assertion header, or the `CF_Authorization` cookie.
    pub fn assertion(headers: &HeaderMap) -> Option<String> {
        if let Some(token) = headers
            .get(ASSERTION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Some(token.to_string());
        }
        headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| get_cookie(cookies, AUTHORIZATION_COOKIE))
            .filter(|v| !v.is_empty())
    }

    /// Any of the headers the proxy adds to authenticated requests.
    pub fn has_edge_headers(headers: &HeaderMap) -> bool {
        [ASSERTION_HEADER, EMAIL_HEADER, ORG_HEADER]
            .iter()
            .any(|name| headers.contains_key(*name))
    }

    pub fn email_header(headers: &HeaderMap) -> Option<String> {
        headers
            .get(EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub async fn verify(&self, token: &str) -> Result<EdgeClaims, EdgeError> {
        let (cache, issuer) = self
            .anchor
            .as_ref()
            .ok_or_else(|| EdgeError::KeysUnavailable("edge proxy not configured".to_string()))?;

        let header =
            decode_header(token).map_err(|e| EdgeError::Invalid(format!("header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| EdgeError::Invalid("header missing 'kid'".to_string()))?;

        let jwk = cache.find_key(&kid).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            tracing::error!(error = %e, kid = %kid, "Failed to convert edge JWK to decoding key");
            EdgeError::Invalid("unusable signing key".to_string())
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.set_issuer(&[issuer]);
        match &self.config.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map_err(|e| EdgeError::Invalid(e.to_string()))?;
        Ok(EdgeClaims(data.claims))
    }

    pub async fn verify_request(&self, headers: &HeaderMap) -> Result<EdgeClaims, EdgeError> {
        let token = Self::assertion(headers).ok_or(EdgeError::Missing)?;
        self.verify(&token).await
    }

    pub fn is_approved(&self, claims: &EdgeClaims) -> bool {
        claims.is_approved(&self.config.approved_claim, &self.config.approved_value)
    }

    pub fn has_required_groups(&self, claims: &EdgeClaims) -> bool {
        let groups = claims.groups(&self.config.groups_claim);
        self.config
            .required_groups
            .iter()
            .all(|required| groups.contains(&required.as_str()))
    }

    /// Whether the request carries a verified assertion with the approved claim.
    pub async fn approved(&self, headers: &HeaderMap) -> bool {
        match self.verify_request(headers).await {
            Ok(claims) => self.is_approved(&claims),
            Err(EdgeError::Missing) => false,
            Err(e) => {
                tracing::debug!(error = %e, "Edge assertion rejected");
                false
            }
        }
    }
}

impl std::fmt::Debug for EdgeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeVerifier")
            .field("team_domain", &self.config.team_domain)
            .field("jwks_url", &self.jwks_url())
            .finish()
    }
}
