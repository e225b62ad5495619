//! Payloads carried inside signed cookies.
//!
//! All timestamps are epoch milliseconds. The `_at` variants take the clock
//! explicitly and are the ones used by the Wasm bindings, where the system
//! clock is unavailable.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cookie::{CHALLENGE_TTL_SECS, SLO_TTL_SECS};
use crate::error::{ArianeError, Result};
use crate::signer::{sign_json, verify_json};

/// Current time as epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Body of the `session` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SessionPayload {
    pub fn new(sub: impl Into<String>, now_ms: u64, ttl_secs: u64) -> Self {
        Self {
            sub: sub.into(),
            iat: now_ms,
            exp: now_ms.saturating_add(ttl_secs.saturating_mul(1000)),
            provider: None,
            login: None,
            email: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.exp
    }
}

/// Sign a session payload into a cookie value.
pub fn mint_session(payload: &SessionPayload, secret: &[u8]) -> Result<String> {
    sign_json(payload, secret)
}

/// Verify a session cookie value and check its expiry.
pub fn read_session_at(token: &str, secret: &[u8], now_ms: u64) -> Result<SessionPayload> {
    let payload: SessionPayload = verify_json(token, secret)?;
    if payload.is_expired_at(now_ms) {
        return Err(ArianeError::Expired);
    }
    Ok(payload)
}

pub fn read_session(token: &str, secret: &[u8]) -> Result<SessionPayload> {
    read_session_at(token, secret, now_millis())
}

/// Which WebAuthn ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// Body of the `webauthn_chal` cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// The challenge as sent to the authenticator (base64url).
    pub c: String,
    /// Issue time.
    pub t: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<CeremonyKind>,
    /// Serialized verifier state for the ceremony in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<serde_json::Value>,
}

impl ChallengePayload {
    pub fn new(challenge: impl Into<String>, kind: CeremonyKind, now_ms: u64) -> Self {
        Self {
            c: challenge.into(),
            t: now_ms,
            k: Some(kind),
            s: None,
        }
    }

    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.s = Some(state);
        self
    }

    /// Milliseconds after `t` at which the challenge stops being accepted.
    pub fn expires_at(&self) -> u64 {
        self.t.saturating_add(CHALLENGE_TTL_SECS * 1000)
    }
}

/// Verify a challenge cookie, its age, and that it was issued for `kind`.
///
/// A cookie without a kind is accepted by either ceremony.
pub fn read_challenge_at(
    token: &str,
    secret: &[u8],
    kind: CeremonyKind,
    now_ms: u64,
) -> Result<ChallengePayload> {
    let payload: ChallengePayload = verify_json(token, secret)?;
    if now_ms > payload.expires_at() {
        return Err(ArianeError::Expired);
    }
    match payload.k {
        Some(k) if k != kind => Err(ArianeError::InvalidSignature),
        _ => Ok(payload),
    }
}

/// Body of the `slo_user` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloMarker {
    pub email: String,
    pub exp: u64,
}

impl SloMarker {
    pub fn new(email: impl Into<String>, now_ms: u64) -> Self {
        Self {
            email: email.into(),
            exp: now_ms.saturating_add(SLO_TTL_SECS * 1000),
        }
    }
}

pub fn read_slo_marker_at(token: &str, secret: &[u8], now_ms: u64) -> Result<SloMarker> {
    let marker: SloMarker = verify_json(token, secret)?;
    if now_ms > marker.exp {
        return Err(ArianeError::Expired);
    }
    Ok(marker)
}
