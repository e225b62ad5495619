//! OAuth2 `state` parameter with a storage-free PKCE verifier.
//!
//! The state is a signed `{csrf, iat, exp, redirect}` document. The PKCE
//! verifier is never stored anywhere: it is re-derived on the callback as
//! `HMAC(secret, csrf + "." + iat)`, so only a holder of the session secret who
//! also saw the signed state can reproduce it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{ArianeError, Result};
use crate::session::now_millis;
use crate::signer::{b64url_encode, hmac_sha256, sign_json, verify_json};

/// Lifetime of an authorization round trip.
pub const STATE_TTL_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub csrf: String,
    pub iat: u64,
    pub exp: u64,
    pub redirect: String,
}

/// What the start endpoint sends to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedState {
    pub state: String,
    pub code_challenge: String,
}

/// What the callback recovers from the state parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedState {
    pub redirect: String,
    pub code_verifier: String,
    pub csrf: String,
    pub iat: u64,
}

/// Keep same-site absolute paths only. Protocol-relative (`//host`) and
/// absolute URLs become `/`.
pub fn sanitize_redirect(path: &str) -> String {
    if path.starts_with('/') && !path.starts_with("//") {
        path.to_string()
    } else {
        "/".to_string()
    }
}

pub fn derive_code_verifier(secret: &[u8], csrf: &str, iat: u64) -> Result<String> {
    let mac = hmac_sha256(secret, format!("{csrf}.{iat}").as_bytes())?;
    Ok(b64url_encode(mac))
}

/// S256 code challenge for a verifier.
pub fn code_challenge_for(verifier: &str) -> String {
    b64url_encode(Sha256::digest(verifier.as_bytes()))
}

pub fn encode_state(redirect: &str, secret: &[u8]) -> Result<EncodedState> {
    encode_state_at(redirect, secret, &Uuid::new_v4().to_string(), now_millis())
}

/// Deterministic form of [`encode_state`] with the CSRF id and clock supplied.
pub fn encode_state_at(redirect: &str, secret: &[u8], csrf: &str, now_ms: u64) -> Result<EncodedState> {
    let payload = OAuthState {
        csrf: csrf.to_string(),
        iat: now_ms,
        exp: now_ms.saturating_add(STATE_TTL_MS),
        redirect: sanitize_redirect(redirect),
    };
    let state = sign_json(&payload, secret)?;
    let verifier = derive_code_verifier(secret, csrf, now_ms)?;

    Ok(EncodedState {
        state,
        code_challenge: code_challenge_for(&verifier),
    })
}

pub fn decode_state(state: &str, secret: &[u8]) -> Result<DecodedState> {
    decode_state_at(state, secret, now_millis())
}

pub fn decode_state_at(state: &str, secret: &[u8], now_ms: u64) -> Result<DecodedState> {
    let payload: OAuthState = verify_json(state, secret)?;
    if payload.exp == 0 || now_ms > payload.exp {
        return Err(ArianeError::Expired);
    }
    let code_verifier = derive_code_verifier(secret, &payload.csrf, payload.iat)?;

    Ok(DecodedState {
        redirect: sanitize_redirect(&payload.redirect),
        code_verifier,
        csrf: payload.csrf,
        iat: payload.iat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::sign;

    const SECRET: &[u8] = b"test-secret";
    const CSRF: &str = "3f2504e0-4f89-41d3-9a0c-0305e82c3301";
    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn test_known_verifier_and_challenge() {
        let verifier = derive_code_verifier(SECRET, CSRF, NOW).unwrap();
        assert_eq!(verifier, "69Jga2QbRngrqQIbkwY2ksiEs3AFpJ4iHTMB2pQUwAo");
        assert_eq!(
            code_challenge_for(&verifier),
            "A-jJzCRzorLrAz48XpmABZk0mMONfhoIMTNnb5Ab57w"
        );
    }

    #[test]
    fn test_decode_rederives_the_same_verifier() {
        let encoded = encode_state_at("/dashboard?tab=1", SECRET, CSRF, NOW).unwrap();
        let first = decode_state_at(&encoded.state, SECRET, NOW + 1).unwrap();
        let second = decode_state_at(&encoded.state, SECRET, NOW + 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.redirect, "/dashboard?tab=1");
        assert_eq!(first.csrf, CSRF);
        assert_eq!(first.iat, NOW);
        assert_eq!(code_challenge_for(&first.code_verifier), encoded.code_challenge);
    }

    #[test]
    fn test_random_csrf_differs_per_call() {
        let a = encode_state("/", SECRET).unwrap();
        let b = encode_state("/", SECRET).unwrap();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_challenge, b.code_challenge);

        let decoded = decode_state(&a.state, SECRET).unwrap();
        assert!(Uuid::parse_str(&decoded.csrf).is_ok());
    }

    #[test]
    fn test_expired_state_rejected() {
        let encoded = encode_state_at("/", SECRET, CSRF, NOW).unwrap();
        assert!(decode_state_at(&encoded.state, SECRET, NOW + STATE_TTL_MS).is_ok());
        assert_eq!(
            decode_state_at(&encoded.state, SECRET, NOW + STATE_TTL_MS + 1),
            Err(ArianeError::Expired)
        );
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let encoded = encode_state_at("/", SECRET, CSRF, NOW).unwrap();
        assert_eq!(
            decode_state_at(&encoded.state, b"other-secret", NOW),
            Err(ArianeError::InvalidSignature)
        );
    }

    #[test]
    fn test_sanitize_redirect() {
        assert_eq!(sanitize_redirect("/admin"), "/admin");
        assert_eq!(sanitize_redirect("/"), "/");
        assert_eq!(sanitize_redirect("//evil.example"), "/");
        assert_eq!(sanitize_redirect("https://evil.example/"), "/");
        assert_eq!(sanitize_redirect("admin"), "/");
        assert_eq!(sanitize_redirect(""), "/");
    }

    #[test]
    fn test_redirect_sanitized_on_both_sides() {
        let encoded = encode_state_at("//evil.example", SECRET, CSRF, NOW).unwrap();
        assert_eq!(decode_state_at(&encoded.state, SECRET, NOW).unwrap().redirect, "/");

        // A signed state carrying a hostile redirect is still neutralized
        let forged = OAuthState {
            csrf: CSRF.into(),
            iat: NOW,
            exp: NOW + 1000,
            redirect: "//evil.example".into(),
        };
        let token = sign(&serde_json::to_vec(&forged).unwrap(), SECRET)
            .unwrap()
            .encode();
        assert_eq!(decode_state_at(&token, SECRET, NOW).unwrap().redirect, "/");
    }
}
