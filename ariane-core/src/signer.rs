//! HMAC-SHA256 signed tokens.
//!
//! A token is `base64url(payload) "." base64url(mac)`. Nothing about expiry lives
//! in the token itself: callers embed their own timestamps in the payload and
//! check them after a successful [`verify`].
//!
//! Every verification failure (bad shape, bad base64, wrong secret, flipped bit)
//! collapses into [`ArianeError::InvalidSignature`] so callers cannot be used as
//! an oracle.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ArianeError, Result};

type HmacSha256 = Hmac<Sha256>;

/// URL-safe base64 that writes no padding but tolerates it on input.
pub const B64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Base64url-encode bytes without padding.
pub fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
    B64URL.encode(bytes)
}

/// Decode base64url, padded or not.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>> {
    B64URL
        .decode(input)
        .map_err(|_| ArianeError::InvalidSignature)
}

/// Long-term signing secret, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret(Vec<u8>);

impl SessionSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SessionSecret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for SessionSecret {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(<redacted>)")
    }
}

/// A payload together with its MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub payload: Vec<u8>,
    pub mac: Vec<u8>,
}

impl SignedToken {
    /// Split and decode the text form. Does not check the MAC.
    pub fn parse(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let (Some(payload), Some(mac), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ArianeError::InvalidSignature);
        };
        if payload.is_empty() || mac.is_empty() {
            return Err(ArianeError::InvalidSignature);
        }
        Ok(Self {
            payload: b64url_decode(payload)?,
            mac: b64url_decode(mac)?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}.{}", b64url_encode(&self.payload), b64url_encode(&self.mac))
    }
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn keyed_mac(secret: &[u8]) -> Result<HmacSha256> {
    if secret.is_empty() {
        return Err(ArianeError::MissingConfiguration(
            "signing secret is empty".to_string(),
        ));
    }
    HmacSha256::new_from_slice(secret)
        .map_err(|_| ArianeError::MissingConfiguration("unusable signing secret".to_string()))
}

/// Raw HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> Result<[u8; 32]> {
    let mut mac = keyed_mac(secret)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Sign raw payload bytes.
pub fn sign(payload: &[u8], secret: &[u8]) -> Result<SignedToken> {
    Ok(SignedToken {
        payload: payload.to_vec(),
        mac: hmac_sha256(secret, payload)?.to_vec(),
    })
}

/// Verify a token and return its payload bytes.
pub fn verify(token: &str, secret: &[u8]) -> Result<Vec<u8>> {
    let parsed = SignedToken::parse(token)?;
    let mut mac = keyed_mac(secret).map_err(|_| ArianeError::InvalidSignature)?;
    mac.update(&parsed.payload);
    // verify_slice rejects length mismatches and compares in constant time
    mac.verify_slice(&parsed.mac)
        .map_err(|_| ArianeError::InvalidSignature)?;
    Ok(parsed.payload)
}

/// Serialize `value` as JSON and sign it, returning the text token.
pub fn sign_json<T: Serialize>(value: &T, secret: &[u8]) -> Result<String> {
    let payload =
        serde_json::to_vec(value).map_err(|e| ArianeError::Serialization(e.to_string()))?;
    Ok(sign(&payload, secret)?.encode())
}

/// Verify a token and parse its payload as JSON.
///
/// A payload that verifies but is not the expected JSON is treated as invalid.
pub fn verify_json<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<T> {
    let payload = verify(token, secret)?;
    serde_json::from_slice(&payload).map_err(|_| ArianeError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const SECRET: &[u8] = b"dev-secret-change-me";

    #[test]
    fn test_round_trip_various_payloads() {
        let payloads: [&[u8]; 5] = [
            b"",
            b"hello",
            b"{\"sub\":\"admin\"}",
            &[0u8, 255, 1, 254, 46],
            &[b'.'; 64],
        ];
        for payload in payloads {
            let token = sign(payload, SECRET).unwrap().encode();
            assert_eq!(verify(&token, SECRET).unwrap(), payload);
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(b"payload", b"secret-one").unwrap().encode();
        assert_eq!(
            verify(&token, b"secret-two"),
            Err(ArianeError::InvalidSignature)
        );
    }

    #[test]
    fn test_every_single_bit_flip_rejected() {
        let original = sign(b"{\"sub\":\"admin\",\"exp\":1}", SECRET).unwrap();

        for byte in 0..original.payload.len() {
            for bit in 0..8 {
                let mut tampered = original.clone();
                tampered.payload[byte] ^= 1 << bit;
                assert_eq!(
                    verify(&tampered.encode(), SECRET),
                    Err(ArianeError::InvalidSignature),
                    "payload byte {byte} bit {bit}"
                );
            }
        }

        for byte in 0..original.mac.len() {
            for bit in 0..8 {
                let mut tampered = original.clone();
                tampered.mac[byte] ^= 1 << bit;
                assert_eq!(
                    verify(&tampered.encode(), SECRET),
                    Err(ArianeError::InvalidSignature),
                    "mac byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_malformed_tokens_collapse_to_invalid() {
        for token in [
            "",
            ".",
            "abc",
            "abc.",
            ".abc",
            "a.b.c",
            "!!!.???",
            "aGVsbG8.c2hvcnQ",
        ] {
            assert_eq!(
                verify(token, SECRET),
                Err(ArianeError::InvalidSignature),
                "{token:?}"
            );
        }
    }

    #[test]
    fn test_empty_secret_is_invalid_on_verify() {
        let token = sign(b"payload", SECRET).unwrap().encode();
        assert_eq!(verify(&token, b""), Err(ArianeError::InvalidSignature));
        assert!(matches!(
            sign(b"payload", b""),
            Err(ArianeError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_matches_browser_signer_output() {
        // Produced by the Node/edge signer for the same payload and secret
        let payload = br#"{"sub":"admin","iat":1700000000000,"exp":1700604800000}"#;
        let expected = "eyJzdWIiOiJhZG1pbiIsImlhdCI6MTcwMDAwMDAwMDAwMCwiZXhwIjoxNzAwNjA0ODAwMDAwfQ.GZTwPGaaVvaHm2p6Is7UXcgbm-OzIUvzG1zUT0uCvPc";
        assert_eq!(sign(payload, SECRET).unwrap().to_string(), expected);
    }

    #[test]
    fn test_padded_halves_accepted() {
        let token = sign(b"hello", SECRET).unwrap();
        let padded = format!(
            "{}.{}",
            base64::engine::general_purpose::URL_SAFE.encode(&token.payload),
            base64::engine::general_purpose::URL_SAFE.encode(&token.mac)
        );
        assert_eq!(verify(&padded, SECRET).unwrap(), b"hello");
    }

    #[test]
    fn test_json_helpers() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Payload {
            c: String,
            t: u64,
        }

        let value = Payload {
            c: "challenge".into(),
            t: 42,
        };
        let token = sign_json(&value, SECRET).unwrap();
        assert_eq!(verify_json::<Payload>(&token, SECRET).unwrap(), value);

        // Valid signature, wrong shape
        let other = sign(b"not json", SECRET).unwrap().encode();
        assert_eq!(
            verify_json::<Payload>(&other, SECRET),
            Err(ArianeError::InvalidSignature)
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SessionSecret::from("super-secret");
        assert_eq!(format!("{secret:?}"), "SessionSecret(<redacted>)");
        assert_eq!(secret.as_bytes(), b"super-secret");
    }
}
