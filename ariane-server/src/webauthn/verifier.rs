//! Seam between the ceremony state machine and the WebAuthn cryptography.

use serde_json::Value;
use url::Url;

use ariane_core::{b64url_decode, ArianeError, StoredCredential};

/// Relying party a ceremony runs against, derived from the request origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    /// Hostname of the origin
    pub id: String,
    /// Full origin, e.g. `https://example.com`
    pub origin: String,
    pub name: String,
}

impl RelyingParty {
    pub fn from_origin(origin: &str, name: &str) -> Result<Self, ArianeError> {
        let url = Url::parse(origin)
            .map_err(|e| ArianeError::CeremonyRejected(format!("invalid origin '{origin}': {e}")))?;
        let id = url
            .host_str()
            .ok_or_else(|| ArianeError::CeremonyRejected(format!("origin '{origin}' has no host")))?
            .to_string();

        Ok(Self {
            id,
            origin: url.origin().ascii_serialization(),
            name: name.to_string(),
        })
    }
}

/// Account the passkeys are registered to.
#[derive(Debug, Clone)]
pub struct PasskeyUser {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// Options for the browser plus the state needed to finish the ceremony.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    /// `PublicKeyCredentialCreationOptions` / `...RequestOptions` as JSON
    pub options: Value,
    /// Base64url challenge embedded in `options`
    pub challenge: String,
    /// Opaque verifier state, carried in the signed challenge cookie
    pub state: Value,
}

/// A freshly verified credential.
#[derive(Debug, Clone)]
pub struct RegisteredPasskey {
    /// Base64url credential id
    pub id: String,
    /// Base64url COSE public key
    pub public_key: String,
    pub counter: u32,
    pub transports: Option<Vec<String>>,
    pub material: Option<Value>,
}

/// Result of a verified assertion.
#[derive(Debug, Clone)]
pub struct AssertionOutcome {
    pub counter: u32,
    /// Updated credential material to persist, if the verifier keeps any
    pub material: Option<Value>,
}

/// Decode a base64url member of the credential's `response` object.
pub fn response_bytes(credential: &Value, field: &str) -> Result<Vec<u8>, ArianeError> {
    let encoded = credential
        .get("response")
        .and_then(|r| r.get(field))
        .and_then(Value::as_str)
        .ok_or_else(|| ArianeError::CeremonyRejected(format!("response.{field} missing")))?;
    b64url_decode(encoded)
        .map_err(|_| ArianeError::CeremonyRejected(format!("response.{field} is not base64url")))
}

/// The credential's `id` member.
pub fn credential_id(credential: &Value) -> Result<&str, ArianeError> {
    credential
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ArianeError::CeremonyRejected("credential id missing".to_string()))
}

/// WebAuthn cryptographic verification.
///
/// Implementations check challenge, origin, RP ID hash, user verification and
/// signatures. The counter rule and persistence belong to the caller.
pub trait PasskeyVerifier: Send + Sync {
    fn start_registration(
        &self,
        rp: &RelyingParty,
        user: &PasskeyUser,
        existing: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError>;

    fn finish_registration(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
    ) -> Result<RegisteredPasskey, ArianeError>;

    fn start_authentication(
        &self,
        rp: &RelyingParty,
        credentials: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError>;

    fn finish_authentication(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
        credential: &StoredCredential,
    ) -> Result<AssertionOutcome, ArianeError>;

    fn name(&self) -> &'static str;
}
