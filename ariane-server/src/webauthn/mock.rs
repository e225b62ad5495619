//! Deterministic passkey verifier for tests and local development.
//!
//! Checks everything a real verifier checks except the signature: client data
//! type, challenge and origin, RP ID hash, user presence and verification.
//! The response builders produce payloads it accepts, so integration tests can
//! play the authenticator.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use ariane_core::{b64url_decode, b64url_encode, ArianeError, StoredCredential};

use super::attestation::{
    cose_es256_key, encode_attestation_object, parse_attestation_object, AttestedCredential,
    AuthenticatorData, FLAG_AT, FLAG_UP, FLAG_UV,
};
use super::verifier::{
    credential_id, response_bytes, AssertionOutcome, IssuedChallenge, PasskeyUser,
    PasskeyVerifier, RegisteredPasskey, RelyingParty,
};

/// Mock verifier. Challenges are random; verification is deterministic.
#[derive(Debug, Default, Clone)]
pub struct MockPasskeyVerifier;

fn rejected(msg: impl Into<String>) -> ArianeError {
    ArianeError::CeremonyRejected(msg.into())
}

fn random_challenge() -> String {
    b64url_encode(uuid::Uuid::new_v4().as_bytes())
}

fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

fn state_str<'a>(state: &'a Value, key: &str) -> Result<&'a str, ArianeError> {
    state
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| rejected(format!("ceremony state has no {key}")))
}

fn check_client_data(
    credential: &Value,
    expected_type: &str,
    challenge: &str,
    rp: &RelyingParty,
) -> Result<(), ArianeError> {
    let raw = response_bytes(credential, "clientDataJSON")?;
    let client: Value =
        serde_json::from_slice(&raw).map_err(|_| rejected("clientDataJSON is not JSON"))?;

    if client.get("type").and_then(Value::as_str) != Some(expected_type) {
        return Err(rejected("unexpected client data type"));
    }
    if client.get("challenge").and_then(Value::as_str) != Some(challenge) {
        return Err(rejected("challenge mismatch"));
    }
    if client.get("origin").and_then(Value::as_str) != Some(rp.origin.as_str()) {
        return Err(rejected("origin mismatch"));
    }
    Ok(())
}

fn check_authenticator(data: &AuthenticatorData, rp: &RelyingParty) -> Result<(), ArianeError> {
    if data.rp_id_hash != rp_id_hash(&rp.id) {
        return Err(rejected("RP ID hash mismatch"));
    }
    if !data.user_present() || !data.user_verified() {
        return Err(rejected("user verification required"));
    }
    Ok(())
}

fn client_data_json(kind: &str, challenge: &str, origin: &str) -> String {
    let client = json!({ "type": kind, "challenge": challenge, "origin": origin });
    b64url_encode(client.to_string())
}

impl MockPasskeyVerifier {
    pub fn new() -> Self {
        Self
    }

    /// What a browser would post after `navigator.credentials.create()`.
    pub fn registration_response(
        rp: &RelyingParty,
        challenge: &str,
        credential_id: &[u8],
        counter: u32,
    ) -> Result<Value, ArianeError> {
        let data = AuthenticatorData {
            rp_id_hash: rp_id_hash(&rp.id),
            flags: FLAG_UP | FLAG_UV | FLAG_AT,
            sign_count: counter,
            attested: Some(AttestedCredential {
                aaguid: [0u8; 16],
                credential_id: credential_id.to_vec(),
                public_key: cose_es256_key(&[0x11; 32], &[0x22; 32])?,
            }),
        };
        let object = encode_attestation_object(&data.to_bytes())?;
        let id = b64url_encode(credential_id);

        Ok(json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "clientDataJSON": client_data_json("webauthn.create", challenge, &rp.origin),
                "attestationObject": b64url_encode(object),
                "transports": ["internal"]
            }
        }))
    }

    /// What a browser would post after `navigator.credentials.get()`.
    pub fn authentication_response(
        rp: &RelyingParty,
        challenge: &str,
        credential_id: &str,
        counter: u32,
    ) -> Value {
        let data = AuthenticatorData {
            rp_id_hash: rp_id_hash(&rp.id),
            flags: FLAG_UP | FLAG_UV,
            sign_count: counter,
            attested: None,
        };

        json!({
            "id": credential_id,
            "rawId": credential_id,
            "type": "public-key",
            "response": {
                "clientDataJSON": client_data_json("webauthn.get", challenge, &rp.origin),
                "authenticatorData": b64url_encode(data.to_bytes()),
                "signature": b64url_encode(b"mock-signature"),
            }
        })
    }
}

impl PasskeyVerifier for MockPasskeyVerifier {
    fn start_registration(
        &self,
        rp: &RelyingParty,
        user: &PasskeyUser,
        existing: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError> {
        let challenge = random_challenge();
        let exclude: Vec<Value> = existing
            .iter()
            .map(|c| json!({ "id": c.id, "type": "public-key" }))
            .collect();

        let options = json!({
            "challenge": challenge,
            "rp": { "id": rp.id, "name": rp.name },
            "user": {
                "id": b64url_encode(user.id.as_bytes()),
                "name": user.name,
                "displayName": user.display_name,
            },
            "pubKeyCredParams": [
                { "type": "public-key", "alg": -7 },
                { "type": "public-key", "alg": -257 }
            ],
            "timeout": 300000,
            "attestation": "none",
            "excludeCredentials": exclude,
            "authenticatorSelection": {
                "residentKey": "preferred",
                "userVerification": "required"
            }
        });

        Ok(IssuedChallenge {
            options,
            state: json!({ "challenge": challenge }),
            challenge,
        })
    }

    fn finish_registration(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
    ) -> Result<RegisteredPasskey, ArianeError> {
        let challenge = state_str(state, "challenge")?;
        check_client_data(response, "webauthn.create", challenge, rp)?;

        let object = response_bytes(response, "attestationObject")?;
        let data = parse_attestation_object(&object)?;
        check_authenticator(&data, rp)?;
        let attested = data
            .attested
            .ok_or_else(|| rejected("attestation carries no credential"))?;

        let id = credential_id(response)?;
        let raw_id = b64url_decode(id).map_err(|_| rejected("credential id is not base64url"))?;
        if raw_id != attested.credential_id {
            return Err(rejected("credential id does not match attested data"));
        }

        let transports = response
            .pointer("/response/transports")
            .and_then(|t| serde_json::from_value::<Vec<String>>(t.clone()).ok());

        Ok(RegisteredPasskey {
            id: id.to_string(),
            public_key: b64url_encode(&attested.public_key),
            counter: data.sign_count,
            transports,
            material: Some(json!({ "verifier": "mock" })),
        })
    }

    fn start_authentication(
        &self,
        rp: &RelyingParty,
        credentials: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError> {
        let challenge = random_challenge();
        let allow: Vec<Value> = credentials
            .iter()
            .map(|c| match &c.transports {
                Some(t) => json!({ "id": c.id, "type": "public-key", "transports": t }),
                None => json!({ "id": c.id, "type": "public-key" }),
            })
            .collect();
        let ids: Vec<&str> = credentials.iter().map(|c| c.id.as_str()).collect();

        Ok(IssuedChallenge {
            options: json!({
                "challenge": challenge,
                "rpId": rp.id,
                "allowCredentials": allow,
                "userVerification": "required",
                "timeout": 300000
            }),
            state: json!({ "challenge": challenge, "allowed": ids }),
            challenge,
        })
    }

    fn finish_authentication(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
        credential: &StoredCredential,
    ) -> Result<AssertionOutcome, ArianeError> {
        let challenge = state_str(state, "challenge")?;
        let allowed = state
            .get("allowed")
            .and_then(Value::as_array)
            .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(credential.id.as_str())));
        if !allowed {
            return Err(rejected("credential not offered in this ceremony"));
        }

        check_client_data(response, "webauthn.get", challenge, rp)?;
        let data = AuthenticatorData::parse(&response_bytes(response, "authenticatorData")?)?;
        check_authenticator(&data, rp)?;

        Ok(AssertionOutcome {
            counter: data.sign_count,
            material: credential.passkey.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
