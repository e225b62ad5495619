//! Production verifier backed by `webauthn-rs`.
//!
//! The relying party is derived per request origin. With an origin allow-list
//! only listed origins get a `Webauthn` instance; without one, instances are
//! still built per origin but at most [`MAX_CACHED_RELYING_PARTIES`] are kept.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use url::Url;
use webauthn_rs::prelude::*;

use ariane_core::{b64url_decode, b64url_encode, ArianeError, StoredCredential};

use super::attestation::{parse_attestation_object, AuthenticatorData};
use crate::config::Config;

use super::verifier::{
    response_bytes, AssertionOutcome, IssuedChallenge, PasskeyUser, PasskeyVerifier,
    RegisteredPasskey, RelyingParty,
};

pub const MAX_CACHED_RELYING_PARTIES: usize = 8;

/// `webauthn-rs` passkey verifier
#[derive(Default)]
pub struct WebauthnRsVerifier {
    allowed_origins: Option<Vec<String>>,
    relying_parties: DashMap<String, Arc<Webauthn>>,
}

fn rejected(context: &str, err: WebauthnError) -> ArianeError {
    ArianeError::CeremonyRejected(format!("{context}: {err:?}"))
}

fn serialization(err: serde_json::Error) -> ArianeError {
    ArianeError::Serialization(err.to_string())
}

/// Stable handle for a user id string; webauthn-rs wants a UUID.
fn user_handle(user_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, user_id.as_bytes())
}

/// Split `{"publicKey": {...}}` into the inner options and their challenge.
fn public_key_options(challenge_response: Value) -> Result<(Value, String), ArianeError> {
    let options = challenge_response
        .get("publicKey")
        .cloned()
        .ok_or_else(|| ArianeError::Serialization("options without publicKey".to_string()))?;
    let challenge = options
        .get("challenge")
        .and_then(Value::as_str)
        .ok_or_else(|| ArianeError::Serialization("options without challenge".to_string()))?
        .to_string();
    Ok((options, challenge))
}

fn stored_passkey(credential: &StoredCredential) -> Result<Passkey, ArianeError> {
    let material = credential.passkey.clone().ok_or_else(|| {
        ArianeError::CeremonyRejected(format!(
            "credential {} has no verifier material",
            credential.id
        ))
    })?;
    serde_json::from_value(material).map_err(serialization)
}

/// Authentication state with the credential material taken out.
///
/// `webauthn-rs` keeps every allowed `Credential` in its state, which would put
/// all public keys in the challenge cookie. Only the ids travel; the material
/// is reloaded from the credential store on completion.
fn detach_credentials(mut state: Value, allowed: Vec<String>) -> Result<Value, ArianeError> {
    let credentials = state
        .pointer_mut("/ast/credentials")
        .ok_or_else(|| ArianeError::Serialization("authentication state layout".to_string()))?;
    *credentials = Value::Array(Vec::new());
    Ok(json!({ "authentication": state, "allowed": allowed }))
}

/// Put the stored credential back into a detached state.
fn attach_credential(state: &Value, credential: &StoredCredential) -> Result<Value, ArianeError> {
    let offered = state
        .get("allowed")
        .and_then(Value::as_array)
        .ok_or_else(|| ArianeError::CeremonyRejected("ceremony state has no allowed".to_string()))?;
    if !offered
        .iter()
        .any(|id| id.as_str() == Some(credential.id.as_str()))
    {
        return Err(ArianeError::CeremonyRejected(
            "credential was not offered".to_string(),
        ));
    }

    let material = credential
        .passkey
        .as_ref()
        .and_then(|p| p.get("cred"))
        .cloned()
        .ok_or_else(|| {
            ArianeError::CeremonyRejected(format!(
                "credential {} has no verifier material",
                credential.id
            ))
        })?;

    let mut authentication = state
        .get("authentication")
        .cloned()
        .ok_or_else(|| ArianeError::CeremonyRejected("ceremony state is incomplete".to_string()))?;
    let slot = authentication
        .pointer_mut("/ast/credentials")
        .ok_or_else(|| ArianeError::Serialization("authentication state layout".to_string()))?;
    *slot = Value::Array(vec![material]);
    Ok(authentication)
}

fn normalize_origin(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}

impl WebauthnRsVerifier {
    /// Any origin may run a ceremony. Local development only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the given origins may run ceremonies.
    pub fn with_allowed_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = origins
            .into_iter()
            .filter_map(|o| normalize_origin(o.as_ref()))
            .collect();
        Self {
            allowed_origins: Some(allowed),
            relying_parties: DashMap::new(),
        }
    }

    /// `PUBLIC_ORIGIN` plus `ALLOWED_ORIGINS`; open when neither is set.
    pub fn from_config(config: &Config) -> Self {
        let origins: Vec<&str> = config
            .public_origin
            .iter()
            .chain(config.allowed_origins.iter().flatten())
            .map(String::as_str)
            .filter(|o| *o != "*")
            .collect();
        if origins.is_empty() {
            tracing::warn!("No PUBLIC_ORIGIN or ALLOWED_ORIGINS, passkeys accept any origin");
            Self::new()
        } else {
            Self::with_allowed_origins(origins)
        }
    }

    fn relying_party(&self, rp: &RelyingParty) -> Result<Arc<Webauthn>, ArianeError> {
        if let Some(allowed) = &self.allowed_origins {
            if !allowed.contains(&rp.origin) {
                tracing::warn!(origin = %rp.origin, "Passkey ceremony from an unlisted origin");
                return Err(ArianeError::CeremonyRejected(format!(
                    "origin '{}' is not allowed",
                    rp.origin
                )));
            }
        }
        if let Some(existing) = self.relying_parties.get(&rp.origin) {
            return Ok(existing.clone());
        }

        let origin = Url::parse(&rp.origin)
            .map_err(|e| ArianeError::CeremonyRejected(format!("invalid origin: {e}")))?;
        let webauthn = WebauthnBuilder::new(&rp.id, &origin)
            .map_err(|e| rejected("relying party", e))?
            .rp_name(&rp.name)
            .allow_subdomains(false)
            .build()
            .map_err(|e| rejected("relying party", e))?;

        let webauthn = Arc::new(webauthn);
        if self.relying_parties.len() < MAX_CACHED_RELYING_PARTIES {
            self.relying_parties
                .insert(rp.origin.clone(), webauthn.clone());
        }
        tracing::debug!(rp_id = %rp.id, origin = %rp.origin, "Built WebAuthn relying party");
        Ok(webauthn)
    }
}

impl PasskeyVerifier for WebauthnRsVerifier {
    fn start_registration(
        &self,
        rp: &RelyingParty,
        user: &PasskeyUser,
        existing: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError> {
        let webauthn = self.relying_party(rp)?;

        let exclude: Vec<CredentialID> = existing
            .iter()
            .filter_map(|c| b64url_decode(&c.id).ok())
            .map(CredentialID::from)
            .collect();
        let exclude = (!exclude.is_empty()).then_some(exclude);

        let (ccr, reg_state) = webauthn
            .start_passkey_registration(
                user_handle(&user.id),
                &user.name,
                &user.display_name,
                exclude,
            )
            .map_err(|e| rejected("start registration", e))?;

        let (options, challenge) =
            public_key_options(serde_json::to_value(&ccr).map_err(serialization)?)?;
        let state = serde_json::to_value(&reg_state).map_err(serialization)?;

        Ok(IssuedChallenge {
            options,
            challenge,
            state,
        })
    }

    fn finish_registration(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
    ) -> Result<RegisteredPasskey, ArianeError> {
        let webauthn = self.relying_party(rp)?;

        let credential: RegisterPublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| ArianeError::CeremonyRejected(format!("registration response: {e}")))?;
        let reg_state: PasskeyRegistration =
            serde_json::from_value(state.clone()).map_err(serialization)?;

        let passkey = webauthn
            .finish_passkey_registration(&credential, &reg_state)
            .map_err(|e| rejected("registration", e))?;

        // Raw COSE key and counter come straight from the attestation
        let auth_data = parse_attestation_object(&response_bytes(response, "attestationObject")?)?;
        let public_key = auth_data
            .attested
            .map(|c| b64url_encode(c.public_key))
            .unwrap_or_default();

        let transports = response
            .pointer("/response/transports")
            .and_then(|t| serde_json::from_value::<Vec<String>>(t.clone()).ok());

        let raw_id: &[u8] = passkey.cred_id();
        Ok(RegisteredPasskey {
            id: b64url_encode(raw_id),
            public_key,
            counter: auth_data.sign_count,
            transports,
            material: Some(serde_json::to_value(&passkey).map_err(serialization)?),
        })
    }

    fn start_authentication(
        &self,
        rp: &RelyingParty,
        credentials: &[StoredCredential],
    ) -> Result<IssuedChallenge, ArianeError> {
        let webauthn = self.relying_party(rp)?;

        let usable: Vec<&StoredCredential> =
            credentials.iter().filter(|c| c.passkey.is_some()).collect();
        let passkeys = usable
            .iter()
            .map(|c| stored_passkey(c))
            .collect::<Result<Vec<_>, _>>()?;
        if passkeys.is_empty() {
            return Err(ArianeError::CeremonyRejected(
                "no passkeys registered".to_string(),
            ));
        }

        let (rcr, auth_state) = webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| rejected("start authentication", e))?;

        let (options, challenge) =
            public_key_options(serde_json::to_value(&rcr).map_err(serialization)?)?;
        let state = detach_credentials(
            serde_json::to_value(&auth_state).map_err(serialization)?,
            usable.iter().map(|c| c.id.clone()).collect(),
        )?;

        Ok(IssuedChallenge {
            options,
            challenge,
            state,
        })
    }

    fn finish_authentication(
        &self,
        rp: &RelyingParty,
        response: &Value,
        state: &Value,
        credential: &StoredCredential,
    ) -> Result<AssertionOutcome, ArianeError> {
        let webauthn = self.relying_party(rp)?;

        let received = AuthenticatorData::parse(&response_bytes(response, "authenticatorData")?)?
            .sign_count;
        let assertion: PublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| ArianeError::CeremonyRejected(format!("assertion: {e}")))?;
        let auth_state: PasskeyAuthentication =
            serde_json::from_value(attach_credential(state, credential)?).map_err(serialization)?;

        let result = webauthn
            .finish_passkey_authentication(&assertion, &auth_state)
            .map_err(|e| match e {
                WebauthnError::CredentialPossibleCompromise => ArianeError::CounterRegression {
                    stored: credential.counter,
                    received,
                },
                other => rejected("authentication", other),
            })?;

        let mut passkey = stored_passkey(credential)?;
        passkey.update_credential(&result);

        Ok(AssertionOutcome {
            counter: result.counter(),
            material: Some(serde_json::to_value(&passkey).map_err(serialization)?),
        })
    }

    fn name(&self) -> &'static str {
        "webauthn-rs"
    }
}

impl std::fmt::Debug for WebauthnRsVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebauthnRsVerifier")
            .field("allowed_origins", &self.allowed_origins)
            .field("relying_parties", &self.relying_parties.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ariane_core::{
        sign_json, CeremonyKind, ChallengePayload, CookiePolicy, CHALLENGE_COOKIE,
        CHALLENGE_TTL_SECS,
    };

    fn rp(origin: &str) -> RelyingParty {
        RelyingParty::from_origin(origin, "Ariane").unwrap()
    }

    fn user() -> PasskeyUser {
        PasskeyUser {
            id: "admin".into(),
            name: "Site Admin".into(),
            display_name: "Site Admin".into(),
        }
    }

    #[test]
    fn test_relying_party_cached_per_origin() {
        let verifier = WebauthnRsVerifier::new();
        let local = rp("http://localhost:4321");
        let a = verifier.relying_party(&local).unwrap();
        let b = verifier.relying_party(&local).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let origin = Url::parse("http://localhost:4321").unwrap();
        assert!(a.get_allowed_origins().contains(&origin));

        verifier.relying_party(&rp("https://example.com")).unwrap();
        assert_eq!(verifier.relying_parties.len(), 2);
    }

    #[test]
    fn test_relying_party_cache_is_bounded() {
        let verifier = WebauthnRsVerifier::new();
        for n in 0..(MAX_CACHED_RELYING_PARTIES + 20) {
            verifier
                .relying_party(&rp(&format!("https://host-{n}.example")))
                .unwrap();
        }
        assert_eq!(verifier.relying_parties.len(), MAX_CACHED_RELYING_PARTIES);
    }

    #[test]
    fn test_unlisted_origin_rejected() {
        let verifier = WebauthnRsVerifier::with_allowed_origins(["https://auth.example.com/"]);
        assert!(verifier.relying_party(&rp("https://auth.example.com")).is_ok());

        let err = verifier
            .start_registration(&rp("https://attacker.example"), &user(), &[])
            .unwrap_err();
        assert!(matches!(err, ArianeError::CeremonyRejected(_)));
        assert_eq!(verifier.relying_parties.len(), 1);
    }

    #[test]
    fn test_from_config_uses_public_and_allowed_origins() {
        let mut config = Config::default();
        let open = WebauthnRsVerifier::from_config(&config);
        assert!(open.allowed_origins.is_none());

        config.public_origin = Some("https://auth.example.com".into());
        config.allowed_origins = Some(vec!["https://www.example.com".into(), "*".into()]);
        let listed = WebauthnRsVerifier::from_config(&config);
        assert_eq!(
            listed.allowed_origins,
            Some(vec![
                "https://auth.example.com".to_string(),
                "https://www.example.com".to_string()
            ])
        );
    }

    /// Serialized `PasskeyAuthentication` with `n` credentials of realistic size
    fn authentication_state(n: usize) -> Value {
        let credentials: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "cred_id": b64url_encode(format!("credential-{i}-{}", "x".repeat(40))),
                    "cred": { "type_": "ES256", "key": { "EC_EC2": {
                        "curve": "SECP256R1",
                        "x": "a".repeat(43),
                        "y": "b".repeat(43)
                    }}},
                    "counter": 7,
                    "transports": ["internal", "hybrid"],
                    "user_verified": true,
                    "backup_eligible": true,
                    "backup_state": true,
                    "registration_policy": "required",
                    "extensions": { "cred_protect": "NotRequested", "hmac_create_secret": "NotRequested",
                        "appid": "NotRequested", "cred_props": "Ignored" },
                    "attestation": { "data": "None", "metadata": "None" },
                    "attestation_format": "none",
                    "padding": "p".repeat(300)
                })
            })
            .collect();
        json!({ "ast": {
            "credentials": credentials,
            "policy": "required",
            "challenge": "c".repeat(43),
            "appid": null,
            "allow_backup_eligible_upgrade": true
        }})
    }

    fn challenge_cookie_len(state: Value) -> usize {
        let payload = ChallengePayload::new("c".repeat(43), CeremonyKind::Authentication, 0)
            .with_state(state);
        let token = sign_json(&payload, b"secret").unwrap();
        CookiePolicy::default()
            .make(CHALLENGE_COOKIE, &token, CHALLENGE_TTL_SECS)
            .len()
    }

    #[test]
    fn test_challenge_cookie_fits_with_many_passkeys() {
        let ids: Vec<String> = (0..6).map(|i| b64url_encode(format!("id-{i}"))).collect();
        let full = authentication_state(6);
        assert!(challenge_cookie_len(full.clone()) > 4096);

        let detached = detach_credentials(full, ids).unwrap();
        assert!(challenge_cookie_len(detached.clone()) < 4096);
        assert_eq!(detached["authentication"]["ast"]["credentials"], json!([]));
        assert_eq!(detached["authentication"]["ast"]["policy"], "required");
    }

    #[test]
    fn test_attach_restores_only_offered_credential() {
        let id = b64url_encode("id-1");
        let detached = detach_credentials(authentication_state(2), vec![id.clone()]).unwrap();

        let mut stored = StoredCredential::new(&id, "pk", 3, "admin");
        stored.passkey = Some(json!({ "cred": { "cred_id": id, "counter": 3 } }));
        let restored = attach_credential(&detached, &stored).unwrap();
        assert_eq!(
            restored["ast"]["credentials"],
            json!([{ "cred_id": id, "counter": 3 }])
        );

        let mut other = stored.clone();
        other.id = b64url_encode("id-9");
        assert!(matches!(
            attach_credential(&detached, &other),
            Err(ArianeError::CeremonyRejected(_))
        ));

        let bare = StoredCredential::new(&id, "pk", 3, "admin");
        assert!(attach_credential(&detached, &bare).is_err());
    }

    #[test]
    fn test_registration_options_shape() {
        let verifier = WebauthnRsVerifier::new();
        let issued = verifier
            .start_registration(&rp("https://example.com"), &user(), &[])
            .unwrap();

        assert_eq!(issued.options["rp"]["id"], "example.com");
        assert_eq!(issued.options["rp"]["name"], "Ariane");
        assert_eq!(issued.options["user"]["name"], "Site Admin");
        assert_eq!(issued.options["challenge"], issued.challenge.as_str());

        // State survives a trip through the challenge cookie
        let restored: PasskeyRegistration = serde_json::from_value(issued.state).unwrap();
        drop(restored);
    }

    #[test]
    fn test_user_handle_is_stable() {
        assert_eq!(user_handle("admin"), user_handle("admin"));
        assert_ne!(user_handle("admin"), user_handle("guest"));
    }

    #[test]
    fn test_authentication_needs_material() {
        let verifier = WebauthnRsVerifier::new();
        let bare = StoredCredential::new("abc", "pk", 0, "admin");
        assert!(matches!(
            verifier.start_authentication(&rp("https://example.com"), &[bare]),
            Err(ArianeError::CeremonyRejected(_))
        ));
    }

    #[test]
    fn test_finish_registration_rejects_garbage() {
        let verifier = WebauthnRsVerifier::new();
        let site = rp("https://example.com");
        let issued = verifier.start_registration(&site, &user(), &[]).unwrap();
        let response = serde_json::json!({ "id": "x", "response": {} });
        assert!(verifier
            .finish_registration(&site, &response, &issued.state)
            .is_err());
    }
}
