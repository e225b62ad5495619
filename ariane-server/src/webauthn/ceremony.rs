//! Passkey registration and authentication ceremonies.
//!
//! Both ceremonies run `IDLE -> CHALLENGE_ISSUED -> VERIFYING -> done`. The
//! only state carried between the two requests is the signed `webauthn_chal`
//! cookie, which holds the challenge, its kind and the verifier's state.

use std::sync::Arc;

use serde_json::{json, Value};

use ariane_core::{
    get_cookie, mint_session, now_millis, read_challenge_at, sign_json, ArianeError,
    CeremonyKind, ChallengePayload, CookiePolicy, SessionPayload, SessionSecret,
    StoredCredential, CHALLENGE_COOKIE, CHALLENGE_TTL_SECS, SESSION_COOKIE,
};

use crate::config::{Config, WebAuthnSettings};
use crate::credentials::CredentialStore;

use super::used::UsedChallenges;
use super::verifier::{credential_id, IssuedChallenge, PasskeyUser, PasskeyVerifier, RelyingParty};

/// JSON body plus the `Set-Cookie` values to send with it.
#[derive(Debug, Clone)]
pub struct CeremonyOutcome {
    pub body: Value,
    pub cookies: Vec<String>,
}

/// Signature counters must grow, except for authenticators that never count.
pub fn check_counter(stored: u32, received: u32) -> Result<(), ArianeError> {
    if (stored == 0 && received == 0) || received > stored {
        Ok(())
    } else {
        Err(ArianeError::CounterRegression { stored, received })
    }
}

/// Drives passkey ceremonies against a credential store and a verifier.
pub struct CeremonyManager {
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn PasskeyVerifier>,
    secret: SessionSecret,
    settings: WebAuthnSettings,
    cookies: CookiePolicy,
    session_ttl_secs: u64,
    used: Option<UsedChallenges>,
}

impl CeremonyManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn PasskeyVerifier>,
    ) -> Self {
        Self {
            store,
            verifier,
            secret: config.session_secret.clone(),
            settings: config.webauthn.clone(),
            cookies: config.cookie_policy(),
            session_ttl_secs: config.session_ttl_secs,
            used: config
                .webauthn
                .single_use_challenges
                .then(UsedChallenges::default),
        }
    }

    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    pub fn used_challenges(&self) -> Option<&UsedChallenges> {
        self.used.as_ref()
    }

    pub fn verifier_name(&self) -> &'static str {
        self.verifier.name()
    }

    fn passkey_user(&self, user_id: &str) -> PasskeyUser {
        PasskeyUser {
            id: user_id.to_string(),
            name: self.settings.user_name.clone(),
            display_name: self.settings.user_name.clone(),
        }
    }

    fn challenge_cookie(
        &self,
        issued: &IssuedChallenge,
        kind: CeremonyKind,
        now_ms: u64,
    ) -> Result<String, ArianeError> {
        let payload = ChallengePayload::new(issued.challenge.clone(), kind, now_ms)
            .with_state(issued.state.clone());
        let token = sign_json(&payload, self.secret.as_bytes())?;
        Ok(self
            .cookies
            .make(CHALLENGE_COOKIE, &token, CHALLENGE_TTL_SECS))
    }

    /// Verify the challenge cookie and consume it.
    fn take_challenge(
        &self,
        cookie_header: Option<&str>,
        kind: CeremonyKind,
        now_ms: u64,
    ) -> Result<Value, ArianeError> {
        let token = cookie_header
            .and_then(|header| get_cookie(header, CHALLENGE_COOKIE))
            .ok_or(ArianeError::InvalidSignature)?;
        let payload = read_challenge_at(&token, self.secret.as_bytes(), kind, now_ms)?;

        if let Some(used) = &self.used {
            if !used.mark_used(&payload.c) {
                return Err(ArianeError::ChallengeReplayed);
            }
        }

        // Cookies minted without verifier state cannot complete a ceremony
        payload.s.ok_or(ArianeError::InvalidSignature)
    }

    fn completion_cookies(&self, user_id: &str, now_ms: u64) -> Result<Vec<String>, ArianeError> {
        let session =
            SessionPayload::new(user_id, now_ms, self.session_ttl_secs).with_provider("passkey");
        let token = mint_session(&session, self.secret.as_bytes())?;
        Ok(vec![
            self.cookies
                .make(SESSION_COOKIE, &token, self.session_ttl_secs),
            self.cookies.clear(CHALLENGE_COOKIE),
        ])
    }

    pub async fn begin_registration(
        &self,
        user_id: &str,
        origin: &str,
        approved: bool,
    ) -> Result<CeremonyOutcome, ArianeError> {
        if !self.settings.allow_registration && !approved {
            return Err(ArianeError::RegistrationClosed);
        }

        let rp = RelyingParty::from_origin(origin, &self.settings.rp_name)?;
        let existing = self.store.get_by_user(user_id).await?;
        let issued =
            self.verifier
                .start_registration(&rp, &self.passkey_user(user_id), &existing)?;
        let cookie = self.challenge_cookie(&issued, CeremonyKind::Registration, now_millis())?;

        tracing::info!(rp_id = %rp.id, existing = existing.len(), "Registration challenge issued");
        Ok(CeremonyOutcome {
            body: issued.options,
            cookies: vec![cookie],
        })
    }

    pub async fn complete_registration(
        &self,
        user_id: &str,
        response: &Value,
        cookie_header: Option<&str>,
        origin: &str,
    ) -> Result<CeremonyOutcome, ArianeError> {
        let now_ms = now_millis();
        let state = self.take_challenge(cookie_header, CeremonyKind::Registration, now_ms)?;

        let rp = RelyingParty::from_origin(origin, &self.settings.rp_name)?;
        let passkey = self.verifier.finish_registration(&rp, response, &state)?;

        let credential = StoredCredential {
            id: passkey.id,
            public_key: passkey.public_key,
            counter: passkey.counter,
            user_id: user_id.to_string(),
            transports: passkey.transports,
            passkey: passkey.material,
        };
        let credential_id = credential.id.clone();
        self.store.upsert(credential).await?;

        tracing::info!(credential_id = %credential_id, rp_id = %rp.id, "Passkey registered");
        Ok(CeremonyOutcome {
            body: json!({ "verified": true }),
            cookies: self.completion_cookies(user_id, now_ms)?,
        })
    }

    pub async fn begin_authentication(
        &self,
        user_id: &str,
        origin: &str,
    ) -> Result<CeremonyOutcome, ArianeError> {
        let rp = RelyingParty::from_origin(origin, &self.settings.rp_name)?;
        let credentials = self.store.get_by_user(user_id).await?;
        let issued = self.verifier.start_authentication(&rp, &credentials)?;
        let cookie = self.challenge_cookie(&issued, CeremonyKind::Authentication, now_millis())?;

        tracing::debug!(rp_id = %rp.id, credentials = credentials.len(), "Authentication challenge issued");
        Ok(CeremonyOutcome {
            body: issued.options,
            cookies: vec![cookie],
        })
    }

    pub async fn complete_authentication(
        &self,
        response: &Value,
        cookie_header: Option<&str>,
        origin: &str,
    ) -> Result<CeremonyOutcome, ArianeError> {
        let now_ms = now_millis();
        let state = self.take_challenge(cookie_header, CeremonyKind::Authentication, now_ms)?;

        let id = credential_id(response)?;
        let stored = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(ArianeError::UnknownCredential)?;

        let rp = RelyingParty::from_origin(origin, &self.settings.rp_name)?;
        let outcome = self
            .verifier
            .finish_authentication(&rp, response, &state, &stored)?;

        if let Err(e) = check_counter(stored.counter, outcome.counter) {
            tracing::warn!(
                credential_id = %stored.id,
                stored = stored.counter,
                received = outcome.counter,
                "Signature counter did not increase"
            );
            return Err(e);
        }

        let user_id = stored.user_id.clone();
        let updated = StoredCredential {
            counter: outcome.counter,
            passkey: outcome.material.or(stored.passkey),
            ..stored
        };
        let credential_id = updated.id.clone();
        self.store.upsert(updated).await?;

        tracing::info!(credential_id = %credential_id, sign_count = outcome.counter, "Passkey authentication completed");
        Ok(CeremonyOutcome {
            body: json!({ "verified": true }),
            cookies: self.completion_cookies(&user_id, now_ms)?,
        })
    }
}

impl std::fmt::Debug for CeremonyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyManager")
            .field("backend", &self.store.backend())
            .field("verifier", &self.verifier.name())
            .field("settings", &self.settings)
            .finish()
    }
}
