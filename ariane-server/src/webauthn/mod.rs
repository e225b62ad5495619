//! Passkey (WebAuthn) ceremonies
//!
//! ## Architecture
//!
//! - `ceremony`: registration/authentication state machine and counter rule
//! - `verifier`: the `PasskeyVerifier` seam
//! - `webauthn_rs`: production verifier
//! - `mock`: deterministic verifier for tests
//! - `attestation`: CBOR authenticator data parsing
//! - `used`: single-use challenge tracking
//! - `handlers`: HTTP endpoints

pub mod attestation;
mod ceremony;
pub mod handlers;
mod mock;
mod used;
mod verifier;
mod webauthn_rs;

pub use ceremony::{check_counter, CeremonyManager, CeremonyOutcome};
pub use handlers::{
    authentication_options, registration_options, verify_authentication, verify_registration,
    CredentialJson, VerifiedResponse,
};
pub use mock::MockPasskeyVerifier;
pub use used::UsedChallenges;
pub use verifier::{
    AssertionOutcome, IssuedChallenge, PasskeyUser, PasskeyVerifier, RegisteredPasskey,
    RelyingParty,
};
pub use webauthn_rs::WebauthnRsVerifier;
