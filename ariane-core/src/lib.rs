//! Ariane Core - stateless session primitives
//!
//! Everything here is pure and free of I/O so it can run on the server, in the
//! operator CLI and inside a Wasm edge runtime alike.
//!
//! # Features
//!
//! - HMAC-SHA256 signed tokens, byte-compatible with the browser/edge signer
//! - Session, WebAuthn challenge and single-logout cookie payloads
//! - OAuth2 state with a PKCE verifier that is derived, never stored
//! - Passkey credential records
//!
//! # Example
//!
//! ```no_run
//! use ariane_core::{mint_session, read_session, SessionPayload};
//!
//! # fn example() -> ariane_core::Result<()> {
//! let secret = b"change-me";
//! let payload = SessionPayload::new("admin", ariane_core::now_millis(), 3600);
//! let cookie_value = mint_session(&payload, secret)?;
//!
//! let session = read_session(&cookie_value, secret)?;
//! assert_eq!(session.sub, "admin");
//! # Ok(())
//! # }
//! ```

pub mod cookie;
pub mod credential;
pub mod error;
#[cfg(feature = "oauth-state")]
pub mod oauth_state;
pub mod session;
pub mod signer;

pub use cookie::{
    clear_cookie, get_cookie, make_cookie, parse_cookie_header, CookieOptions, CookiePolicy,
    SameSite, CHALLENGE_COOKIE, CHALLENGE_TTL_SECS, ID_TOKEN_COOKIE, SESSION_COOKIE,
    SESSION_TTL_SECS, SLO_COOKIE, SLO_TTL_SECS,
};
pub use credential::{CredentialDocument, StoredCredential};
pub use error::{ArianeError, Result};
pub use session::{
    mint_session, now_millis, read_challenge_at, read_session, read_session_at,
    read_slo_marker_at, CeremonyKind, ChallengePayload, SessionPayload, SloMarker,
};
pub use signer::{
    b64url_decode, b64url_encode, sign, sign_json, verify, verify_json, SessionSecret,
    SignedToken,
};

#[cfg(feature = "oauth-state")]
pub use oauth_state::{
    code_challenge_for, decode_state, decode_state_at, derive_code_verifier, encode_state,
    encode_state_at, sanitize_redirect, DecodedState, EncodedState, OAuthState,
};
