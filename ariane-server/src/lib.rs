//! Ariane Server Library - identity session service components
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod access;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod logout;
pub mod oauth;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod webauthn;

pub use access::{access_gate, Caller, EdgeVerifier, Trust};
pub use config::{AuthMode, Config};
pub use credentials::{open_store, CredentialStore, JsonFileStore, MemoryStore, StorageError};
pub use error::ApiError;
pub use logout::{LogoutBranch, LogoutChain, ServiceAccountRevoker, SessionRevoker};
pub use oauth::{GitHubApi, HttpGitHubApi};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::AppState;
pub use webauthn::{CeremonyManager, MockPasskeyVerifier, PasskeyVerifier, WebauthnRsVerifier};
