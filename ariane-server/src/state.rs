//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use ariane_core::{ArianeError, CookiePolicy};

use crate::access::EdgeVerifier;
use crate::config::Config;
use crate::credentials::{CredentialStore, MemoryStore};
use crate::logout::{ServiceAccountRevoker, SessionRevoker};
use crate::oauth::{GitHubApi, HttpGitHubApi};
use crate::upstream::{http_client, DEFAULT_TIMEOUT};
use crate::webauthn::{CeremonyManager, MockPasskeyVerifier, PasskeyVerifier};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Passkey registration and authentication
    pub ceremonies: Arc<CeremonyManager>,
    pub credentials: Arc<dyn CredentialStore>,
    /// Edge proxy assertion verification and JWKS cache
    pub edge: Arc<EdgeVerifier>,
    /// IdP session revocation, when a service account is configured
    pub revoker: Option<Arc<dyn SessionRevoker>>,
    /// GitHub OAuth, when a GitHub app is configured
    pub github: Option<Arc<dyn GitHubApi>>,
}

impl AppState {
    /// Wire every component the configuration asks for.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        verifier: Arc<dyn PasskeyVerifier>,
    ) -> Result<Self, ArianeError> {
        let client = http_client(DEFAULT_TIMEOUT)?;

        let revoker: Option<Arc<dyn SessionRevoker>> =
            match (&config.oidc.issuer, &config.service_account) {
                (Some(issuer), Some(account)) => Some(Arc::new(ServiceAccountRevoker::new(
                    issuer,
                    account,
                    client.clone(),
                ))),
                _ => None,
            };
        let github: Option<Arc<dyn GitHubApi>> = config
            .github
            .as_ref()
            .map(|gh| Arc::new(HttpGitHubApi::new(gh, client.clone())) as Arc<dyn GitHubApi>);

        let ceremonies = Arc::new(CeremonyManager::new(&config, credentials.clone(), verifier));
        let edge = Arc::new(EdgeVerifier::new(config.edge.clone(), client));

        tracing::debug!(
            storage = credentials.backend(),
            revoker = revoker.is_some(),
            github = github.is_some(),
            "Application state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            ceremonies,
            credentials,
            edge,
            revoker,
            github,
        })
    }

    /// In-memory credentials and the mock passkey verifier. Development and tests only.
    pub fn in_memory(config: Config) -> Result<Self, ArianeError> {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MockPasskeyVerifier::new()),
        )
    }

    pub fn with_revoker(mut self, revoker: Arc<dyn SessionRevoker>) -> Self {
        self.revoker = Some(revoker);
        self
    }

    pub fn with_github(mut self, github: Arc<dyn GitHubApi>) -> Self {
        self.github = Some(github);
        self
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        self.config.cookie_policy()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("auth_mode", &self.config.auth_mode)
            .field("storage", &self.credentials.backend())
            .field("revoker", &self.revoker.is_some())
            .field("github", &self.github.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GitHubConfig, ServiceAccountConfig};
    use secrecy::SecretString;

    #[test]
    fn test_optional_components_follow_config() {
        let state = AppState::in_memory(Config::default()).unwrap();
        assert!(state.revoker.is_none());
        assert!(state.github.is_none());
        assert!(state.cookie_policy().secure);

        let mut config = Config::default();
        config.insecure_cookies = true;
        let state = AppState::in_memory(config).unwrap();
        assert!(!state.cookie_policy().secure);

        let mut config = Config::default();
        config.production = true;
        config.oidc.issuer = Some("https://idp.example".into());
        config.service_account = Some(ServiceAccountConfig {
            client_id: "svc".into(),
            client_secret: SecretString::from("s".to_string()),
        });
        config.github = Some(GitHubConfig {
            client_id: "gh".into(),
            client_secret: SecretString::from("s".to_string()),
            callback_urls: vec![],
            allowed_logins: vec![],
            allowed_org: None,
        });
        let state = AppState::in_memory(config).unwrap();
        assert!(state.revoker.is_some());
        assert!(state.github.is_some());
        assert!(state.cookie_policy().secure);
    }
}
