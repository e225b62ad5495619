//! GitHub OAuth and REST calls made during the callback.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use ariane_core::ArianeError;

use crate::config::GitHubConfig;

pub const GITHUB_OAUTH_BASE: &str = "https://github.com";
pub const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    /// Public profile email, often hidden
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// The primary verified address, or the first one listed.
pub fn primary_email(emails: &[GitHubEmail]) -> Option<&str> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.first())
        .map(|e| e.email.as_str())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct Membership {
    state: Option<String>,
}

/// The provider side of the callback.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Browser-facing authorize endpoint
    fn authorize_url(&self) -> String;

    /// Trade an authorization code (plus PKCE verifier) for an access token.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<SecretString, ArianeError>;

    async fn user(&self, token: &SecretString) -> Result<GitHubUser, ArianeError>;

    async fn emails(&self, token: &SecretString) -> Result<Vec<GitHubEmail>, ArianeError>;

    /// Whether the user is an active member of `org`. Any non-success answer
    /// from GitHub counts as "no".
    async fn is_active_member(&self, token: &SecretString, org: &str) -> Result<bool, ArianeError>;
}

/// [`GitHubApi`] over HTTPS
pub struct HttpGitHubApi {
    client_id: String,
    client_secret: SecretString,
    oauth_base: String,
    api_base: String,
    http_client: reqwest::Client,
}

fn upstream(context: &str, e: impl std::fmt::Display) -> ArianeError {
    ArianeError::UpstreamUnavailable(format!("GitHub {context}: {e}"))
}

impl HttpGitHubApi {
    pub fn new(config: &GitHubConfig, http_client: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            oauth_base: GITHUB_OAUTH_BASE.to_string(),
            api_base: GITHUB_API_BASE.to_string(),
            http_client,
        }
    }

    /// Point at another host, e.g. a GitHub Enterprise instance or a test server.
    pub fn with_base_urls(mut self, oauth_base: &str, api_base: &str) -> Self {
        self.oauth_base = oauth_base.trim_end_matches('/').to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, path: &str, token: &SecretString) -> Result<reqwest::Response, ArianeError> {
        self.http_client
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| upstream(path, e))
    }
}

#[async_trait]
impl GitHubApi for HttpGitHubApi {
    fn authorize_url(&self) -> String {
        format!("{}/login/oauth/authorize", self.oauth_base)
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<SecretString, ArianeError> {
        let response = self
            .http_client
            .post(format!("{}/login/oauth/access_token", self.oauth_base))
            .header(ACCEPT, "application/json")
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret.expose_secret(),
                "code": code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await
            .map_err(|e| upstream("token exchange", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream("token exchange", status));
        }

        // GitHub reports a bad code as 200 with an `error` field and no token
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| upstream("token exchange", e))?;
        body.access_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| upstream("token exchange", "missing access token in response"))
    }

    async fn user(&self, token: &SecretString) -> Result<GitHubUser, ArianeError> {
        let response = self.get("/user", token).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream("/user", status));
        }
        response.json().await.map_err(|e| upstream("/user", e))
    }

    async fn emails(&self, token: &SecretString) -> Result<Vec<GitHubEmail>, ArianeError> {
        let response = self.get("/user/emails", token).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream("/user/emails", status));
        }
        response.json().await.map_err(|e| upstream("/user/emails", e))
    }

    async fn is_active_member(&self, token: &SecretString, org: &str) -> Result<bool, ArianeError> {
        let path = format!("/user/memberships/orgs/{}", urlencoding::encode(org));
        let response = self.get(&path, token).await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let membership: Membership = response.json().await.map_err(|e| upstream(&path, e))?;
        Ok(membership.state.as_deref() == Some("active"))
    }
}

impl std::fmt::Debug for HttpGitHubApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGitHubApi")
            .field("client_id", &self.client_id)
            .field("oauth_base", &self.oauth_base)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpGitHubApi {
        let config = GitHubConfig {
            client_id: "gh-client".into(),
            client_secret: SecretString::from("gh-secret".to_string()),
            callback_urls: vec![],
            allowed_logins: vec![],
            allowed_org: None,
        };
        HttpGitHubApi::new(&config, reqwest::Client::new()).with_base_urls(&server.uri(), &server.uri())
    }

    fn token() -> SecretString {
        SecretString::from("gho_token".to_string())
    }

    #[test]
    fn test_primary_email_selection() {
        let emails = vec![
            GitHubEmail { email: "old@example.com".into(), primary: false, verified: true },
            GitHubEmail { email: "unverified@example.com".into(), primary: true, verified: false },
            GitHubEmail { email: "main@example.com".into(), primary: true, verified: true },
        ];
        assert_eq!(primary_email(&emails), Some("main@example.com"));

        let fallback = vec![GitHubEmail { email: "only@example.com".into(), primary: false, verified: false }];
        assert_eq!(primary_email(&fallback), Some("only@example.com"));
        assert_eq!(primary_email(&[]), None);
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(header("accept", "application/json"))
            .and(body_partial_json(json!({
                "client_id": "gh-client",
                "client_secret": "gh-secret",
                "code": "the-code",
                "code_verifier": "the-verifier",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gho_token", "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = api(&server).exchange_code("the-code", "the-verifier").await.unwrap();
        assert_eq!(token.expose_secret(), "gho_token");
    }

    #[tokio::test]
    async fn test_exchange_code_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "bad_verification_code"
            })))
            .mount(&server)
            .await;

        let result = api(&server).exchange_code("stale", "v").await;
        assert!(matches!(result, Err(ArianeError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_user_and_emails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gho_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42, "login": "octocat", "email": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "octo@example.com", "primary": true, "verified": true }
            ])))
            .mount(&server)
            .await;

        let api = api(&server);
        let user = api.user(&token()).await.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.login, "octocat");
        assert!(user.email.is_none());

        let emails = api.emails(&token()).await.unwrap();
        assert_eq!(primary_email(&emails), Some("octo@example.com"));
    }

    #[tokio::test]
    async fn test_user_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(matches!(
            api(&server).user(&token()).await,
            Err(ArianeError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_org_membership() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/memberships/orgs/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "active" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/memberships/orgs/pending-org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "pending" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/memberships/orgs/other"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = api(&server);
        assert!(api.is_active_member(&token(), "acme").await.unwrap());
        assert!(!api.is_active_member(&token(), "pending-org").await.unwrap());
        assert!(!api.is_active_member(&token(), "other").await.unwrap());
    }

    #[test]
    fn test_authorize_url() {
        let config = GitHubConfig {
            client_id: "id".into(),
            client_secret: SecretString::from("s".to_string()),
            callback_urls: vec![],
            allowed_logins: vec![],
            allowed_org: None,
        };
        let api = HttpGitHubApi::new(&config, reqwest::Client::new());
        assert_eq!(api.authorize_url(), "https://github.com/login/oauth/authorize");
        assert!(!format!("{api:?}").contains("\"s\""));
    }
}
