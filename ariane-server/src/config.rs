//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.
//! Anything that would leave the service half-configured is rejected here, at
//! startup, rather than on the first request that needs it.

use std::net::SocketAddr;
use std::path::PathBuf;

use secrecy::SecretString;

use ariane_core::{ArianeError, CookiePolicy, SessionSecret, SESSION_TTL_SECS};

use crate::credentials::DEFAULT_STORE_PATH;

/// Secret used by [`Config::default`]. Never valid outside tests.
pub const TEST_SESSION_SECRET: &str = "test-session-secret-not-for-production";

/// How the access gate treats page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No app auth enforced
    #[default]
    Public,
    /// Local session required unless the edge proxy vouches for the caller
    App,
    /// Edge proxy is the only trust source
    EdgeOnly,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "public" => Some(Self::Public),
            "app" => Some(Self::App),
            "edge-only" | "cf-access-only" => Some(Self::EdgeOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::App => "app",
            Self::EdgeOnly => "edge-only",
        }
    }
}

/// Passkey ceremony settings
#[derive(Debug, Clone)]
pub struct WebAuthnSettings {
    /// Relying party display name (default: Ariane)
    pub rp_name: String,
    /// Registration open to anyone (default: false)
    pub allow_registration: bool,
    /// Account the passkeys belong to (default: admin)
    pub user_id: String,
    pub user_name: String,
    /// Reject a challenge presented a second time (default: true)
    pub single_use_challenges: bool,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_name: "Ariane".to_string(),
            allow_registration: false,
            user_id: "admin".to_string(),
            user_name: "Site Admin".to_string(),
            single_use_challenges: true,
        }
    }
}

/// Edge access proxy settings
#[derive(Debug, Clone)]
pub struct EdgeAccessConfig {
    /// e.g. `team.cloudflareaccess.com`
    pub team_domain: Option<String>,
    pub jwks_url: Option<String>,
    pub audience: Option<String>,
    /// Verify the assertion before trusting edge headers in public/app mode
    pub verify_assertion: bool,
    pub groups_claim: String,
    pub required_groups: Vec<String>,
    pub protected_prefixes: Vec<String>,
    pub approved_claim: String,
    /// Lowercased
    pub approved_value: String,
    pub enforce_approved: bool,
}

impl Default for EdgeAccessConfig {
    fn default() -> Self {
        Self {
            team_domain: None,
            jwks_url: None,
            audience: None,
            verify_assertion: false,
            groups_claim: "groups".to_string(),
            required_groups: Vec::new(),
            protected_prefixes: Vec::new(),
            approved_claim: "https://wenzelarifiandi.com/approved".to_string(),
            approved_value: "true".to_string(),
            enforce_approved: false,
        }
    }
}

/// Identity provider (OIDC) settings
#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub end_session_endpoint: Option<String>,
    /// Where the logout chain ends (default: request origin + `/`)
    pub logout_return_url: Option<String>,
}

impl OidcConfig {
    /// `{issuer}/oidc/v1/end_session` unless overridden
    pub fn end_session_url(&self) -> Option<String> {
        self.end_session_endpoint.clone().or_else(|| {
            self.issuer
                .as_ref()
                .map(|iss| format!("{}/oidc/v1/end_session", iss.trim_end_matches('/')))
        })
    }
}

/// Service account used to revoke IdP sessions
#[derive(Debug, Clone)]
pub struct ServiceAccountConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// GitHub OAuth app
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_urls: Vec<String>,
    pub allowed_logins: Vec<String>,
    pub allowed_org: Option<String>,
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 256)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,

    /// Signs sessions, challenges, OAuth state and SLO markers
    pub session_secret: SessionSecret,
    /// `ARIANE_ENV=production` forces `Secure` cookies
    pub production: bool,
    /// `ARIANE_INSECURE_COOKIES=true` drops `Secure` for plain-http localhost.
    /// Ignored in production.
    pub insecure_cookies: bool,
    /// Session lifetime in seconds (default: 7 days)
    pub session_ttl_secs: u64,
    /// Fixed public origin, overrides forwarded headers
    pub public_origin: Option<String>,

    pub webauthn: WebAuthnSettings,
    /// JSON credential document (default: .data/webauthn.json)
    pub credential_store_path: PathBuf,
    /// PostgreSQL credential store when set
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 10)
    pub database_max_connections: u32,

    pub auth_mode: AuthMode,
    /// Hosts on which `app` mode is forced down to `public`
    pub primary_hosts: Vec<String>,
    pub edge: EdgeAccessConfig,

    pub oidc: OidcConfig,
    pub service_account: Option<ServiceAccountConfig>,
    pub github: Option<GitHubConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 256,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            session_secret: SessionSecret::from(TEST_SESSION_SECRET),
            production: false,
            insecure_cookies: false,
            session_ttl_secs: SESSION_TTL_SECS,
            public_origin: None,
            webauthn: WebAuthnSettings::default(),
            credential_store_path: PathBuf::from(DEFAULT_STORE_PATH),
            database_url: None,
            database_max_connections: 10,
            auth_mode: AuthMode::Public,
            primary_hosts: default_primary_hosts(),
            edge: EdgeAccessConfig::default(),
            oidc: OidcConfig::default(),
            service_account: None,
            github: None,
        }
    }
}

fn default_primary_hosts() -> Vec<String> {
    vec![
        "wenzelarifiandi.com".to_string(),
        "www.wenzelarifiandi.com".to_string(),
    ]
}

/// Non-empty value of an environment variable
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `1`/`true`/`yes` and `0`/`false`/`no`, anything else falls back to `default`
fn env_flag(name: &str, default: bool) -> bool {
    match env_opt(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn env_list(name: &str) -> Vec<String> {
    env_opt(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn missing(message: impl Into<String>) -> ArianeError {
    ArianeError::MissingConfiguration(message.into())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ArianeError> {
        let defaults = Self::default();

        let host = env_opt("HOST")
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = env_opt("ALLOWED_ORIGINS").map(|_| env_list("ALLOWED_ORIGINS"));

        let session_secret = env_opt("SESSION_SECRET")
            .map(SessionSecret::from)
            .ok_or_else(|| missing("SESSION_SECRET is required"))?;

        let production = env_opt("ARIANE_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let webauthn = WebAuthnSettings {
            rp_name: env_opt("WEBAUTHN_RP_NAME").unwrap_or(defaults.webauthn.rp_name),
            allow_registration: env_flag("ALLOW_REGISTRATION", false),
            user_id: env_opt("WEBAUTHN_USER_ID").unwrap_or(defaults.webauthn.user_id),
            user_name: env_opt("WEBAUTHN_USER_NAME").unwrap_or(defaults.webauthn.user_name),
            single_use_challenges: env_flag("WEBAUTHN_SINGLE_USE_CHALLENGES", true),
        };

        let auth_mode = match env_opt("AUTH_MODE") {
            Some(raw) => AuthMode::parse(&raw)
                .ok_or_else(|| missing(format!("AUTH_MODE has unknown value '{raw}'")))?,
            None => AuthMode::Public,
        };

        let primary_hosts = match env_opt("PRIMARY_HOSTS") {
            Some(_) => env_list("PRIMARY_HOSTS")
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            None => defaults.primary_hosts,
        };

        let edge = EdgeAccessConfig {
            team_domain: env_opt("CF_ACCESS_TEAM_DOMAIN").map(|d| {
                d.trim_start_matches("https://")
                    .trim_end_matches('/')
                    .to_string()
            }),
            jwks_url: env_opt("CF_ACCESS_JWKS_URL"),
            audience: env_opt("CF_ACCESS_AUD"),
            verify_assertion: env_flag("CF_ACCESS_VERIFY_ASSERTION", false),
            groups_claim: env_opt("CF_ACCESS_GROUPS_CLAIM").unwrap_or(defaults.edge.groups_claim),
            required_groups: env_list("CF_ACCESS_REQUIRED_GROUPS"),
            protected_prefixes: env_list("CF_ACCESS_PROTECTED_PREFIXES"),
            approved_claim: env_opt("CF_ACCESS_APPROVED_CLAIM")
                .unwrap_or(defaults.edge.approved_claim),
            approved_value: env_opt("CF_ACCESS_APPROVED_VALUE")
                .unwrap_or(defaults.edge.approved_value)
                .to_ascii_lowercase(),
            enforce_approved: env_flag("CF_ACCESS_ENFORCE_APPROVED", false),
        };
        let needs_edge_keys =
            auth_mode == AuthMode::EdgeOnly || edge.verify_assertion || edge.enforce_approved;
        if needs_edge_keys && edge.team_domain.is_none() && edge.jwks_url.is_none() {
            return Err(missing(
                "edge assertion checks require CF_ACCESS_TEAM_DOMAIN or CF_ACCESS_JWKS_URL",
            ));
        }

        let oidc = OidcConfig {
            issuer: env_opt("OIDC_ISSUER").map(|i| i.trim_end_matches('/').to_string()),
            client_id: env_opt("OIDC_CLIENT_ID"),
            end_session_endpoint: env_opt("OIDC_END_SESSION_ENDPOINT"),
            logout_return_url: env_opt("LOGOUT_RETURN_URL"),
        };
        if oidc.client_id.is_some() && oidc.issuer.is_none() {
            return Err(missing("OIDC_CLIENT_ID is set but OIDC_ISSUER is not"));
        }

        let service_account = match (
            env_opt("IDP_SERVICE_CLIENT_ID"),
            env_opt("IDP_SERVICE_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(secret)) => {
                if oidc.issuer.is_none() {
                    return Err(missing("IDP service account requires OIDC_ISSUER"));
                }
                Some(ServiceAccountConfig {
                    client_id,
                    client_secret: SecretString::from(secret),
                })
            }
            (None, None) => None,
            _ => {
                return Err(missing(
                    "IDP_SERVICE_CLIENT_ID and IDP_SERVICE_CLIENT_SECRET must be set together",
                ))
            }
        };

        let github = match (
            env_opt("GITHUB_OAUTH_CLIENT_ID"),
            env_opt("GITHUB_OAUTH_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(secret)) => {
                let mut callback_urls = env_list("GITHUB_OAUTH_CALLBACK_URLS");
                if callback_urls.is_empty() {
                    callback_urls = env_list("GITHUB_OAUTH_CALLBACK_URL");
                }
                Some(GitHubConfig {
                    client_id,
                    client_secret: SecretString::from(secret),
                    callback_urls,
                    allowed_logins: env_list("GITHUB_ALLOWED_LOGINS"),
                    allowed_org: env_opt("GITHUB_ALLOWED_ORG"),
                })
            }
            (Some(_), None) => {
                return Err(missing(
                    "GITHUB_OAUTH_CLIENT_ID is set but GITHUB_OAUTH_CLIENT_SECRET is not",
                ))
            }
            _ => None,
        };

        Ok(Self {
            port: env_parse("PORT", defaults.port),
            host,
            allowed_origins,
            body_limit_kb: env_parse("BODY_LIMIT_KB", defaults.body_limit_kb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", defaults.timeout_secs),
            // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
            rate_limit_enabled: env_flag("RATE_LIMIT_ENABLED", true),
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            session_secret,
            production,
            insecure_cookies: !production && env_flag("ARIANE_INSECURE_COOKIES", false),
            session_ttl_secs: env_parse("SESSION_TTL_SECS", defaults.session_ttl_secs),
            public_origin: env_opt("PUBLIC_ORIGIN").map(|o| o.trim_end_matches('/').to_string()),
            webauthn,
            credential_store_path: env_opt("CREDENTIAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credential_store_path),
            database_url: env_opt("DATABASE_URL"),
            database_max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            auth_mode,
            primary_hosts,
            edge,
            oidc,
            service_account,
            github,
        })
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::for_environment(self.production, self.insecure_cookies)
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const ALL_VARS: &[&str] = &[
        "SESSION_SECRET",
        "AUTH_MODE",
        "ALLOW_REGISTRATION",
        "ARIANE_ENV",
        "ARIANE_INSECURE_COOKIES",
        "CF_ACCESS_TEAM_DOMAIN",
        "CF_ACCESS_JWKS_URL",
        "CF_ACCESS_VERIFY_ASSERTION",
        "CF_ACCESS_ENFORCE_APPROVED",
        "PRIMARY_HOSTS",
        "OIDC_ISSUER",
        "OIDC_CLIENT_ID",
        "IDP_SERVICE_CLIENT_ID",
        "IDP_SERVICE_CLIENT_SECRET",
        "GITHUB_OAUTH_CLIENT_ID",
        "GITHUB_OAUTH_CLIENT_SECRET",
        "GITHUB_OAUTH_CALLBACK_URLS",
        "GITHUB_OAUTH_CALLBACK_URL",
        "CF_ACCESS_APPROVED_VALUE",
    ];

    /// Run `f` with only `vars` set among the variables these tests care about
    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let mut all: Vec<(&str, Option<&str>)> = ALL_VARS.iter().map(|k| (*k, None)).collect();
        for &(k, v) in vars {
            all.retain(|(name, _)| *name != k);
            all.push((k, Some(v)));
        }
        temp_env::with_vars(all, f);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth_mode, AuthMode::Public);
        assert!(!config.rate_limit_enabled);
        assert!(config.webauthn.single_use_challenges);
        assert_eq!(config.webauthn.user_id, "admin");
        assert_eq!(config.credential_store_path, PathBuf::from(".data/webauthn.json"));
    }

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!(AuthMode::parse("public"), Some(AuthMode::Public));
        assert_eq!(AuthMode::parse("APP"), Some(AuthMode::App));
        assert_eq!(AuthMode::parse("edge-only"), Some(AuthMode::EdgeOnly));
        assert_eq!(AuthMode::parse("cf-access-only"), Some(AuthMode::EdgeOnly));
        assert_eq!(AuthMode::parse("strict"), None);
    }

    #[test]
    fn test_missing_secret_fails_fast() {
        with_env(&[], || {
            assert!(matches!(
                Config::from_env(),
                Err(ArianeError::MissingConfiguration(_))
            ));
        });
    }

    #[test]
    fn test_minimal_env() {
        with_env(&[("SESSION_SECRET", "s3cret")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.session_secret.as_bytes(), b"s3cret");
            assert!(config.rate_limit_enabled);
            assert!(!config.production);
            assert!(config.github.is_none());
            assert!(config.service_account.is_none());
        });
    }

    #[test]
    fn test_unknown_auth_mode_rejected() {
        with_env(&[("SESSION_SECRET", "s"), ("AUTH_MODE", "sometimes")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn test_half_configured_service_account_rejected() {
        with_env(
            &[
                ("SESSION_SECRET", "s"),
                ("OIDC_ISSUER", "https://idp.example"),
                ("IDP_SERVICE_CLIENT_ID", "svc"),
            ],
            || assert!(Config::from_env().is_err()),
        );
    }

    #[test]
    fn test_github_id_without_secret_rejected() {
        with_env(
            &[("SESSION_SECRET", "s"), ("GITHUB_OAUTH_CLIENT_ID", "gh")],
            || assert!(Config::from_env().is_err()),
        );
    }

    #[test]
    fn test_oidc_client_without_issuer_rejected() {
        with_env(
            &[("SESSION_SECRET", "s"), ("OIDC_CLIENT_ID", "client")],
            || assert!(Config::from_env().is_err()),
        );
    }

    #[test]
    fn test_full_identity_env() {
        with_env(
            &[
                ("SESSION_SECRET", "s"),
                ("ARIANE_ENV", "production"),
                ("AUTH_MODE", "cf-access-only"),
                ("CF_ACCESS_TEAM_DOMAIN", "https://team.example/"),
                ("ALLOW_REGISTRATION", "true"),
                ("PRIMARY_HOSTS", "Example.com, www.example.com"),
                ("OIDC_ISSUER", "https://idp.example/"),
                ("OIDC_CLIENT_ID", "client"),
                ("IDP_SERVICE_CLIENT_ID", "svc"),
                ("IDP_SERVICE_CLIENT_SECRET", "svc-secret"),
                ("GITHUB_OAUTH_CLIENT_ID", "gh"),
                ("GITHUB_OAUTH_CLIENT_SECRET", "gh-secret"),
                ("GITHUB_OAUTH_CALLBACK_URL", "https://example.com/cb"),
                ("CF_ACCESS_APPROVED_VALUE", "YES"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert!(config.production);
                assert_eq!(config.auth_mode, AuthMode::EdgeOnly);
                assert!(config.webauthn.allow_registration);
                assert_eq!(config.primary_hosts, vec!["example.com", "www.example.com"]);
                assert_eq!(config.oidc.issuer.as_deref(), Some("https://idp.example"));
                assert_eq!(
                    config.oidc.end_session_url().as_deref(),
                    Some("https://idp.example/oidc/v1/end_session")
                );
                let svc = config.service_account.unwrap();
                assert_eq!(svc.client_secret.expose_secret(), "svc-secret");
                let gh = config.github.unwrap();
                assert_eq!(gh.callback_urls, vec!["https://example.com/cb"]);
                assert_eq!(config.edge.approved_value, "yes");
                assert_eq!(config.edge.team_domain.as_deref(), Some("team.example"));
            },
        );
    }

    #[test]
    fn test_edge_checks_without_key_source_rejected() {
        for var in [
            ("AUTH_MODE", "edge-only"),
            ("CF_ACCESS_VERIFY_ASSERTION", "true"),
            ("CF_ACCESS_ENFORCE_APPROVED", "true"),
        ] {
            with_env(&[("SESSION_SECRET", "s"), var], || {
                let err = Config::from_env().unwrap_err();
                assert!(matches!(err, ArianeError::MissingConfiguration(_)));
                assert!(err.to_string().contains("CF_ACCESS_TEAM_DOMAIN"));
            });
        }

        with_env(
            &[
                ("SESSION_SECRET", "s"),
                ("AUTH_MODE", "edge-only"),
                ("CF_ACCESS_JWKS_URL", "https://keys.example/certs"),
            ],
            || assert!(Config::from_env().is_ok()),
        );
    }

    #[test]
    fn test_cookies_secure_unless_opted_out() {
        with_env(&[("SESSION_SECRET", "s")], || {
            let config = Config::from_env().unwrap();
            assert!(!config.insecure_cookies);
            assert!(config.cookie_policy().secure);
        });
        with_env(
            &[("SESSION_SECRET", "s"), ("ARIANE_INSECURE_COOKIES", "true")],
            || assert!(!Config::from_env().unwrap().cookie_policy().secure),
        );
        with_env(
            &[
                ("SESSION_SECRET", "s"),
                ("ARIANE_ENV", "production"),
                ("ARIANE_INSECURE_COOKIES", "true"),
            ],
            || assert!(Config::from_env().unwrap().cookie_policy().secure),
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.github = Some(GitHubConfig {
            client_id: "gh".into(),
            client_secret: SecretString::from("gh-very-secret".to_string()),
            callback_urls: vec![],
            allowed_logins: vec![],
            allowed_org: None,
        });
        let debug = format!("{config:?}");
        assert!(!debug.contains(TEST_SESSION_SECRET));
        assert!(!debug.contains("gh-very-secret"));
    }
}
