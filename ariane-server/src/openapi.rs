//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/api/docs/openapi.json`.

use utoipa::OpenApi;

use crate::handlers::{
    ApprovalStatusResponse, DiagConfigured, DiagResponse, HealthResponse, ReadyResponse,
    SessionResponse,
};
use crate::logout::SloResponse;
use crate::webauthn::{CredentialJson, VerifiedResponse};

/// Ariane identity session layer - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ariane - Identity Session API",
        version = "0.1.0",
        description = r#"
## Federated identity for a personal site

Ariane keeps the browser session in a signed, stateless cookie and lets several
sources vouch for the caller:

- **Passkeys** - WebAuthn registration and authentication against a small credential store
- **GitHub OAuth** - PKCE login with an optional login allowlist and org membership check
- **Edge access proxy** - Cloudflare Access assertions verified against the team JWKS
- **Single logout** - local cookies, the IdP session and the edge session end together

### Cookies

`session`, `webauthn_chal`, `cipher_id_token` and `slo_user` are all
`HttpOnly; SameSite=Strict; Path=/; Secure`. Outside production,
`ARIANE_INSECURE_COOKIES=true` drops `Secure` for plain-http localhost.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "WebAuthn", description = "Passkey registration and authentication ceremonies"),
        (name = "OAuth", description = "GitHub login"),
        (name = "Session", description = "Session and approval checks"),
        (name = "Logout", description = "Local logout, full signout chain and single logout"),
        (name = "Health", description = "Service health, readiness and diagnostics")
    ),
    paths(
        crate::webauthn::handlers::registration_options,
        crate::webauthn::handlers::verify_registration,
        crate::webauthn::handlers::authentication_options,
        crate::webauthn::handlers::verify_authentication,
        crate::handlers::session::session,
        crate::handlers::session::approval_status,
        crate::oauth::handlers::github_start,
        crate::oauth::handlers::github_callback,
        crate::logout::handlers::logout,
        crate::logout::handlers::signout,
        crate::logout::handlers::single_logout,
        crate::handlers::diag::diag,
        crate::handlers::health::health,
        crate::handlers::health::ready,
    ),
    components(
        schemas(
            CredentialJson,
            VerifiedResponse,
            SessionResponse,
            ApprovalStatusResponse,
            SloResponse,
            DiagResponse,
            DiagConfigured,
            HealthResponse,
            ReadyResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/api/auth/registration-options",
            "/api/auth/verify-registration",
            "/api/auth/authentication-options",
            "/api/auth/verify-authentication",
            "/api/auth/session",
            "/api/auth/approval-status",
            "/api/oauth/github/start",
            "/api/oauth/github/callback",
            "/api/auth/logout",
            "/signout",
            "/slo",
            "/api/diag",
            "/health",
            "/ready",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
    }
}
