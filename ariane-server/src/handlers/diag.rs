//! Configuration diagnostics. Reports what is configured, never the values.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct DiagConfigured {
    pub session_secret: bool,
    pub public_origin: bool,
    pub allow_registration: bool,
    pub oidc_issuer: bool,
    pub oidc_client_id: bool,
    pub service_account: bool,
    pub github: bool,
    pub github_allowlist: bool,
    pub github_org: bool,
    pub edge_team_domain: bool,
    pub edge_audience: bool,
    pub database: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiagResponse {
    pub ok: bool,
    pub version: &'static str,
    pub production: bool,
    pub auth_mode: &'static str,
    pub credential_storage: &'static str,
    pub passkey_verifier: &'static str,
    pub configured: DiagConfigured,
    /// RFC 3339 server time
    pub time: String,
}

/// Configuration diagnostics
#[utoipa::path(
    get,
    path = "/api/diag",
    tag = "Health",
    responses(
        (status = 200, description = "Which settings are present", body = DiagResponse)
    )
)]
pub async fn diag(State(state): State<AppState>) -> Json<DiagResponse> {
    let config = &state.config;
    let github = config.github.as_ref();

    Json(DiagResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        production: config.production,
        auth_mode: config.auth_mode.as_str(),
        credential_storage: state.credentials.backend(),
        passkey_verifier: state.ceremonies.verifier_name(),
        configured: DiagConfigured {
            session_secret: !config.session_secret.is_empty(),
            public_origin: config.public_origin.is_some(),
            allow_registration: config.webauthn.allow_registration,
            oidc_issuer: config.oidc.issuer.is_some(),
            oidc_client_id: config.oidc.client_id.is_some(),
            service_account: config.service_account.is_some(),
            github: github.is_some(),
            github_allowlist: github.is_some_and(|g| !g.allowed_logins.is_empty()),
            github_org: github.is_some_and(|g| g.allowed_org.is_some()),
            edge_team_domain: config.edge.team_domain.is_some(),
            edge_audience: config.edge.audience.is_some(),
            database: config.database_url.is_some(),
        },
        time: chrono::Utc::now().to_rfc3339(),
    })
}
