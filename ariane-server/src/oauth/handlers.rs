//! GitHub OAuth HTTP handlers
//!
//! - `GET /api/oauth/github/start`
//! - `GET /api/oauth/github/callback`

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::Url;
use utoipa::IntoParams;

use ariane_core::{
    decode_state, encode_state, mint_session, now_millis, sanitize_redirect, ArianeError,
    SessionPayload, SESSION_COOKIE,
};

use crate::access::request_origin;
use crate::config::GitHubConfig;
use crate::error::ApiError;
use crate::handlers::with_cookies;
use crate::state::AppState;

use super::github::{primary_email, GitHubApi};

/// Query parameters of the start endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct StartQuery {
    /// Same-site path to land on after login
    pub redirect: Option<String>,
}

/// Query parameters GitHub sends back
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

fn github(state: &AppState) -> Result<(&GitHubConfig, &Arc<dyn GitHubApi>), ApiError> {
    match (state.config.github.as_ref(), state.github.as_ref()) {
        (Some(config), Some(api)) => Ok((config, api)),
        _ => Err(ArianeError::MissingConfiguration("GitHub OAuth is not configured".into()).into()),
    }
}

fn redirect(location: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(location)
        .map_err(|e| ApiError::internal(format!("redirect location: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, value)]).into_response())
}

fn access_denied(origin: &str, message: &str) -> Result<Response, ApiError> {
    redirect(&format!(
        "{origin}/access-denied?msg={}",
        urlencoding::encode(message)
    ))
}

/// Start GitHub login
#[utoipa::path(
    get,
    path = "/api/oauth/github/start",
    tag = "OAuth",
    params(StartQuery),
    responses(
        (status = 302, description = "Redirect to GitHub's authorize page"),
        (status = 500, description = "GitHub OAuth not configured")
    )
)]
pub async fn github_start(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Response, ApiError> {
    let (config, api) = github(&state)?;
    let target = sanitize_redirect(query.redirect.as_deref().unwrap_or("/"));
    let encoded = encode_state(&target, state.config.session_secret.as_bytes())?;

    let scope = if config.allowed_org.is_some() {
        "read:user user:email read:org"
    } else {
        "read:user user:email"
    };

    let mut url = Url::parse(&api.authorize_url())
        .map_err(|e| ApiError::internal(format!("authorize URL: {e}")))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("client_id", &config.client_id);
        // Without one GitHub uses the callback registered with the app
        if let Some(callback) = config.callback_urls.first() {
            params.append_pair("redirect_uri", callback);
        }
        params
            .append_pair("scope", scope)
            .append_pair("state", &encoded.state)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &encoded.code_challenge);
    }

    tracing::debug!(redirect = %target, "Starting GitHub login");
    redirect(url.as_str())
}

/// Complete GitHub login
#[utoipa::path(
    get,
    path = "/api/oauth/github/callback",
    tag = "OAuth",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Session started, or redirect to /access-denied"),
        (status = 400, description = "Invalid or missing OAuth state/code"),
        (status = 502, description = "GitHub request failed")
    )
)]
pub async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let (config, api) = github(&state)?;
    let secret = state.config.session_secret.as_bytes();
    let origin = request_origin(&headers, state.config.public_origin.as_deref());

    let (Some(code), Some(raw_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(ApiError::bad_request("Invalid or missing OAuth state/code"));
    };
    let decoded = decode_state(raw_state, secret).map_err(|e| {
        tracing::warn!(error = %e, "OAuth state rejected");
        ApiError::bad_request("Invalid or expired OAuth state")
    })?;

    let token = api
        .exchange_code(code, &decoded.code_verifier)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    let user = api
        .user(&token)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;

    if !config.allowed_logins.is_empty() && !config.allowed_logins.contains(&user.login) {
        tracing::warn!(login = %user.login, "GitHub login not on the allowlist");
        return access_denied(&origin, "Not on the allowlist");
    }

    let email = match api.emails(&token).await {
        Ok(emails) => primary_email(&emails).map(str::to_string),
        Err(e) => {
            tracing::debug!(error = %e, "Could not list GitHub emails");
            None
        }
    }
    .or_else(|| user.email.clone());

    if let Some(org) = &config.allowed_org {
        let member = match api.is_active_member(&token, org).await {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(org = %org, error = %e, "Org membership check failed");
                false
            }
        };
        if !member {
            tracing::warn!(login = %user.login, org = %org, "GitHub user not an active org member");
            return access_denied(&origin, "Org membership required");
        }
    }

    let mut payload = SessionPayload::new(
        format!("github:{}", user.id),
        now_millis(),
        state.config.session_ttl_secs,
    )
    .with_provider("github")
    .with_login(user.login.clone());
    if let Some(email) = email {
        payload = payload.with_email(email);
    }
    let session = mint_session(&payload, secret)?;

    tracing::info!(login = %user.login, sub = %payload.sub, "GitHub login completed");

    let location = format!("{origin}{}", sanitize_redirect(&decoded.redirect));
    let cookie = state
        .cookie_policy()
        .make(SESSION_COOKIE, &session, state.config.session_ttl_secs);
    Ok(with_cookies(redirect(&location)?, vec![cookie]))
}
