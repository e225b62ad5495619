//! Logout HTTP handlers
//!
//! - `GET  /signout`: full chain through the IdP and the edge proxy
//! - `POST /api/auth/logout`: local session only, leaves an SLO marker
//! - `POST /slo`: revoke IdP sessions named by the SLO marker

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

use ariane_core::{
    get_cookie, now_millis, read_slo_marker_at, sign_json, SloMarker, ID_TOKEN_COOKIE,
    SESSION_COOKIE, SLO_COOKIE, SLO_TTL_SECS,
};

use crate::access::{edge_email, request_origin, session_caller};
use crate::error::ApiError;
use crate::handlers::{cookie_header, with_cookies};
use crate::state::AppState;

use super::chain::LogoutChain;
use super::id_token;

const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Result of a single-logout call
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SloResponse {
    pub success: bool,
    pub email: String,
    pub sessions_deleted: u32,
    pub sessions_failed: u32,
    pub message: String,
}

/// The ID token cookie, when it is a usable end-session hint.
fn id_token_hint(state: &AppState, cookies: Option<&str>) -> Option<(String, Map<String, Value>)> {
    let token = get_cookie(cookies?, ID_TOKEN_COOKIE)?;
    let issuer = state.config.oidc.issuer.as_deref()?;
    let client_id = state.config.oidc.client_id.as_deref()?;
    let claims = id_token::hint_claims(&token, issuer, client_id)?;
    Some((token, claims))
}

/// Email of the caller, from the most trusted source that has one.
async fn caller_email(
    state: &AppState,
    headers: &HeaderMap,
    id_claims: Option<&Map<String, Value>>,
) -> Option<String> {
    if let Some(email) = edge_email(state, headers).await {
        return Some(email);
    }
    if let Some(email) =
        session_caller(headers, state.config.session_secret.as_bytes()).and_then(|c| c.email)
    {
        return Some(email);
    }
    id_claims.and_then(id_token::email)
}

fn spawn_revocation(state: &AppState, email: String) {
    let Some(revoker) = state.revoker.clone() else {
        return;
    };
    tokio::spawn(async move {
        match revoker.revoke_all(&email).await {
            Ok(tally) => tracing::info!(
                email = %email,
                deleted = tally.deleted,
                failed = tally.failed,
                "IdP sessions revoked"
            ),
            Err(e) => tracing::warn!(email = %email, error = %e, "IdP session revocation failed"),
        }
    });
}

/// Sign out everywhere
///
/// Clears the local cookies, revokes IdP sessions in the background and sends
/// the browser through the IdP and edge logout endpoints.
#[utoipa::path(
    get,
    path = "/signout",
    tag = "Logout",
    responses(
        (status = 302, description = "Redirect to the first hop of the logout chain; clears session cookies")
    )
)]
pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let origin = request_origin(&headers, state.config.public_origin.as_deref());
    let hint = id_token_hint(&state, cookie_header(&headers));

    let email = caller_email(&state, &headers, hint.as_ref().map(|(_, c)| c)).await;
    match email {
        Some(email) => spawn_revocation(&state, email),
        None => tracing::debug!("Signout without a known identity, skipping IdP revocation"),
    }

    let plan = LogoutChain::from_config(&state.config, &origin)
        .plan(hint.as_ref().map(|(token, _)| token.as_str()))?;
    tracing::info!(branch = ?plan.branch, hops = plan.hops.len(), "Signing out");

    let location = HeaderValue::from_str(plan.location())
        .map_err(|e| ApiError::internal(format!("logout location: {e}")))?;

    let policy = state.cookie_policy();
    Ok(with_cookies(
        (
            StatusCode::FOUND,
            [
                (header::LOCATION, location),
                (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
            ],
        ),
        vec![
            policy.clear(SESSION_COOKIE),
            policy.clear(ID_TOKEN_COOKIE),
            policy.clear(SLO_COOKIE),
        ],
    ))
}

/// End the local session
///
/// When the caller is known, a short-lived `slo_user` marker is left so the
/// page can follow up with `POST /slo`.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Logout",
    responses(
        (status = 204, description = "Session cleared")
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let policy = state.cookie_policy();
    let mut cookies = vec![policy.clear(SESSION_COOKIE)];

    let email = match session_caller(&headers, state.config.session_secret.as_bytes())
        .and_then(|c| c.email)
    {
        Some(email) => Some(email),
        None => edge_email(&state, &headers).await,
    };
    if let Some(email) = email {
        let marker = sign_json(
            &SloMarker::new(email, now_millis()),
            state.config.session_secret.as_bytes(),
        )?;
        cookies.push(policy.make(SLO_COOKIE, &marker, SLO_TTL_SECS));
    }

    Ok(with_cookies(StatusCode::NO_CONTENT, cookies))
}

/// Revoke IdP sessions for the user named by the SLO marker
#[utoipa::path(
    post,
    path = "/slo",
    tag = "Logout",
    responses(
        (status = 200, description = "Sessions revoked", body = SloResponse),
        (status = 400, description = "No SLO session found"),
        (status = 503, description = "IdP unavailable or revocation not configured")
    )
)]
pub async fn single_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let clear = vec![state.cookie_policy().clear(SLO_COOKIE)];

    let marker = cookie_header(&headers)
        .and_then(|c| get_cookie(c, SLO_COOKIE))
        .and_then(|token| {
            read_slo_marker_at(&token, state.config.session_secret.as_bytes(), now_millis()).ok()
        });
    let Some(marker) = marker else {
        return with_cookies(
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No SLO session found" })),
            ),
            clear,
        );
    };

    let Some(revoker) = state.revoker.as_ref() else {
        return with_cookies(
            ApiError::service_unavailable("IdP session revocation is not configured"),
            clear,
        );
    };

    match revoker.revoke_all(&marker.email).await {
        Ok(tally) => {
            tracing::info!(
                email = %marker.email,
                deleted = tally.deleted,
                failed = tally.failed,
                "Single logout completed"
            );
            let body = SloResponse {
                success: true,
                message: format!(
                    "{} session(s) deleted, {} failed",
                    tally.deleted, tally.failed
                ),
                email: marker.email,
                sessions_deleted: tally.deleted,
                sessions_failed: tally.failed,
            };
            with_cookies(Json(body), clear)
        }
        Err(e) => with_cookies(ApiError::from(e).into_response(), clear),
    }
}
