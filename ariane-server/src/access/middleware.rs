//! Access gate middleware.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use ariane_core::{get_cookie, read_session, SESSION_COOKIE};

use crate::config::AuthMode;
use crate::error::ApiError;
use crate::state::AppState;

use super::edge::{EdgeClaims, EdgeVerifier};
use super::origin::{request_host, request_origin};
use super::policy::{effective_mode, is_bypassed, is_protected};
use super::Caller;

enum Decision {
    Allow(Caller),
    Deny(ApiError),
    /// Send the browser to the access-required page
    Challenge,
}

fn edge_caller(claims: &EdgeClaims, headers: &HeaderMap) -> Caller {
    Caller::edge(
        claims.subject().map(str::to_string),
        claims
            .email()
            .map(str::to_string)
            .or_else(|| EdgeVerifier::email_header(headers)),
    )
}

/// Caller carried by a valid, unexpired `session` cookie.
pub(crate) fn session_caller(headers: &HeaderMap, secret: &[u8]) -> Option<Caller> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = get_cookie(cookies, SESSION_COOKIE)?;
    let session = read_session(&token, secret).ok()?;
    Some(Caller::session(session.sub, session.email))
}

/// Unverified proxy headers count only outside edge-only mode and only while
/// assertion verification is off.
fn trusts_bare_headers(state: &AppState) -> bool {
    state.config.auth_mode != AuthMode::EdgeOnly && !state.edge.config().verify_assertion
}

/// Email the edge proxy vouches for, under the same rules as the gate.
pub(crate) async fn edge_email(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if trusts_bare_headers(state) {
        if let Some(email) = EdgeVerifier::email_header(headers) {
            return Some(email);
        }
    }
    if EdgeVerifier::assertion(headers).is_none() {
        return None;
    }
    match state.edge.verify_request(headers).await {
        Ok(claims) => claims.email().map(str::to_string),
        Err(e) => {
            tracing::debug!(error = %e, "Edge assertion did not verify, ignoring its identity");
            None
        }
    }
}

async fn decide_edge_only(state: &AppState, path: &str, headers: &HeaderMap) -> Decision {
    let edge = &state.edge;
    let config = edge.config();

    if is_protected(path, &config.protected_prefixes) {
        let claims = match edge.verify_request(headers).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Edge assertion rejected on protected path");
                return Decision::Deny(ApiError::unauthorized("Edge assertion required"));
            }
        };
        if !edge.has_required_groups(&claims) {
            tracing::warn!(path = %path, "Caller lacks required edge groups");
            return Decision::Deny(ApiError::forbidden("Missing required group"));
        }
        return Decision::Allow(edge_caller(&claims, headers));
    }

    if config.enforce_approved {
        let claims = match edge.verify_request(headers).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Edge assertion rejected");
                return Decision::Deny(ApiError::unauthorized("Edge assertion required"));
            }
        };
        if !edge.is_approved(&claims) {
            return Decision::Deny(ApiError::forbidden("Not approved"));
        }
        return Decision::Allow(edge_caller(&claims, headers));
    }

    Decision::Allow(Caller::anonymous())
}

async fn decide(state: &AppState, mode: AuthMode, path: &str, headers: &HeaderMap) -> Decision {
    if mode == AuthMode::EdgeOnly {
        return decide_edge_only(state, path, headers).await;
    }

    if EdgeVerifier::has_edge_headers(headers) {
        if trusts_bare_headers(state) {
            return Decision::Allow(Caller::edge(None, EdgeVerifier::email_header(headers)));
        }
        match state.edge.verify_request(headers).await {
            Ok(claims) => return Decision::Allow(edge_caller(&claims, headers)),
            Err(e) => tracing::debug!(error = %e, "Edge headers present but assertion did not verify"),
        }
    }

    let session = session_caller(headers, state.config.session_secret.as_bytes());
    match (mode, session) {
        (_, Some(caller)) => Decision::Allow(caller),
        (AuthMode::App, None) => Decision::Challenge,
        _ => Decision::Allow(Caller::anonymous()),
    }
}

fn access_required(origin: &str, path_and_query: &str) -> Response {
    let location = format!(
        "{origin}/access-required?next={}",
        urlencoding::encode(path_and_query)
    );
    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => ApiError::unauthorized("Authentication required").into_response(),
    }
}

/// Decide whether the request may proceed and record who the caller is.
pub async fn access_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_bypassed(&path) {
        request.extensions_mut().insert(Caller::anonymous());
        return next.run(request).await;
    }

    let headers = request.headers();
    let host = request_host(headers);
    let mode = effective_mode(state.config.auth_mode, &host, &state.config.primary_hosts);
    let origin = request_origin(headers, state.config.public_origin.as_deref());

    match decide(&state, mode, &path, headers).await {
        Decision::Allow(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Decision::Deny(err) => err.into_response(),
        Decision::Challenge => {
            let path_and_query = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            tracing::debug!(path = %path, mode = mode.as_str(), "No session, redirecting to access-required");
            access_required(&origin, &path_and_query)
        }
    }
}
