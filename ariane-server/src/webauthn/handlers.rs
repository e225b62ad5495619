//! WebAuthn HTTP handlers
//!
//! - `GET  /api/auth/registration-options`
//! - `POST /api/auth/verify-registration`
//! - `GET  /api/auth/authentication-options`
//! - `POST /api/auth/verify-authentication`
//!
//! Every response that moves a ceremony forward carries its cookies in
//! `Set-Cookie`; the bodies are what the browser WebAuthn API consumes.

use axum::{extract::State, http::HeaderMap, response::Response, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::request_origin;
use crate::error::ApiError;
use crate::handlers::{cookie_header, with_cookies};
use crate::state::AppState;

/// Credential JSON exactly as the browser produced it
#[derive(Debug, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CredentialJson(pub serde_json::Value);

/// Body of a successful verify call
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifiedResponse {
    pub verified: bool,
}

/// Get passkey registration options
///
/// Open when registration is enabled, or for callers whose edge assertion
/// carries the approved claim.
#[utoipa::path(
    get,
    path = "/api/auth/registration-options",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "PublicKeyCredentialCreationOptions; sets the challenge cookie"),
        (status = 403, description = "Registration closed")
    )
)]
pub async fn registration_options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let origin = request_origin(&headers, state.config.public_origin.as_deref());
    let approved = state.edge.approved(&headers).await;
    let user_id = &state.ceremonies.settings().user_id;

    let outcome = state
        .ceremonies
        .begin_registration(user_id, &origin, approved)
        .await?;
    Ok(with_cookies(Json(outcome.body), outcome.cookies))
}

/// Verify a registration response
#[utoipa::path(
    post,
    path = "/api/auth/verify-registration",
    tag = "WebAuthn",
    request_body(content = CredentialJson, description = "RegistrationResponseJSON from navigator.credentials.create()"),
    responses(
        (status = 200, description = "Passkey stored, session started", body = VerifiedResponse),
        (status = 400, description = "Invalid or expired challenge"),
        (status = 401, description = "Verification failed")
    )
)]
pub async fn verify_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(CredentialJson(response)): Json<CredentialJson>,
) -> Result<Response, ApiError> {
    let origin = request_origin(&headers, state.config.public_origin.as_deref());
    let user_id = &state.ceremonies.settings().user_id;

    let outcome = state
        .ceremonies
        .complete_registration(user_id, &response, cookie_header(&headers), &origin)
        .await?;
    Ok(with_cookies(Json(outcome.body), outcome.cookies))
}

/// Get passkey authentication options
#[utoipa::path(
    get,
    path = "/api/auth/authentication-options",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "PublicKeyCredentialRequestOptions; sets the challenge cookie")
    )
)]
pub async fn authentication_options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let origin = request_origin(&headers, state.config.public_origin.as_deref());
    let user_id = &state.ceremonies.settings().user_id;

    let outcome = state
        .ceremonies
        .begin_authentication(user_id, &origin)
        .await?;
    Ok(with_cookies(Json(outcome.body), outcome.cookies))
}

/// Verify an authentication assertion
#[utoipa::path(
    post,
    path = "/api/auth/verify-authentication",
    tag = "WebAuthn",
    request_body(content = CredentialJson, description = "AuthenticationResponseJSON from navigator.credentials.get()"),
    responses(
        (status = 200, description = "Session started", body = VerifiedResponse),
        (status = 400, description = "Invalid or expired challenge, or unknown credential"),
        (status = 401, description = "Verification failed")
    )
)]
pub async fn verify_authentication(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(CredentialJson(response)): Json<CredentialJson>,
) -> Result<Response, ApiError> {
    let origin = request_origin(&headers, state.config.public_origin.as_deref());

    let outcome = state
        .ceremonies
        .complete_authentication(&response, cookie_header(&headers), &origin)
        .await?;
    Ok(with_cookies(Json(outcome.body), outcome.cookies))
}
