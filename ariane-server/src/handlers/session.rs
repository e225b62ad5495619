//! Session and approval checks used by the site's client scripts.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::access::session_caller;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalStatusResponse {
    pub approved: bool,
}

/// Whether the request carries a valid, unexpired session
#[utoipa::path(
    get,
    path = "/api/auth/session",
    tag = "Session",
    responses(
        (status = 200, description = "Session state", body = SessionResponse)
    )
)]
pub async fn session(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionResponse> {
    let authenticated = session_caller(&headers, state.config.session_secret.as_bytes()).is_some();
    Json(SessionResponse { authenticated })
}

/// Whether the edge assertion carries the approved claim
#[utoipa::path(
    get,
    path = "/api/auth/approval-status",
    tag = "Session",
    responses(
        (status = 200, description = "Approval state; false when there is no valid assertion", body = ApprovalStatusResponse)
    )
)]
pub async fn approval_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ApprovalStatusResponse> {
    let approved = state.edge.approved(&headers).await;
    Json(ApprovalStatusResponse { approved })
}
