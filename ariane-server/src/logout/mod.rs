//! Logout orchestration
//!
//! Local cookies are cleared synchronously; IdP sessions are revoked through
//! a [`SessionRevoker`], either in the background (`/signout`) or awaited
//! (`/slo`).

mod chain;
pub mod handlers;
pub mod id_token;
mod revoker;

pub use chain::{LogoutBranch, LogoutChain, LogoutPlan};
pub use handlers::{logout, signout, single_logout, SloResponse};
pub use revoker::{RevocationTally, ServiceAccountRevoker, SessionRevoker, SERVICE_SCOPE};
