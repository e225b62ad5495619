//! Per-request access decisions
//!
//! - `policy`: which paths are checked and under which mode
//! - `origin`: the caller-facing origin behind proxies
//! - `edge`: edge proxy assertion verification
//! - `middleware`: the axum gate that ties them together

pub mod edge;
mod middleware;
pub mod origin;
pub mod policy;

pub use edge::{EdgeClaims, EdgeError, EdgeVerifier};
pub use middleware::access_gate;
pub(crate) use middleware::{edge_email, session_caller};
pub use origin::{request_host, request_origin};

use serde::Serialize;

/// Who vouched for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    Edge,
    Session,
    Anonymous,
}

/// Request extension set by [`access_gate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub trust: Trust,
    pub subject: Option<String>,
    pub email: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            trust: Trust::Anonymous,
            subject: None,
            email: None,
        }
    }

    pub fn edge(subject: Option<String>, email: Option<String>) -> Self {
        Self {
            trust: Trust::Edge,
            subject,
            email,
        }
    }

    pub fn session(subject: String, email: Option<String>) -> Self {
        Self {
            trust: Trust::Session,
            subject: Some(subject),
            email,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.trust != Trust::Anonymous
    }
}
