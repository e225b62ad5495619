//! GitHub OAuth login
//!
//! The PKCE verifier is never stored: the signed `state` carries everything
//! the callback needs to re-derive it.

pub mod github;
pub mod handlers;

pub use github::{GitHubApi, GitHubEmail, GitHubUser, HttpGitHubApi};
pub use handlers::{github_callback, github_start, CallbackQuery, StartQuery};
