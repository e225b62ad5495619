//! OAuth state inspection.

use anyhow::{Context, Result};
use colored::Colorize;

use ariane_core::decode_state;

use crate::utils::{format_timestamp, read_arg, require_secret};

/// Verify an OAuth `state` value and show what the callback would recover.
pub fn decode(state: &str, secret: Option<&str>, show_verifier: bool) -> Result<()> {
    let secret = require_secret(secret)?;
    let state = read_arg(state)?;

    let decoded = decode_state(state.trim(), secret).context("State verification failed")?;

    println!("{} {}", "Redirect:".dimmed(), decoded.redirect);
    println!("{} {}", "CSRF id:".dimmed(), decoded.csrf);
    println!("{} {}", "Issued:".dimmed(), format_timestamp(decoded.iat));
    if show_verifier {
        println!("{} {}", "PKCE verifier:".dimmed(), decoded.code_verifier.yellow());
    }
    Ok(())
}
