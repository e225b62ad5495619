//! Raw signed-token commands.
//!
//! Tokens produced here are byte-compatible with the server and the Wasm
//! signer: `base64url(payload).base64url(hmac)`.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use crate::utils::{read_arg, require_secret};

/// Sign a payload and print the token.
pub fn sign(payload: &str, secret: Option<&str>) -> Result<()> {
    let secret = require_secret(secret)?;
    let payload = read_arg(payload)?;

    let token = ariane_core::sign(payload.as_bytes(), secret).context("Signing failed")?;
    debug!(bytes = payload.len(), "Signed payload");

    println!("{}", token.encode());
    Ok(())
}

/// Verify a token and print its payload.
pub fn verify(token: &str, secret: Option<&str>, quiet: bool) -> Result<()> {
    let secret = require_secret(secret)?;
    let token = read_arg(token)?;

    let payload =
        ariane_core::verify(token.trim(), secret).context("Token verification failed")?;
    info!(bytes = payload.len(), "Token verified");

    let text = String::from_utf8_lossy(&payload);
    if quiet {
        println!("{text}");
        return Ok(());
    }

    println!("{} {}", "Signature:".dimmed(), "Valid (HMAC-SHA256)".green());
    // Pretty-print JSON payloads, show anything else verbatim
    match serde_json::from_slice::<serde_json::Value>(&payload) {
        Ok(json) => println!(
            "{}\n{}",
            "Payload:".dimmed(),
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.to_string())
        ),
        Err(_) => println!("{} {text}", "Payload:".dimmed()),
    }
    Ok(())
}
