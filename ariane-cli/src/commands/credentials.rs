//! Read-only view of the JSON credential store.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::debug;

use ariane_core::{CredentialDocument, StoredCredential};

use crate::utils::abbreviate;

/// Default store location, shared with the server.
pub const DEFAULT_STORE_PATH: &str = ".data/webauthn.json";

fn load(path: &Path) -> Result<CredentialDocument> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read credential store: {}", path.display()))?;
    let document: CredentialDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse credential store: {}", path.display()))?;
    debug!(path = %path.display(), count = document.credentials.len(), "Loaded credential store");
    Ok(document)
}

pub fn list(path: &Path, user: Option<&str>, json: bool) -> Result<()> {
    let document = load(path)?;
    let credentials: Vec<&StoredCredential> = document
        .credentials
        .iter()
        .filter(|c| user.map_or(true, |u| c.user_id == u))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&credentials)?);
        return Ok(());
    }

    if credentials.is_empty() {
        println!("{}", "No credentials stored".dimmed());
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:>8}  {}",
        "ID".bold(),
        "USER".bold(),
        "COUNTER".bold(),
        "TRANSPORTS".bold()
    );
    for credential in &credentials {
        let transports = credential
            .transports
            .as_ref()
            .map(|t| t.join(","))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<12} {:>8}  {}",
            abbreviate(&credential.id, 24),
            abbreviate(&credential.user_id, 12),
            credential.counter,
            transports
        );
    }
    println!();
    println!("{} credential(s)", credentials.len());
    Ok(())
}
