//! Session cookie commands.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::info;

use ariane_core::{mint_session, now_millis, verify_json, SessionPayload, SESSION_COOKIE};

use crate::utils::{format_timestamp, read_arg, require_secret};

/// Options for a minted session.
pub struct MintOptions {
    pub sub: String,
    pub ttl_secs: u64,
    pub email: Option<String>,
    pub provider: Option<String>,
    pub login: Option<String>,
    /// Print `session=<token>` ready for a `Cookie` header
    pub cookie: bool,
}

pub fn mint(options: MintOptions, secret: Option<&str>) -> Result<()> {
    let secret = require_secret(secret)?;
    if options.ttl_secs == 0 {
        bail!("Invalid argument: --ttl must be greater than zero");
    }

    let mut payload = SessionPayload::new(options.sub, now_millis(), options.ttl_secs);
    if let Some(email) = options.email {
        payload = payload.with_email(email);
    }
    if let Some(provider) = options.provider {
        payload = payload.with_provider(provider);
    }
    if let Some(login) = options.login {
        payload = payload.with_login(login);
    }

    let token = mint_session(&payload, secret).context("Failed to mint session")?;
    info!(sub = %payload.sub, ttl_secs = options.ttl_secs, "Minted session");

    if options.cookie {
        println!("{SESSION_COOKIE}={token}");
    } else {
        println!("{token}");
    }
    Ok(())
}

pub fn inspect(token: &str, secret: Option<&str>, quiet: bool) -> Result<()> {
    let secret = require_secret(secret)?;
    let token = read_arg(token)?;
    let token = token
        .trim()
        .strip_prefix(&format!("{SESSION_COOKIE}="))
        .unwrap_or(token.trim())
        .to_string();

    // Check the signature first so an expired session can still be shown
    let session: SessionPayload =
        verify_json(&token, secret).context("Session verification failed")?;
    let now = now_millis();
    let expired = session.is_expired_at(now);

    if quiet {
        println!("{}", serde_json::to_string(&session)?);
    } else {
        println!("{} {}", "Subject:".dimmed(), session.sub);
        if let Some(email) = &session.email {
            println!("{} {email}", "Email:".dimmed());
        }
        if let Some(provider) = &session.provider {
            println!("{} {provider}", "Provider:".dimmed());
        }
        if let Some(login) = &session.login {
            println!("{} {login}", "Login:".dimmed());
        }
        println!("{} {}", "Issued:".dimmed(), format_timestamp(session.iat));
        println!("{} {}", "Expires:".dimmed(), format_timestamp(session.exp));
        let status = if expired {
            "EXPIRED".red().bold()
        } else {
            "ACTIVE".green().bold()
        };
        println!("{} {status}", "Status:".dimmed());
    }

    if expired {
        bail!(
            "Session verification failed: expired at {}",
            format_timestamp(session.exp)
        );
    }
    Ok(())
}
