//! Common utility functions shared across CLI commands.

use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};

/// The signing secret, or an error naming the variable that supplies it.
pub fn require_secret(secret: Option<&str>) -> Result<&[u8]> {
    match secret {
        Some(s) if !s.is_empty() => Ok(s.as_bytes()),
        _ => bail!("SESSION_SECRET is not set (pass --secret or export SESSION_SECRET)"),
    }
}

/// Use the argument as-is, or read stdin when it is `-`.
pub fn read_arg(value: &str) -> Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

/// Format a Unix timestamp (milliseconds) as a human-readable UTC string.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) as i64;
    let nsecs = ((timestamp_ms % 1000) * 1_000_000) as u32;
    match Utc.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("{}ms", timestamp_ms),
    }
}

/// Shorten a long identifier for table output.
pub fn abbreviate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let head: String = value.chars().take(max.saturating_sub(1)).collect();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_secret() {
        assert_eq!(require_secret(Some("abc")).unwrap(), b"abc");
        assert!(require_secret(Some("")).is_err());
        let err = require_secret(None).unwrap_err();
        assert!(err.to_string().contains("SESSION_SECRET"));
    }

    #[test]
    fn test_format_timestamp() {
        // 2024-01-15 12:30:45.123 UTC
        let formatted = format_timestamp(1705321845123);
        assert!(formatted.contains("2024-01-15"));
        assert!(formatted.contains("UTC"));
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10), "short");
        assert_eq!(abbreviate("abcdefghijkl", 6), "abcde…");
    }
}
