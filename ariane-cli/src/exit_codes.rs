//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a bad token apart from a missing file or a missing secret.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Bad signature, expired token or malformed document.
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Signing secret missing.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
#[derive(Debug)]
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify error by inspecting the chain
        let code = if message.contains("SESSION_SECRET") {
            CONFIG_ERROR
        } else if message.contains("Failed to read") {
            INPUT_ERROR
        } else if message.contains("verification failed") || message.contains("Failed to parse") {
            DATA_ERROR
        } else if message.contains("Invalid argument") {
            USAGE_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_classification() {
        let cases = [
            (anyhow!("SESSION_SECRET is not set"), CONFIG_ERROR),
            (anyhow!("Failed to read credential store: x"), INPUT_ERROR),
            (anyhow!("Token verification failed"), DATA_ERROR),
            (anyhow!("Failed to parse credential store"), DATA_ERROR),
            (anyhow!("Invalid argument: ttl"), USAGE_ERROR),
            (anyhow!("something else"), GENERAL_ERROR),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from_anyhow(&err).code, code, "{err}");
        }
    }

    #[test]
    fn test_context_chain_is_kept() {
        let err = anyhow!("invalid signature").context("Session verification failed");
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, DATA_ERROR);
        assert_eq!(
            exit.message.as_deref(),
            Some("Session verification failed: invalid signature")
        );
    }
}
