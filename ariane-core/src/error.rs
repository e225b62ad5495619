use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArianeError {
    /// Tampered, foreign or malformed token. Deliberately carries no detail.
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Challenge already used")]
    ChallengeReplayed,

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Counter regression: stored={stored}, received={received}")]
    CounterRegression { stored: u32, received: u32 },

    #[error("Ceremony rejected: {0}")]
    CeremonyRejected(String),

    #[error("Registration closed")]
    RegistrationClosed,

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ArianeError>;
