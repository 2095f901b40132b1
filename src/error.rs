//! Error types for the Ada agent

use thiserror::Error;

/// Result type alias for Ada operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Ada agent
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, bad endpoints)
    ///
    /// Only raised at startup, never mid-session
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Reasoning (LLM) error
    #[error("reasoning error: {0}")]
    Reasoning(String),

    /// Room transport error
    #[error("room error: {0}")]
    Room(String),

    /// Timer service error
    #[error("timer error: {0}")]
    Timer(String),

    /// Session lifecycle error
    #[error("session error: {0}")]
    Session(String),

    /// Access token error
    #[error("auth error: {0}")]
    Auth(String),

    /// Tool registration error
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JWT encoding error
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    /// Whether this is a collaborator failure worth retrying
    ///
    /// Speech, reasoning and synthesis failures (and the HTTP errors beneath
    /// them) are transient; everything else is not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Stt(_) | Self::Tts(_) | Self::Reasoning(_) | Self::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_transient() {
        assert!(Error::Stt("timeout".into()).is_transient());
        assert!(Error::Tts("503".into()).is_transient());
        assert!(Error::Reasoning("rate limited".into()).is_transient());
    }

    #[test]
    fn config_errors_are_fatal() {
        assert!(!Error::Config("missing key".into()).is_transient());
        assert!(!Error::Room("closed".into()).is_transient());
    }
}
