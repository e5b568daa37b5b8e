pub mod factory;
pub mod google;
use async_trait::async_trait;

use thiserror::Error;

/// Sent when no AI key is configured.
pub const NOT_CONFIGURED_REPLY: &str =
    "Sorry, our assistant is not set up yet. A team member will get back to you soon.";

/// Sent when the AI service could not produce a reply.
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't come up with an answer right now. Please try again a bit later.";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// What the generator produced. A fallback still carries user-facing text, so
/// callers always have something to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Generated(String),
    Fallback { text: String, reason: String },
}

impl Reply {
    pub fn not_configured() -> Self {
        Reply::Fallback {
            text: NOT_CONFIGURED_REPLY.to_string(),
            reason: "AI API key not configured".to_string(),
        }
    }

    pub fn fallback(err: &ProviderError) -> Self {
        Reply::Fallback {
            text: FALLBACK_REPLY.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Reply::Generated(text) => text,
            Reply::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Reply::Fallback { .. })
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Never fails: upstream problems turn into `Reply::Fallback`.
    async fn generate(&self, user_text: &str) -> Reply;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_covers_both_variants() {
        assert_eq!(Reply::Generated("hi".into()).text(), "hi");
        assert_eq!(Reply::not_configured().text(), NOT_CONFIGURED_REPLY);

        let reply = Reply::fallback(&ProviderError::NetworkError("timed out".into()));
        assert!(reply.is_fallback());
        assert_eq!(reply.text(), FALLBACK_REPLY);
        assert_eq!(
            reply,
            Reply::Fallback {
                text: FALLBACK_REPLY.to_string(),
                reason: "Network error: timed out".to_string(),
            }
        );
    }
}
