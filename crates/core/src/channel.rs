use crate::types::MessagePair;
use async_trait::async_trait;
use std::fmt;

pub const CHANNEL_INSTAGRAM: &str = "instagram";

/// Looks up the content of a message that the webhook only referenced by id.
#[async_trait]
pub trait MessageResolver: Send + Sync {
    /// Returns `None` when the message cannot be resolved for any reason
    /// (missing credentials, upstream failure, empty fields).
    async fn resolve(&self, mid: &str) -> Option<MessagePair>;
}

/// Delivers a text reply to a platform user. Best-effort: the outcome is
/// reported for logging, never raised.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Delivery;
}

/// Outcome of a single outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Nothing was attempted, e.g. credentials are not configured.
    Skipped(String),
    /// The upstream call was attempted and did not succeed.
    Failed(String),
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Sent => write!(f, "sent"),
            Delivery::Skipped(reason) => write!(f, "skipped: {reason}"),
            Delivery::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Resolver for deployments without Graph credentials; every lookup misses.
pub struct NoopResolver;

#[async_trait]
impl MessageResolver for NoopResolver {
    async fn resolve(&self, _mid: &str) -> Option<MessagePair> {
        None
    }
}
