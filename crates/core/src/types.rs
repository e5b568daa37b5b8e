/// A normalized inbound message: who wrote it and what they said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePair {
    pub sender_id: String,
    pub text: String,
}

impl MessagePair {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
        }
    }
}

/// One recognized webhook shape, before any network lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundItem {
    /// `entry[].messaging[].message.text`
    InlineMessage(MessagePair),
    /// `entry[].messaging[].message_edit.mid`, text must be fetched.
    EditReference { mid: String },
    /// `entry[].changes[].value.messages[]`
    ChangeMessage(MessagePair),
}
