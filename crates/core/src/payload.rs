//! Normalization of Instagram webhook payloads into `(sender_id, text)` pairs.
//!
//! Meta delivers direct messages in several shapes depending on the product and
//! API version. Each shape has its own extractor; `extract_items` runs all of
//! them over every entry, and `normalize` resolves edit references into pairs.
//! Nothing here fails: unknown or malformed parts of the payload are skipped.

use crate::channel::MessageResolver;
use crate::types::{InboundItem, MessagePair};
use serde_json::Value;
use tracing::debug;

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or_default()
}

fn string<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// `from` is `{"id": "..."}` on Instagram and a bare string on some legacy payloads.
fn sender_id(from: Option<&Value>) -> &str {
    match from {
        Some(Value::String(id)) => id.trim(),
        Some(obj) => string(obj, "id").trim(),
        None => "",
    }
}

/// Shape (a): `messaging[].message.text` with `sender.id`.
pub fn inline_message(item: &Value) -> Option<InboundItem> {
    let message = item.get("message")?;
    if message.get("is_echo").and_then(|v| v.as_bool()) == Some(true) {
        return None;
    }

    let text = string(message, "text").trim();
    if text.is_empty() {
        return None;
    }

    let sender = sender_id(item.get("sender"));
    if sender.is_empty() {
        return None;
    }

    Some(InboundItem::InlineMessage(MessagePair::new(sender, text)))
}

/// Shape (b): `messaging[].message_edit.mid`, the text has to be fetched.
pub fn edit_reference(item: &Value) -> Option<InboundItem> {
    let mid = item
        .get("message_edit")
        .map(|edit| string(edit, "mid").trim())
        .unwrap_or_default();
    if mid.is_empty() {
        return None;
    }

    Some(InboundItem::EditReference {
        mid: mid.to_string(),
    })
}

/// Shape (c): `changes[].value.messages[]`, text as `{"body": ...}` or a plain string.
pub fn change_messages(change: &Value) -> Vec<InboundItem> {
    let Some(value) = change.get("value") else {
        return Vec::new();
    };
    let fallback_sender = sender_id(value.get("from"));

    array(value, "messages")
        .iter()
        .filter_map(|msg| {
            let sender = match sender_id(msg.get("from")) {
                "" => fallback_sender,
                id => id,
            };

            let text = match msg.get("text") {
                Some(Value::String(text)) => text.trim(),
                Some(obj) => string(obj, "body").trim(),
                None => "",
            };

            if sender.is_empty() || text.is_empty() {
                return None;
            }
            Some(InboundItem::ChangeMessage(MessagePair::new(sender, text)))
        })
        .collect()
}

/// Every recognized item in the payload, in encounter order.
pub fn extract_items(payload: &Value) -> Vec<InboundItem> {
    let mut items = Vec::new();

    for entry in array(payload, "entry") {
        for item in array(entry, "messaging") {
            items.extend(inline_message(item));
            items.extend(edit_reference(item));
        }
        for change in array(entry, "changes") {
            items.extend(change_messages(change));
        }
    }

    items
}

/// Extract all message pairs, resolving edit references through `resolver`.
/// Unresolvable edits are dropped.
pub async fn normalize(payload: &Value, resolver: &dyn MessageResolver) -> Vec<MessagePair> {
    let mut pairs = Vec::new();

    for item in extract_items(payload) {
        match item {
            InboundItem::InlineMessage(pair) | InboundItem::ChangeMessage(pair) => pairs.push(pair),
            InboundItem::EditReference { mid } => match resolver.resolve(&mid).await {
                Some(pair) => pairs.push(pair),
                None => debug!(mid = %mid, "edited message could not be resolved, skipping"),
            },
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeResolver {
        known: HashMap<String, MessagePair>,
    }

    impl FakeResolver {
        fn with(mid: &str, sender: &str, text: &str) -> Self {
            let mut known = HashMap::new();
            known.insert(mid.to_string(), MessagePair::new(sender, text));
            Self { known }
        }

        fn empty() -> Self {
            Self {
                known: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl MessageResolver for FakeResolver {
        async fn resolve(&self, mid: &str) -> Option<MessagePair> {
            self.known.get(mid).cloned()
        }
    }

    #[test]
    fn inline_messages_keep_encounter_order_across_entries() {
        let payload = json!({
            "entry": [
                {"messaging": [
                    {"sender": {"id": "1"}, "message": {"text": "first"}},
                    {"sender": {"id": "2"}, "message": {"text": "second"}}
                ]},
                {"messaging": [
                    {"sender": {"id": "1"}, "message": {"text": "third"}}
                ]}
            ]
        });

        let items = extract_items(&payload);
        assert_eq!(
            items,
            vec![
                InboundItem::InlineMessage(MessagePair::new("1", "first")),
                InboundItem::InlineMessage(MessagePair::new("2", "second")),
                InboundItem::InlineMessage(MessagePair::new("1", "third")),
            ]
        );
    }

    #[test]
    fn duplicate_messages_are_not_collapsed() {
        let item = json!({"sender": {"id": "7"}, "message": {"text": "hi"}});
        let payload = json!({"entry": [{"messaging": [item.clone(), item]}]});
        assert_eq!(extract_items(&payload).len(), 2);
    }

    #[test]
    fn inline_text_is_trimmed_and_blank_text_skipped() {
        let payload = json!({
            "entry": [{"messaging": [
                {"sender": {"id": "1"}, "message": {"text": "  hello \n"}},
                {"sender": {"id": "1"}, "message": {"text": "   "}},
                {"sender": {"id": "1"}, "message": {"attachments": [{"type": "image"}]}}
            ]}]
        });
        assert_eq!(
            extract_items(&payload),
            vec![InboundItem::InlineMessage(MessagePair::new("1", "hello"))]
        );
    }

    #[test]
    fn echoes_of_own_messages_are_skipped() {
        let item = json!({
            "sender": {"id": "business"},
            "message": {"text": "our reply", "is_echo": true}
        });
        assert!(inline_message(&item).is_none());
    }

    #[test]
    fn edit_reference_requires_mid() {
        assert_eq!(
            edit_reference(&json!({"message_edit": {"mid": "m_1"}})),
            Some(InboundItem::EditReference { mid: "m_1".into() })
        );
        assert!(edit_reference(&json!({"message_edit": {}})).is_none());
        assert!(edit_reference(&json!({"message_edit": {"mid": 42}})).is_none());
    }

    #[test]
    fn change_messages_accept_body_and_plain_text() {
        let change = json!({
            "value": {
                "messages": [
                    {"from": {"id": "10"}, "text": {"body": "with body"}},
                    {"from": {"id": "11"}, "text": "plain"}
                ]
            }
        });
        assert_eq!(
            change_messages(&change),
            vec![
                InboundItem::ChangeMessage(MessagePair::new("10", "with body")),
                InboundItem::ChangeMessage(MessagePair::new("11", "plain")),
            ]
        );
    }

    #[test]
    fn change_messages_fall_back_to_value_sender() {
        let change = json!({
            "value": {
                "from": {"id": "outer"},
                "messages": [
                    {"text": "no sender"},
                    {"from": {"id": ""}, "text": "blank sender"},
                    {"from": "inner", "text": "string sender"}
                ]
            }
        });
        assert_eq!(
            change_messages(&change),
            vec![
                InboundItem::ChangeMessage(MessagePair::new("outer", "no sender")),
                InboundItem::ChangeMessage(MessagePair::new("outer", "blank sender")),
                InboundItem::ChangeMessage(MessagePair::new("inner", "string sender")),
            ]
        );
    }

    #[test]
    fn change_messages_skip_missing_sender_or_text() {
        let change = json!({
            "value": {"messages": [
                {"text": "nobody"},
                {"from": {"id": "5"}, "text": {"body": ""}},
                {"from": {"id": "5"}}
            ]}
        });
        assert!(change_messages(&change).is_empty());
    }

    #[test]
    fn malformed_payloads_yield_nothing() {
        let cases = [
            json!(null),
            json!([]),
            json!("entry"),
            json!({}),
            json!({"entry": "not a list"}),
            json!({"entry": [1, "two", null]}),
            json!({"entry": [{"messaging": {"sender": {"id": "1"}}}]}),
            json!({"entry": [{"messaging": [{"message": {"text": "no sender"}}]}]}),
            json!({"entry": [{"messaging": [{"sender": "1", "message": "text"}]}]}),
            json!({"entry": [{"changes": [{"value": []}, {"field": "comments"}]}]}),
            json!({"entry": [{"messaging": [{"sender": {"id": "1"}, "read": {"mid": "m"}}]}]}),
        ];
        for payload in cases {
            assert!(extract_items(&payload).is_empty(), "payload: {payload}");
        }
    }

    #[test]
    fn all_shapes_in_one_entry_are_emitted() {
        let payload = json!({
            "entry": [{
                "messaging": [
                    {"sender": {"id": "1"}, "message": {"text": "inline"}},
                    {"sender": {"id": "1"}, "message_edit": {"mid": "m_edit"}}
                ],
                "changes": [
                    {"value": {"messages": [{"from": {"id": "2"}, "text": "legacy"}]}}
                ]
            }]
        });
        assert_eq!(
            extract_items(&payload),
            vec![
                InboundItem::InlineMessage(MessagePair::new("1", "inline")),
                InboundItem::EditReference { mid: "m_edit".into() },
                InboundItem::ChangeMessage(MessagePair::new("2", "legacy")),
            ]
        );
    }

    #[tokio::test]
    async fn normalize_resolves_edits_in_place() {
        let payload = json!({
            "entry": [{"messaging": [
                {"sender": {"id": "1"}, "message": {"text": "before"}},
                {"sender": {"id": "1"}, "message_edit": {"mid": "m_1"}},
                {"sender": {"id": "1"}, "message": {"text": "after"}}
            ]}]
        });
        let resolver = FakeResolver::with("m_1", "1", "edited");

        let pairs = normalize(&payload, &resolver).await;
        assert_eq!(
            pairs,
            vec![
                MessagePair::new("1", "before"),
                MessagePair::new("1", "edited"),
                MessagePair::new("1", "after"),
            ]
        );
    }

    #[tokio::test]
    async fn normalize_drops_unresolved_edits() {
        let payload = json!({
            "entry": [{"messaging": [{"sender": {"id": "1"}, "message_edit": {"mid": "gone"}}]}]
        });
        assert!(normalize(&payload, &FakeResolver::empty()).await.is_empty());
    }
}
