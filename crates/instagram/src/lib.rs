use async_trait::async_trait;
use igrelay_core::channel::{Delivery, MessageResolver, MessageSender, CHANNEL_INSTAGRAM};
use igrelay_core::config::AppConfig;
use igrelay_core::types::MessagePair;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Instagram Messaging over the Graph API: fetches edited messages by id and
/// sends replies from the business account.
#[derive(Clone)]
pub struct GraphClient {
    access_token: Option<String>,
    business_id: Option<String>,
    api_base: String,
    client: Client,
}

impl GraphClient {
    pub fn new(
        access_token: Option<String>,
        business_id: Option<String>,
        api_base: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            business_id: business_id.filter(|id| !id.trim().is_empty()),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            config.page_access_token().map(str::to_string),
            config.ig_business_id().map(str::to_string),
            config.graph_api_base.clone(),
            Duration::from_secs(config.graph_timeout_secs),
        )
    }

    async fn fetch_message(&self, token: &str, mid: &str) -> anyhow::Result<Value> {
        let url = format!("{}/{}", self.api_base, mid);
        let resp = self
            .client
            .get(&url)
            .query(&[("fields", "message,from,to"), ("access_token", token)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Graph lookup returned {status}: {body}");
        }

        Ok(resp.json().await?)
    }
}

fn resolved_pair(body: &Value) -> Option<MessagePair> {
    let text = body
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();
    let sender = body
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() || sender.is_empty() {
        return None;
    }
    Some(MessagePair::new(sender, text))
}

#[async_trait]
impl MessageResolver for GraphClient {
    async fn resolve(&self, mid: &str) -> Option<MessagePair> {
        let Some(token) = self.access_token.as_deref() else {
            warn!(mid = %mid, "PAGE_ACCESS_TOKEN not set, cannot resolve edited message");
            return None;
        };

        match self.fetch_message(token, mid).await {
            Ok(body) => {
                let pair = resolved_pair(&body);
                if pair.is_none() {
                    debug!(mid = %mid, "Graph lookup returned no sender or text");
                }
                pair
            }
            Err(e) => {
                warn!(mid = %mid, error = %e, "Graph message lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl MessageSender for GraphClient {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Delivery {
        let (Some(token), Some(business_id)) =
            (self.access_token.as_deref(), self.business_id.as_deref())
        else {
            error!(
                channel = CHANNEL_INSTAGRAM,
                "PAGE_ACCESS_TOKEN or IG_BUSINESS_ID not set, reply not sent"
            );
            return Delivery::Skipped("missing Graph credentials".to_string());
        };

        let url = format!("{}/{}/messages", self.api_base, business_id);
        let payload = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
            "messaging_type": "RESPONSE"
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(&payload)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                info!(to = %recipient_id, "Instagram reply sent");
                Delivery::Sent
            }
            Ok(r) => {
                let status = r.status();
                let body = r.text().await.unwrap_or_default();
                error!(to = %recipient_id, %status, body = %body, "Instagram send failed");
                Delivery::Failed(format!("HTTP {status}"))
            }
            Err(e) => {
                error!(to = %recipient_id, error = %e, "Instagram send network error");
                Delivery::Failed(e.to_string())
            }
        }
    }
}
