use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use igrelay_core::channel::{Delivery, MessageResolver, MessageSender};
use igrelay_core::payload::normalize;
use igrelay_core::types::MessagePair;
use igrelay_providers::ReplyGenerator;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024;
/// Longest the webhook waits for replies before acknowledging anyway.
const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

/// Everything a request handler needs. Read-only and cheap to clone.
#[derive(Clone)]
pub struct AppState {
    verify_token: Arc<str>,
    generator: Arc<dyn ReplyGenerator>,
    resolver: Arc<dyn MessageResolver>,
    sender: Arc<dyn MessageSender>,
    ack_deadline: Duration,
}

impl AppState {
    pub fn new(
        verify_token: impl Into<String>,
        generator: Arc<dyn ReplyGenerator>,
        resolver: Arc<dyn MessageResolver>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            verify_token: Arc::from(verify_token.into()),
            generator,
            resolver,
            sender,
            ack_deadline: DEFAULT_ACK_DEADLINE,
        }
    }

    pub fn with_ack_deadline(mut self, deadline: Duration) -> Self {
        self.ack_deadline = deadline;
        self
    }
}

pub struct Gateway {
    state: AppState,
    bind_address: String,
    port: u16,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
    version: &'static str,
}

impl Gateway {
    pub fn new(state: AppState, bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
            port,
        }
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state);

        let listener = TcpListener::bind((self.bind_address.as_str(), self.port)).await?;
        info!("Webhook gateway listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Webhook gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "IG webhook",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Returns the challenge to echo back when the subscription request is valid.
pub fn verify_subscription<'a>(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&'a str>,
    expected_token: &str,
) -> Option<&'a str> {
    if mode != Some("subscribe") || token != Some(expected_token) {
        return None;
    }
    challenge.filter(|c| !c.is_empty())
}

/// Value of the last occurrence of `key`; repeated keys do not reject the query.
fn last_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

// A query that fails to decode is treated like a wrong token.
async fn verify_webhook(
    State(state): State<AppState>,
    query: Option<Query<Vec<(String, String)>>>,
) -> (StatusCode, String) {
    let Some(Query(params)) = query else {
        warn!("webhook verification with undecodable query");
        return (StatusCode::FORBIDDEN, "forbidden".to_string());
    };
    let mode = last_param(&params, "hub.mode");

    match verify_subscription(
        mode,
        last_param(&params, "hub.verify_token"),
        last_param(&params, "hub.challenge"),
        &state.verify_token,
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge.to_string())
        }
        None => {
            warn!(mode = ?mode, "webhook verification rejected");
            (StatusCode::FORBIDDEN, "forbidden".to_string())
        }
    }
}

async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "bad json" })),
            );
        }
    };
    debug!(payload = %payload, "incoming webhook");

    let pairs = normalize(&payload, state.resolver.as_ref()).await;
    if pairs.is_empty() {
        debug!("webhook carried no messages");
        return (StatusCode::OK, Json(json!({ "status": "ignored" })));
    }

    let count = pairs.len();
    info!(count, "processing inbound messages");
    let batch = tokio::spawn(reply_to_all(
        state.generator.clone(),
        state.sender.clone(),
        pairs,
    ));
    // Past the deadline the batch keeps running detached.
    if tokio::time::timeout(state.ack_deadline, batch).await.is_err() {
        warn!(
            count,
            deadline_ms = state.ack_deadline.as_millis() as u64,
            "replies still in flight, acknowledging webhook"
        );
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Handles pairs in order, each in its own task so a panic stays contained.
async fn reply_to_all(
    generator: Arc<dyn ReplyGenerator>,
    sender: Arc<dyn MessageSender>,
    pairs: Vec<MessagePair>,
) {
    for pair in pairs {
        let sender_id = pair.sender_id.clone();
        let task = tokio::spawn(reply_to(generator.clone(), sender.clone(), pair));
        if let Err(e) = task.await {
            error!(sender_id = %sender_id, error = %e, "processing message failed");
        }
    }
}

async fn reply_to(
    generator: Arc<dyn ReplyGenerator>,
    sender: Arc<dyn MessageSender>,
    pair: MessagePair,
) -> Delivery {
    let reply = generator.generate(&pair.text).await;
    let delivery = sender.send_text(&pair.sender_id, reply.text()).await;

    let reply_kind = if reply.is_fallback() { "fallback" } else { "generated" };
    info!(
        target: "audit",
        sender_id = %pair.sender_id,
        reply = reply_kind,
        delivery = %delivery,
        "instagram message handled"
    );
    delivery
}
