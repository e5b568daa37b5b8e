use super::{ProviderError, Reply, ReplyGenerator};
use async_trait::async_trait;
use igrelay_core::config::AppConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Reply generator backed by Gemini's `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiReplyGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
    system_prompt: String,
}

#[derive(Serialize)]
struct GoogleContent {
    role: String,
    parts: Vec<GooglePart>,
}

#[derive(Serialize)]
struct GooglePart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Option<Vec<GoogleCandidate>>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContentPart>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleContentPart {
    parts: Option<Vec<GoogleResponsePart>>,
}

#[derive(Deserialize)]
struct GoogleResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GoogleError {
    code: i32,
    message: String,
}

impl GeminiReplyGenerator {
    pub fn new(
        api_key: Option<String>,
        model: String,
        api_base: String,
        system_prompt: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            api_base,
            system_prompt,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.gemini_api_key().map(str::to_string),
            config.gemini_model.clone(),
            config.gemini_api_base.clone(),
            config.system_prompt.clone(),
            Duration::from_secs(config.gemini_timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn prompt(&self, user_text: &str) -> String {
        format!("{}\n\nUser: {}", self.system_prompt.trim(), user_text)
    }

    async fn complete(&self, api_key: &str, user_text: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );

        let contents = vec![GoogleContent {
            role: "user".to_string(),
            parts: vec![GooglePart {
                text: self.prompt(user_text),
            }],
        }];

        let body = json!({
            "contents": contents,
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let google_resp: GoogleResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Serialization Error: {}", e)))?;

        if let Some(error) = google_resp.error {
            return Err(ProviderError::ApiError(format!(
                "Gemini Error {}: {}",
                error.code, error.message
            )));
        }

        let candidate = google_resp
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::ApiError("No candidates returned".to_string()))?;

        let text = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.as_ref())
            .and_then(|p| p.first())
            .and_then(|p| p.text.as_deref())
            .map(str::trim)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::ApiError(format!(
                "Empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text.to_string())
    }
}

#[async_trait]
impl ReplyGenerator for GeminiReplyGenerator {
    async fn generate(&self, user_text: &str) -> Reply {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("GEMINI_API_KEY is not set, sending the not-configured reply");
            return Reply::not_configured();
        };

        match self.complete(api_key, user_text).await {
            Ok(text) => Reply::Generated(text),
            Err(e) => {
                warn!(model = %self.model, error = %e, "Gemini completion failed, using fallback reply");
                Reply::fallback(&e)
            }
        }
    }
}
