use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::info;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

fn client() -> Result<Client> {
    Ok(Client::builder().timeout(VERIFY_TIMEOUT).build()?)
}

/// Verify a Gemini API key by making a minimal generateContent request.
pub async fn verify_gemini_key(api_base: &str, model: &str, api_key: &str) -> Result<String> {
    let url = format!(
        "{}/models/{}:generateContent",
        api_base.trim_end_matches('/'),
        model
    );
    let body = json!({
        "contents": [{"role": "user", "parts": [{"text": "Say 'ok' in one word"}]}]
    });

    let res = client()?
        .post(&url)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await?;
    let status = res.status();

    if status.is_success() {
        Ok(format!("✅ Gemini API key is valid for {} (HTTP {})", model, status))
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "❌ Gemini API key verification failed (HTTP {}): {}",
            status,
            body.chars().take(200).collect::<String>()
        ))
    }
}

/// Verify a page access token via the Graph `/me` endpoint.
pub async fn verify_page_token(api_base: &str, token: &str) -> Result<String> {
    let url = format!("{}/me", api_base.trim_end_matches('/'));

    let res = client()?
        .get(&url)
        .query(&[("fields", "id,name"), ("access_token", token)])
        .send()
        .await?;

    if res.status().is_success() {
        let data: serde_json::Value = res.json().await?;
        let name = data["name"].as_str().unwrap_or("unknown");
        let id = data["id"].as_str().unwrap_or("unknown");
        info!("Graph token verified: {} ({})", name, id);
        Ok(format!("✅ Page access token verified: {} ({})", name, id))
    } else {
        Err(anyhow::anyhow!(
            "❌ Invalid page access token (HTTP {})",
            res.status()
        ))
    }
}
