use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_VERIFY_TOKEN: &str = "apiapimeta";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant answering Instagram direct \
messages on behalf of a small business. Reply in the language of the customer, keep answers short \
(two or three sentences), stay polite, and never invent prices or availability you were not told.";

/// Process-wide settings. Built once at startup and handed to each component
/// by value; nothing reads the environment after this point.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Secret Meta echoes back in `hub.verify_token` during subscription.
    #[serde(default = "default_verify_token")]
    pub verify_token: String,
    #[serde(default)]
    pub page_access_token: Option<String>,
    /// Instagram professional account id replies are sent from.
    #[serde(default)]
    pub ig_business_id: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    #[serde(default = "default_graph_timeout_secs")]
    pub graph_timeout_secs: u64,
    #[serde(default = "default_gemini_timeout_secs")]
    pub gemini_timeout_secs: u64,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for the daily-rolling audit log. Disabled when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_verify_token() -> String {
    DEFAULT_VERIFY_TOKEN.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_graph_timeout_secs() -> u64 {
    15
}

fn default_gemini_timeout_secs() -> u64 {
    20
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verify_token: default_verify_token(),
            page_access_token: None,
            ig_business_id: None,
            gemini_api_key: None,
            system_prompt: default_system_prompt(),
            gemini_model: default_gemini_model(),
            gemini_api_base: default_gemini_api_base(),
            graph_api_base: default_graph_api_base(),
            graph_timeout_secs: default_graph_timeout_secs(),
            gemini_timeout_secs: default_gemini_timeout_secs(),
            bind_address: default_bind_address(),
            port: default_port(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from an optional config file, overridden by environment variables
    /// (`VERIFY_TOKEN`, `PAGE_ACCESS_TOKEN`, `IG_BUSINESS_ID`, `GEMINI_API_KEY`, ...).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = custom_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let s = builder
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        Self::from_config(s)
    }

    pub fn from_config(source: Config) -> Result<Self, ConfigError> {
        let mut config: AppConfig = source.try_deserialize()?;
        if config.verify_token.trim().is_empty() {
            config.verify_token = default_verify_token();
        }
        Ok(config)
    }

    pub fn page_access_token(&self) -> Option<&str> {
        non_empty(&self.page_access_token)
    }

    pub fn ig_business_id(&self) -> Option<&str> {
        non_empty(&self.ig_business_id)
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        non_empty(&self.gemini_api_key)
    }

    /// Names of optional settings that are missing, each of which disables a
    /// feature (resolving edits, sending replies, generating replies).
    pub fn readiness(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.page_access_token().is_none() {
            missing.push("PAGE_ACCESS_TOKEN");
        }
        if self.ig_business_id().is_none() {
            missing.push("IG_BUSINESS_ID");
        }
        if self.gemini_api_key().is_none() {
            missing.push("GEMINI_API_KEY");
        }
        missing
    }
}

/// Mask a secret for display: first 4 and last 4 chars, `****` in between.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}
