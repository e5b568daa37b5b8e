use crate::google::GeminiReplyGenerator;
use crate::{ProviderError, ReplyGenerator};
use igrelay_core::config::AppConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Create the reply generator from the application config. A missing API key
/// is not an error: the generator then answers with the not-configured reply.
pub fn create_reply_generator(
    config: &AppConfig,
) -> Result<Arc<dyn ReplyGenerator>, ProviderError> {
    let generator = GeminiReplyGenerator::from_config(config)?;
    if generator.is_configured() {
        info!(model = %config.gemini_model, "Gemini reply generator ready");
    } else {
        warn!("GEMINI_API_KEY not set; replies will use the not-configured message");
    }
    Ok(Arc::new(generator))
}
