pub mod gemini;
pub mod traits;

pub use traits::{AiError, Provider};

use crate::config::AiConfig;
use std::sync::Arc;
use std::time::Duration;

/// Factory: create the right provider from config.
pub fn create_provider(config: &AiConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider.as_str() {
        "gemini" | "google" | "google-gemini" => Ok(Arc::new(gemini::GeminiProvider::new(
            config.api_key.as_deref(),
            timeout,
        ))),
        other => anyhow::bail!("Unknown provider: {other}. Supported: gemini"),
    }
}
