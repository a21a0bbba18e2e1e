use async_trait::async_trait;

use crate::session::ChatTurn;

/// Failure talking to a generative model.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no API key configured for the model provider")]
    MissingApiKey,
    #[error("model request timed out")]
    Timeout,
    #[error("model provider unreachable: {0}")]
    Transport(reqwest::Error),
    #[error("model API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("model API error: {0}")]
    Api(String),
    #[error("model returned no text")]
    EmptyResponse,
}

impl AiError {
    /// Worth retrying later (network trouble, throttling, upstream 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey | Self::Api(_) | Self::EmptyResponse => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Single-turn text generation.
    async fn chat(&self, message: &str, model: &str, temperature: f64) -> Result<String, AiError> {
        self.chat_with_history(&[], message, model, temperature)
            .await
    }

    /// Generation with prior turns as conversation context. `history` is
    /// oldest-first and does not include `message`.
    async fn chat_with_history(
        &self,
        history: &[ChatTurn],
        message: &str,
        model: &str,
        temperature: f64,
    ) -> Result<String, AiError>;

    /// Short provider name for logs and diagnostics.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(AiError::Timeout.is_transient());
        assert!(
            AiError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            AiError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!AiError::MissingApiKey.is_transient());
        assert!(!AiError::EmptyResponse.is_transient());
        assert!(
            !AiError::Status {
                status: 400,
                body: "bad key".into()
            }
            .is_transient()
        );
    }
}
