//! Travel assistant: the three things the app asks of the model.
//!
//! Each operation has a typed `try_*` form and a fallback form used by the
//! pages. Fallbacks never fail; they log the cause and flag the model as
//! unhealthy so `/health` and the logs show what went wrong.

use std::sync::Arc;

use crate::health::{COMPONENT_AI, HealthRegistry};
use crate::providers::{AiError, Provider};
use crate::session::ChatTurn;

pub const FACTS_PROMPT: &str = "Give 5 fun and short travel facts. Keep them within 25 words each.";
pub const FALLBACK_FACT: &str = "Traveling opens the mind more than any book ever could.";
pub const CHAT_FALLBACK: &str = "AI is currently unavailable. Please try again.";
pub const PLAN_FALLBACK: &str = "Sorry, I couldn't generate the itinerary. Please try again.";

/// Text shown to the user, either from the model or a canned fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Generated(String),
    Fallback(&'static str),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Fallback(text) => text,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }
}

/// A validated trip request. Fields are trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItineraryRequest {
    pub destination: String,
    pub days: String,
    pub interests: String,
}

impl ItineraryRequest {
    /// `None` when any field is missing or blank.
    pub fn new(destination: &str, days: &str, interests: &str) -> Option<Self> {
        let destination = destination.trim();
        let days = days.trim();
        let interests = interests.trim();
        if destination.is_empty() || days.is_empty() || interests.is_empty() {
            return None;
        }
        Some(Self {
            destination: destination.to_string(),
            days: days.to_string(),
            interests: interests.to_string(),
        })
    }

    pub fn prompt(&self) -> String {
        format!(
            "Create a {}-day itinerary for {} focusing on {}. \
             Include sightseeing, local experiences, and food recommendations.",
            self.days, self.destination, self.interests
        )
    }
}

pub struct TravelAssistant {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    health: Arc<HealthRegistry>,
}

impl TravelAssistant {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f64,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            health,
        }
    }

    async fn ask(&self, history: &[ChatTurn], message: &str) -> Result<String, AiError> {
        let result = self
            .provider
            .chat_with_history(history, message, &self.model, self.temperature)
            .await;
        match &result {
            Ok(_) => self.health.mark_component_ok(COMPONENT_AI),
            Err(e) => self.health.mark_component_error(COMPONENT_AI, e),
        }
        result
    }

    // ── Facts ────────────────────────────────────────────────────

    pub async fn try_facts(&self) -> Result<Vec<String>, AiError> {
        let text = self.ask(&[], FACTS_PROMPT).await?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Facts for the dashboard. Never fails.
    pub async fn generate_facts(&self) -> Vec<String> {
        match self.try_facts().await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), "travel facts unavailable: {e}");
                vec![FALLBACK_FACT.to_string()]
            }
        }
    }

    // ── Chat ─────────────────────────────────────────────────────

    pub async fn try_chat(&self, history: &[ChatTurn], message: &str) -> Result<String, AiError> {
        let reply = self.ask(history, message).await?;
        Ok(reply.trim().to_string())
    }

    pub async fn chat(&self, history: &[ChatTurn], message: &str) -> Reply {
        match self.try_chat(history, message).await {
            Ok(reply) => Reply::Generated(reply),
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    transient = e.is_transient(),
                    "chat reply unavailable: {e}"
                );
                Reply::Fallback(CHAT_FALLBACK)
            }
        }
    }

    // ── Itinerary ────────────────────────────────────────────────

    pub async fn try_plan(&self, request: &ItineraryRequest) -> Result<String, AiError> {
        let text = self.ask(&[], &request.prompt()).await?;
        Ok(text.trim().to_string())
    }

    pub async fn plan(&self, request: &ItineraryRequest) -> Reply {
        match self.try_plan(request).await {
            Ok(plan) => Reply::Generated(plan),
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    destination = %request.destination,
                    "itinerary unavailable: {e}"
                );
                Reply::Fallback(PLAN_FALLBACK)
            }
        }
    }
}
