//! Request and response types for LLM completion.

use crate::{Message, Role};
use serde::{Deserialize, Serialize};

/// Generation request sent to a completion driver.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(setter(into), default)]
pub struct GenerateRequest {
    /// Conversation messages, oldest first
    messages: Vec<Message>,
    /// Maximum output tokens
    max_tokens: Option<u32>,
    /// Sampling temperature
    temperature: Option<f32>,
    /// Model override
    model: Option<String>,
}

impl GenerateRequest {
    /// Returns a builder for constructing a GenerateRequest.
    pub fn builder() -> GenerateRequestBuilder {
        GenerateRequestBuilder::default()
    }

    /// Builds a request for a single prompt under the given options.
    pub fn from_prompt(prompt: &str, options: &CompletionOptions) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(Message::new(Role::System, system.clone()));
        }
        messages.push(Message::new(Role::User, prompt));
        Self {
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            model: options.model.clone(),
        }
    }

    /// Text of the last user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| *m.role() == Role::User)
            .map(|m| m.content().as_str())
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub input_tokens: u64,
    /// Tokens generated
    pub output_tokens: u64,
    /// Total tokens billed
    pub total_tokens: u64,
}

/// Text produced by a completion driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    pub text: String,
    /// Token accounting, when the provider reports it
    pub usage: Option<TokenUsage>,
}

impl GenerateResponse {
    /// Response carrying only text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Per-call options for a completion.
///
/// Model selection, output bound and the determinism knob travel with each
/// call rather than living on the driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model identifier; `None` uses the driver default
    pub model: Option<String>,
    /// Maximum output tokens
    pub max_tokens: Option<u32>,
    /// Sampling temperature (lower is more deterministic)
    pub temperature: Option<f32>,
    /// Optional system prompt
    pub system: Option<String>,
}

impl CompletionOptions {
    /// Returns a copy with the given temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Returns a copy with the given system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_prompt_places_system_first() {
        let options = CompletionOptions::default()
            .with_temperature(0.2)
            .with_system("You are an editor.");
        let request = GenerateRequest::from_prompt("Rate this idea.", &options);

        assert_eq!(request.messages().len(), 2);
        assert_eq!(*request.messages()[0].role(), Role::System);
        assert_eq!(request.last_user_text(), Some("Rate this idea."));
        assert_eq!(*request.temperature(), Some(0.2));
    }

    #[test]
    fn test_builder_defaults() {
        let request = GenerateRequest::builder()
            .messages(vec![Message::new(Role::User, "hi")])
            .build()
            .expect("valid request");
        assert!(request.max_tokens().is_none());
        assert!(request.model().is_none());
    }
}
