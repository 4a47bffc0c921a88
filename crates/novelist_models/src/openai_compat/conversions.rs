//! Type conversions between Novelist and OpenAI formats.

use crate::openai_compat::{ChatMessage, ChatRequest, ChatResponse};
use novelist_core::{GenerateRequest, GenerateResponse, Role, TokenUsage};
use novelist_error::{CompletionError, CompletionErrorKind};

/// Converts a GenerateRequest to OpenAI chat format.
///
/// The request's model override wins over the client default.
pub fn to_chat_request(
    req: &GenerateRequest,
    default_model: &str,
) -> Result<ChatRequest, CompletionError> {
    let messages = req
        .messages()
        .iter()
        .map(|msg| ChatMessage {
            role: match msg.role() {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            }
            .to_string(),
            content: Some(msg.content().clone()),
        })
        .collect::<Vec<_>>();

    let model = req.model().as_deref().unwrap_or(default_model);

    let mut builder = ChatRequest::builder();
    builder.model(model.to_string()).messages(messages);

    if let Some(max_tokens) = req.max_tokens() {
        builder.max_tokens(*max_tokens);
    }

    if let Some(temp) = req.temperature() {
        builder.temperature(*temp);
    }

    builder.build().map_err(|e| {
        CompletionError::new(CompletionErrorKind::MalformedResponse(format!(
            "Failed to build request: {}",
            e
        )))
    })
}

/// Converts an OpenAI chat response to a GenerateResponse.
///
/// A response without choices or with empty content is malformed, which the
/// retry layer treats as transient.
pub fn from_chat_response(response: &ChatResponse) -> Result<GenerateResponse, CompletionError> {
    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            CompletionError::new(CompletionErrorKind::MalformedResponse(
                "No content in response choices".to_string(),
            ))
        })?;

    let usage = response.usage.as_ref().and_then(|u| {
        match (u.prompt_tokens, u.completion_tokens, u.total_tokens) {
            (Some(input), Some(output), Some(total)) => Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: total,
            }),
            _ => None,
        }
    });

    Ok(GenerateResponse {
        text: content,
        usage,
    })
}
