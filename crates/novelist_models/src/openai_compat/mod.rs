//! Generic OpenAI-compatible API client.
//!
//! Any API following the OpenAI chat completions format can be driven
//! through this module.

mod client;
mod conversions;
mod dto;

pub use client::OpenAICompatibleClient;
pub use dto::{ChatMessage, ChatRequest, ChatResponse};
