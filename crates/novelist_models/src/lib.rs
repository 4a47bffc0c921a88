//! LLM provider integrations for Novelist.
//!
//! The only provider shipped is a client for OpenAI-compatible chat
//! completion endpoints, which covers hosted services as well as local
//! servers such as llama.cpp, vLLM and Ollama's compatibility layer.

mod openai_compat;

pub use openai_compat::{ChatMessage, ChatRequest, ChatResponse, OpenAICompatibleClient};
