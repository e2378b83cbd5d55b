//! # ragserve-llm
//!
//! Language-model providers for ragserve.
//!
//! Providers implement [`ragserve_core::ChatModel`]:
//!
//! - [`OpenAiChat`]: OpenAI and Azure OpenAI chat completions
//! - [`AnthropicChat`]: the Anthropic messages API
//!
//! Both synthesize the retrieval system prompt the same way (see
//! [`prompt::synthesize_system_prompt`]) and decode token streams from SSE
//! into [`ragserve_core::StreamChunk`] frames with exactly one terminal
//! `done` frame.

pub mod anthropic;
pub mod openai;
pub mod prompt;
pub mod sse;

pub use anthropic::AnthropicChat;
pub use openai::OpenAiChat;
pub use prompt::{synthesize_system_prompt, BASE_SYSTEM_PROMPT};
