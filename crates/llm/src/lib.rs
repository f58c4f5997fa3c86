//! Language-model provider boundary for the proactive agent.
//!
//! The core crate only sees [`provider::LlmProvider`]; concrete backends live
//! in [`http`].

pub mod http;
pub mod provider;

pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
