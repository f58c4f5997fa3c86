//! Error taxonomy for the proactive core.
//!
//! Only [`ConfigError`] aborts anything (construction). Provider and observer
//! failures are absorbed by the control loop and surfaced as diagnostics.

use proactive_llm::LlmError;
use std::any::Any;
use thiserror::Error;

/// Invalid configuration, reported before the agent can start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("{lower} ({lower_value}) must not exceed {upper} ({upper_value})")]
    InvertedBounds {
        lower: &'static str,
        lower_value: String,
        upper: &'static str,
        upper_value: String,
    },

    #[error("malformed config: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { key: key.to_owned(), reason: reason.into() }
    }

    pub(crate) fn inverted(
        lower: &'static str,
        lower_value: impl ToString,
        upper: &'static str,
        upper_value: impl ToString,
    ) -> Self {
        Self::InvertedBounds {
            lower,
            lower_value: lower_value.to_string(),
            upper,
            upper_value: upper_value.to_string(),
        }
    }
}

/// Response generation failed. The cycle continues without a response.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("response generation timed out after {0}s")]
    Timeout(u64),

    #[error("provider returned an empty response")]
    Empty,

    #[error("response generator panicked: {0}")]
    Panicked(String),
}

/// An observer panicked while handling an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} observer #{id} failed: {message}")]
pub struct ObserverError {
    pub kind: crate::types::EventKind,
    pub id: u64,
    pub message: String,
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_owned()
    }
}
