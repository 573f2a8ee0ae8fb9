//! The AI invocation seam.
//!
//! An `ai_processor` node resolves its instruction and context, then calls
//! [`AiInvoker::invoke`]. Implementations own provider selection, auth and
//! transport; the engine owns retries.

use crate::error::AiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A request to the AI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    /// The instruction, already template-resolved.
    pub instruction: String,
    /// The data slice the instruction operates on.
    pub context: JsonValue,
    /// Model identifier.
    pub model: String,
}

impl AiRequest {
    /// Creates a new request with no context.
    #[must_use]
    pub fn new(instruction: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            context: JsonValue::Null,
            model: model.into(),
        }
    }

    /// Attaches context data.
    #[must_use]
    pub fn with_context(mut self, context: JsonValue) -> Self {
        self.context = context;
        self
    }

    /// Renders the user message sent to a chat model.
    ///
    /// The context is appended as pretty-printed JSON, or verbatim when it
    /// is already a string.
    #[must_use]
    pub fn user_message(&self) -> String {
        match &self.context {
            JsonValue::Null => self.instruction.clone(),
            JsonValue::String(text) if text.is_empty() => self.instruction.clone(),
            JsonValue::String(text) => format!("{}\n\nContext:\n{}", self.instruction, text),
            other => {
                let rendered =
                    serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
                format!("{}\n\nContext:\n{}", self.instruction, rendered)
            }
        }
    }
}

/// Trait for AI collaborators.
#[async_trait]
pub trait AiInvoker: Send + Sync {
    /// Runs the instruction and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns a classified [`AiError`] if the call fails.
    async fn invoke(&self, request: &AiRequest) -> Result<String, AiError>;
}
