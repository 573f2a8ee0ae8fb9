//! AI collaborator for leadflow workflows.
//!
//! The workflow engine's `ai_processor` nodes never talk to a model
//! provider directly. They build an [`AiRequest`] and hand it to an
//! [`AiInvoker`]; errors come back classified so the engine's retry policy
//! can tell a flaky provider from a bad request.
//!
//! - **Invoker**: the `invoke({instruction, context, model}) -> text` seam
//! - **OpenAI-compatible client**: a reqwest-backed chat completions invoker

pub mod error;
pub mod invoker;
pub mod openai;

pub use error::AiError;
pub use invoker::{AiInvoker, AiRequest};
pub use openai::{OpenAiConfig, OpenAiInvoker};
