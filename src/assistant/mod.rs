//! Assistant gateway abstraction.
//!
//! The hub talks to the external text-generation service through the
//! [`AssistantGateway`] trait so the transport and room logic never depend
//! on a concrete provider.

mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{GeminiConfig, GeminiGateway};

/// Errors reported by the assistant gateway.
///
/// `Unavailable` is the only retryable class; `RateLimited` and `Other`
/// are terminal for the request that triggered them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("quota exceeded, try again later")]
    RateLimited,

    #[error("the assistant is temporarily unavailable")]
    Unavailable,

    #[error("{0}")]
    Other(String),
}

/// External text-generation service.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Generate a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, AssistantError>;
}
