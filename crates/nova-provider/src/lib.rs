//! Boundary to the external generative-text provider.
//!
//! The rest of the workspace only sees [`ChatProvider`]; the HTTP adapter
//! lives in [`completions`].

pub mod completions;

use nova_types::models::ContextEntry;
use serde::{Deserialize, Serialize};

pub use completions::{CompletionsProvider, ProviderConfig};

/// Sampling parameters, forwarded to the provider unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            presence_penalty: 0.0,
            frequency_penalty: 1.0,
        }
    }
}

/// Everything the provider needs for one turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ContextEntry>,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Source URLs, when the provider returns them.
    pub citations: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Malformed(String),

    #[error("provider is not configured: {0}")]
    Config(String),
}

impl ProviderError {
    /// Transport failures and 5xx answers may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Malformed(_) | Self::Config(_) => false,
        }
    }
}

#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}
