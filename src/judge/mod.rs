pub mod gemini;
pub mod prompt;

use async_trait::async_trait;

use crate::error::Result;

pub use gemini::{GeminiClient, GeminiLoader};

/// An image handed to the judge inline, alongside the prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub prompt: String,
    pub images: Vec<InlineImage>,
}

/// A multimodal model that answers a prompt about one or more images with free text.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: JudgeRequest) -> Result<String>;

    /// Judge name for logging.
    fn judge_name(&self) -> &str;
}
