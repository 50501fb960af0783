//! Gemini-style `streamGenerateContent` client with function calling.

mod client;
mod provider;
mod retry;
mod stream;
mod wire;

pub use client::{DEFAULT_BASE_URL, GeminiClient};
pub use provider::GeminiProvider;
pub use retry::RetryConfig;
pub use stream::GenerationStream;
