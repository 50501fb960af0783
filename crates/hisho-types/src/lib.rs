//! Shared conversation types, SSE parsing and error hierarchy for Hisho.

pub mod error;
pub mod message;
pub mod provider;
pub mod sse;

pub use error::{ApiError, ConfigError, HishoError};
pub use message::*;
