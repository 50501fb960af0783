//! [`Provider`] implementation over [`GeminiClient`].

use crate::client::GeminiClient;
use crate::retry::RetryConfig;
use hisho_types::provider::{EventStream, Provider};
use hisho_types::{ApiError, GenerateRequest};
use std::future::Future;
use std::pin::Pin;

/// Generation provider backed by the `generateContent` API.
#[derive(Clone)]
pub struct GeminiProvider {
    client: GeminiClient,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: GeminiClient::new(api_key, base_url)?,
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }
}

impl Provider for GeminiProvider {
    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let stream = self.client.stream_generate_content(request).await?;
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn usable_as_dyn_provider() {
        let provider: Arc<dyn Provider> =
            Arc::new(GeminiProvider::new("test-key", "https://example.com").unwrap());
        assert_eq!(provider.name(), "gemini");
    }
}
