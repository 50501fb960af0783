//! HTTP client for `streamGenerateContent`.

use std::time::Duration;

use hisho_types::{ApiError, GenerateRequest};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::retry::{RetryConfig, backoff_delay, is_retryable};
use crate::stream::GenerationStream;
use crate::wire::GenerateContentBody;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the streaming `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }

    /// Start a streaming generation, retrying transient failures.
    ///
    /// Retries only cover establishing the stream; once events flow, errors
    /// are yielded by the stream.
    pub async fn stream_generate_content(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationStream, ApiError> {
        let url = self.endpoint(&request.model);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| ApiError::Auth {
                message: "API key contains invalid header characters".into(),
            })?,
        );

        let body = serde_json::to_string(&GenerateContentBody::from_request(request)).map_err(
            |e| ApiError::BadRequest {
                message: format!("Failed to serialize request: {e}"),
            },
        )?;

        let attempts = self.retry_config.max_retries + 1;
        let mut attempt = 0;
        loop {
            tracing::debug!("POST {url} (attempt {}/{attempts})", attempt + 1);

            let (err, retry_after) = match self
                .http
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return Ok(GenerationStream::new(response.bytes_stream()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = parse_retry_after(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    (classify_error(status, &body_text, retry_after), retry_after)
                }
                Err(e) if e.is_timeout() => (ApiError::Timeout, None),
                Err(e) => (ApiError::Network(e.to_string()), None),
            };

            if !is_retryable(&err) || attempt >= self.retry_config.max_retries {
                return Err(err);
            }

            let delay = backoff_delay(&self.retry_config, attempt, retry_after);
            tracing::warn!(
                "Generation request failed (attempt {}/{attempts}): {err}. Retrying in {delay}ms",
                attempt + 1,
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }
}

/// `Retry-After` in seconds (fractions allowed), as milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

/// Map an error response to an [`ApiError`].
fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        400 => ApiError::BadRequest { message },
        401 | 403 => ApiError::Auth { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after,
        },
        503 => ApiError::Overloaded,
        _ => ApiError::Server { status, message },
    }
}
