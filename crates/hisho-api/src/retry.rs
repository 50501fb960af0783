//! Backoff policy for transient generation failures.

use hisho_types::ApiError;
use rand::Rng;

/// How failed generation requests are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

/// Rate limits, overload, 5xx, network failures and timeouts are transient.
pub fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Overloaded
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

/// Delay before retry number `attempt` (0-based).
///
/// A server-provided `Retry-After` wins, capped at `max_delay_ms`. Otherwise
/// `initial_delay_ms * backoff_factor^attempt`, jittered by up to 25% either
/// way so concurrent clients spread out.
pub fn backoff_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
    if let Some(server_delay) = retry_after_ms {
        return server_delay.min(config.max_delay_ms);
    }

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = (config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent))
        .min(config.max_delay_ms as f64);
    let jitter = rand::rng().random_range(0.75..=1.25);

    ((base * jitter) as u64).min(config.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_retryable(&ApiError::RateLimited {
            retry_after_ms: None
        }));
        assert!(is_retryable(&ApiError::Overloaded));
        assert!(is_retryable(&ApiError::Server {
            status: 500,
            message: String::new(),
        }));
        assert!(is_retryable(&ApiError::Network("reset".into())));
        assert!(is_retryable(&ApiError::Timeout));
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!is_retryable(&ApiError::Auth {
            message: "API key not valid".into()
        }));
        assert!(!is_retryable(&ApiError::BadRequest {
            message: "bad schema".into()
        }));
        assert!(!is_retryable(&ApiError::StreamParse("x".into())));
    }

    #[test]
    fn delay_grows_exponentially_within_jitter() {
        let config = config();
        for (attempt, (lo, hi)) in [(750, 1250), (1500, 2500), (3000, 5000)]
            .into_iter()
            .enumerate()
        {
            let delay = backoff_delay(&config, attempt as u32, None);
            assert!((lo..=hi).contains(&delay), "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn retry_after_is_honoured_and_capped() {
        let config = RetryConfig {
            max_delay_ms: 10_000,
            ..config()
        };
        assert_eq!(backoff_delay(&config, 0, Some(2_000)), 2_000);
        assert_eq!(backoff_delay(&config, 0, Some(45_000)), 10_000);
    }

    #[test]
    fn delay_never_exceeds_max() {
        let config = RetryConfig {
            max_delay_ms: 5_000,
            backoff_factor: 10.0,
            ..config()
        };
        assert!(backoff_delay(&config, 8, None) <= 5_000);
    }
}
