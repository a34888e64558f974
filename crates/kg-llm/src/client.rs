use crate::error::Error;

/// A single prompt/response exchange. The trait intentionally knows nothing
/// about POIs or relationships — it is the "endpoint itself" contract named
/// as an external collaborator; all domain-specific retry/sanitization/
/// validation lives in `kg-workers` on top of it.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` and returns the raw, unsanitized text response.
    /// Implementations classify failures into [`Error`] so callers can tell
    /// a transient network error from the circuit being open.
    async fn complete(&self, prompt: &str) -> Result<String, Error>;
}

/// Config for [`RetryingClient`]'s backoff and circuit-breaker behavior,
/// sourced from the `LLM_RETRY_COUNT`/`LLM_BACKOFF_FACTOR` options in §6.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub initial_interval: std::time::Duration,
    /// Consecutive transient failures before the breaker opens.
    pub breaker_threshold: u32,
    pub breaker_cooldown: std::time::Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            initial_interval: std::time::Duration::from_millis(250),
            breaker_threshold: 5,
            breaker_cooldown: std::time::Duration::from_secs(30),
        }
    }
}

struct Breaker {
    consecutive_failures: std::sync::atomic::AtomicU32,
    opened_at: std::sync::Mutex<Option<std::time::Instant>>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
            opened_at: std::sync::Mutex::new(None),
        }
    }

    fn is_open(&self, cooldown: std::time::Duration) -> bool {
        let mut guard = self.opened_at.lock().unwrap();
        match *guard {
            Some(opened) if opened.elapsed() < cooldown => true,
            Some(_) => {
                *guard = None; // Cooldown elapsed; allow a trial request.
                false
            }
            None => false,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, std::sync::atomic::Ordering::SeqCst);
    }

    fn record_failure(&self, threshold: u32) {
        let failures = self
            .consecutive_failures
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if failures >= threshold {
            *self.opened_at.lock().unwrap() = Some(std::time::Instant::now());
        }
    }
}

/// Wraps an inner [`LlmClient`] with exponential-backoff retry and a
/// consecutive-failure circuit breaker. Every worker calls the LLM through
/// one of these rather than the raw client, so retry/breaker behavior is
/// uniform across file/directory/global passes.
pub struct RetryingClient<C> {
    inner: C,
    config: RetryConfig,
    breaker: Breaker,
}

impl<C: LlmClient> RetryingClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            breaker: Breaker::new(),
        }
    }

    #[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
    pub async fn complete(&self, prompt: &str) -> Result<String, Error> {
        if self.breaker.is_open(self.config.breaker_cooldown) {
            return Err(Error::CircuitOpen);
        }

        let mut attempt = 0u32;
        let mut interval = self.config.initial_interval;

        loop {
            match self.inner.complete(prompt).await {
                Ok(response) => {
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(err) if err.kind() == kg_core::Kind::Transient && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, ?err, "retrying LLM call after transient error");
                    tokio::time::sleep(interval).await;
                    interval = interval.mul_f64(self.config.backoff_factor);
                }
                Err(err) => {
                    if err.kind() == kg_core::Kind::Transient {
                        self.breaker.record_failure(self.config.breaker_threshold);
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<C: LlmClient> LlmClient for RetryingClient<C> {
    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        RetryingClient::complete(self, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures_remaining: AtomicU32,
    }

    #[async_trait::async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _prompt: &str) -> Result<String, Error> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(Error::Endpoint(anyhow::anyhow!("connection reset")))
            } else {
                Ok("{}".to_string())
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let client = RetryingClient::new(
            FlakyClient {
                failures_remaining: AtomicU32::new(2),
            },
            RetryConfig {
                initial_interval: std::time::Duration::from_millis(1),
                ..Default::default()
            },
        );

        let response = client.complete("hello").await.unwrap();
        assert_eq!(response, "{}");
    }

    #[tokio::test]
    async fn breaker_opens_after_consecutive_failures() {
        let client = RetryingClient::new(
            FlakyClient {
                failures_remaining: AtomicU32::new(u32::MAX),
            },
            RetryConfig {
                max_retries: 0,
                initial_interval: std::time::Duration::from_millis(1),
                breaker_threshold: 2,
                breaker_cooldown: std::time::Duration::from_secs(60),
                ..Default::default()
            },
        );

        assert!(client.complete("a").await.is_err());
        assert!(client.complete("b").await.is_err());

        match client.complete("c").await {
            Err(Error::CircuitOpen) => {}
            other => panic!("expected circuit to be open, got {other:?}"),
        }
    }
}
