use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::TransportError;
use crate::gateway::{Backend, GenerationResult, QueryResult, UploadResult};
use crate::upload::UploadFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first call. Zero means a single request.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return self.base_delay.min(self.max_delay);
        }

        let exp_shift = (retry - 1).min(30);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let raw_ms = base_ms.saturating_mul(1u64 << exp_shift);
        Duration::from_millis(raw_ms).min(self.max_delay)
    }
}

/// Wraps a backend and retries transient failures.
///
/// With the default policy every call goes straight through exactly once.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Backend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, TransportError>> + Send,
        T: Send,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Err(err) if retry < self.policy.max_retries && err.is_retryable() => {
                    retry += 1;
                    let delay = self.policy.backoff(retry);
                    info!(
                        operation = err.operation(),
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    async fn upload_document(
        &self,
        file: &UploadFile,
        user_id: &str,
    ) -> Result<UploadResult, TransportError> {
        self.run(|| self.inner.upload_document(file, user_id)).await
    }

    async fn process_query(
        &self,
        query: &str,
        user_id: &str,
    ) -> Result<QueryResult, TransportError> {
        self.run(|| self.inner.process_query(query, user_id)).await
    }

    async fn generate_text(
        &self,
        prompt: &str,
        max_length: u32,
    ) -> Result<GenerationResult, TransportError> {
        self.run(|| self.inner.generate_text(prompt, max_length)).await
    }
}
