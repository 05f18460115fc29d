use crate::ErrorKind;
use crate::PlatformError;
use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use fiware_config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How failed platform requests are retried
///
/// `Transient` errors are retried till `max_attempts` requests have been sent.
/// `Conflict` errors are only retried when `retry_conflicts` is set,
/// i.e. while a resource is being deleted then recreated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub retry_conflicts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_interval: config.initial_interval,
            multiplier: config.multiplier,
            max_interval: config.max_interval,
            retry_conflicts: false,
        }
    }
}

impl RetryPolicy {
    /// A policy sending each request exactly once
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }

    /// The same policy, also retrying on conflicts
    pub fn retrying_conflicts(self) -> Self {
        RetryPolicy {
            retry_conflicts: true,
            ..self
        }
    }

    pub fn is_retryable(&self, err: &PlatformError) -> bool {
        match err.kind() {
            ErrorKind::Transient => true,
            ErrorKind::Conflict => self.retry_conflicts,
            ErrorKind::NotFound | ErrorKind::Fatal => false,
        }
    }

    fn backoff(&self) -> BoundedBackoff {
        BoundedBackoff {
            inner: ExponentialBackoff {
                current_interval: self.initial_interval,
                initial_interval: self.initial_interval,
                multiplier: self.multiplier,
                max_interval: self.max_interval,
                randomization_factor: 0.1,
                max_elapsed_time: None,
                ..ExponentialBackoff::default()
            },
            max_attempts: self.max_attempts.max(1),
            attempts: 1,
        }
    }

    /// Run an operation under this policy
    ///
    /// Retries are only logged: the error is returned once all attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let policy = *self;
        let attempt = || {
            let response = request();
            async move {
                response.await.map_err(|err| {
                    if policy.is_retryable(&err) {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::Permanent(err)
                    }
                })
            }
        };

        retry_notify(self.backoff(), attempt, |err, delay: Duration| {
            warn!("{operation}: {err}. Retrying in {delay:?}")
        })
        .await
    }
}

/// An exponential backoff giving up after a number of attempts
struct BoundedBackoff {
    inner: ExponentialBackoff,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff for BoundedBackoff {
    fn reset(&mut self) {
        self.inner.reset();
        self.attempts = 1;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.inner.next_backoff()
    }
}
