//! Bounded retry for transient remote failures.
//!
//! Both remote systems get the same treatment: a fixed pause between
//! attempts and a small attempt budget. Only errors the caller classifies as
//! transient are retried.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::kind::EntityKind;
use crate::sync::{EventCallback, MigrationEvent, emit};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Default pause between attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Configuration for retry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Pause between attempts.
    pub delay: Duration,
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retries: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(delay: Duration, max_retries: usize) -> Self {
        Self { delay, max_retries }
    }

    /// Build a constant backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_retries)
    }
}

/// What a retried operation is working on, for events and logs.
#[derive(Debug, Clone, Copy)]
pub struct RetryTarget<'a> {
    pub kind: EntityKind,
    pub source_id: &'a str,
}

/// Execute an operation, retrying errors that `is_transient` accepts.
///
/// Each backoff is reported as [`MigrationEvent::RetryBackoff`] and logged at
/// debug level. The final error is returned unchanged once the budget is spent.
///
/// # Example
///
/// ```ignore
/// let id = with_retry(
///     || target.create_project(&payload),
///     RemoteError::is_transient,
///     &RetryConfig::default(),
///     RetryTarget { kind: EntityKind::Projects, source_id: "OPS" },
///     on_event,
/// )
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut, IsTransient>(
    mut operation: F,
    is_transient: IsTransient,
    config: &RetryConfig,
    target: RetryTarget<'_>,
    on_event: Option<&EventCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
    IsTransient: Fn(&E) -> bool,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.clone().into_backoff())
        .notify(|err, dur| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            emit(
                on_event,
                MigrationEvent::RetryBackoff {
                    kind: target.kind,
                    source_id: target.source_id.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                    error: err.to_string(),
                },
            );
            tracing::debug!(
                "Transient failure on {} {}, retrying in {:?} (attempt {}): {}",
                target.kind,
                target.source_id,
                dur,
                current_attempt,
                err
            );
        })
        .when(is_transient)
        .await
}
