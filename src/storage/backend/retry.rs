//! 数据库操作重试模块
//!
//! Transient failures (lost connection, deadlock, busy database) are
//! retried with jittered exponential backoff; every attempt runs under
//! its own deadline.

use sea_orm::DbErr;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::errors::{Result, ShortenerError};

/// Server error codes worth another attempt.
const TRANSIENT_CODES: &[(&str, &str)] = &[
    ("1213", "mysql deadlock"),
    ("1205", "mysql lock wait timeout"),
    ("40001", "postgres serialization failure"),
    ("40P01", "postgres deadlock"),
    ("5", "sqlite busy"),
    ("6", "sqlite locked"),
];

/// Fallback when the driver gives no code.
const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
];

/// 返回错误的瞬时原因；`None` 表示不应重试
pub fn transient_reason(err: &DbErr) -> Option<&'static str> {
    use sea_orm::error::RuntimeErr;

    let runtime = match err {
        DbErr::ConnectionAcquire(_) => return Some("pool exhausted"),
        DbErr::Conn(_) => return Some("connection lost"),
        DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return None,
    };

    let message = match runtime {
        RuntimeErr::SqlxError(sqlx_err) => {
            if let Some(code) = sqlx_err.as_database_error().and_then(|e| e.code()) {
                return TRANSIENT_CODES
                    .iter()
                    .find(|(c, _)| *c == code.as_ref())
                    .map(|(_, reason)| *reason);
            }
            sqlx_err.to_string()
        }
        RuntimeErr::Internal(msg) => msg.clone(),
        #[allow(unreachable_patterns)]
        _ => return None,
    };

    let message = message.to_lowercase();
    TRANSIENT_MESSAGES
        .iter()
        .find(|m| message.contains(*m))
        .copied()
}

pub fn is_retryable_error(err: &DbErr) -> bool {
    transient_reason(err).is_some()
}

/// 重试配置
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Deadline for a single attempt.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            timeout_ms: 10_000,
        }
    }
}

impl From<&StorageConfig> for RetryConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
            timeout_ms: config.timeout_ms,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based): doubling from the
    /// base, capped, plus up to 25% jitter.
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let doubled = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(32));
        let capped = doubled.min(self.max_delay_ms);
        capped.saturating_add(rand::random_range(0..=capped / 4))
    }
}

/// Runs `operation`, retrying transient errors and timeouts.
///
/// A timed-out attempt may still have been applied by the server; only
/// idempotent operations should be passed here.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        let deadline = Duration::from_millis(config.timeout_ms);
        let result = tokio::time::timeout(deadline, operation()).await;

        let reason = match result {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    debug!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                match transient_reason(&e) {
                    Some(reason) if attempt < config.max_retries => format!("{}: {}", reason, e),
                    _ => {
                        debug!("Operation '{}' failed: {}", operation_name, e);
                        return Err(e.into());
                    }
                }
            }
            Err(_elapsed) => {
                if attempt >= config.max_retries {
                    warn!(
                        "Operation '{}' timed out after {}ms, retries exhausted",
                        operation_name, config.timeout_ms
                    );
                    return Err(ShortenerError::timeout(format!(
                        "Operation '{}' timed out after {}ms",
                        operation_name, config.timeout_ms
                    )));
                }
                format!("timed out after {}ms", config.timeout_ms)
            }
        };

        attempt += 1;
        let delay = config.backoff_ms(attempt);
        warn!(
            "Operation '{}' failed (attempt {}/{}): {}; retrying in {} ms",
            operation_name,
            attempt,
            config.max_retries + 1,
            reason,
            delay
        );
        sleep(Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 10,
            max_delay_ms: 50,
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_transient_reasons() {
        let pool = DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout);
        assert_eq!(transient_reason(&pool), Some("pool exhausted"));

        let locked = DbErr::Query(sea_orm::error::RuntimeErr::Internal(
            "Database is LOCKED".to_string(),
        ));
        assert_eq!(transient_reason(&locked), Some("database is locked"));

        let missing = DbErr::RecordNotFound("not found".to_string());
        assert!(!is_retryable_error(&missing));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            timeout_ms: 1_000,
        };
        assert!((100..=125).contains(&config.backoff_ms(1)));
        assert!((200..=250).contains(&config.backoff_ms(2)));
        assert!((2000..=2500).contains(&config.backoff_ms(10)));
        assert!((2000..=2500).contains(&config.backoff_ms(80)));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retries() {
        let call_count = AtomicU32::new(0);

        let result = with_retry("test_op", fast_config(3), || {
            let count = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(DbErr::ConnectionAcquire(
                        sea_orm::error::ConnAcquireErr::Timeout,
                    ))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausted_maps_to_unreachable() {
        let call_count = AtomicU32::new(0);

        let result = with_retry("test_op", fast_config(2), || {
            call_count.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<i32, _>(DbErr::ConnectionAcquire(
                    sea_orm::error::ConnAcquireErr::Timeout,
                ))
            }
        })
        .await;

        assert!(matches!(result, Err(ShortenerError::BackendUnreachable(_))));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error_no_retry() {
        let call_count = AtomicU32::new(0);

        let result = with_retry("test_op", fast_config(3), || {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(DbErr::RecordNotFound("not found".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ShortenerError::DatabaseOperation(_))));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_deadline_surfaces_timeout() {
        let config = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_ms: 20,
        };

        let result: Result<i32> = with_retry("slow_op", config, || async {
            sleep(Duration::from_millis(500)).await;
            Ok(1)
        })
        .await;

        assert!(matches!(result, Err(ShortenerError::Timeout(_))));
    }
}
