//! The execute-once gate.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use common::Clock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use store::{IdempotencyRecord, IdempotencyStatus, IdempotencyStore, StoreError};
use thiserror::Error;

/// Default row TTL. The store purges expired rows; anything at or above
/// 24 hours satisfies replay windows seen in practice.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Errors from gated execution.
#[derive(Debug, Error)]
pub enum IdempotencyError<E: std::error::Error + 'static> {
    /// Another caller holds the live execution for this key.
    #[error("Concurrent execution in progress for key {key}")]
    ConcurrentInProgress { key: String },

    /// The idempotency store failed.
    #[error("Idempotency store error: {0}")]
    Store(#[from] StoreError),

    /// The cached or fresh result could not be (de)serialized.
    #[error("Result serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The gated operation itself failed; the row is marked FAILED and the
    /// key may be retried.
    #[error(transparent)]
    Operation(E),
}

/// Gates side-effectful closures by a stable key.
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl IdempotencyService {
    /// Creates a service with the default TTL.
    pub fn new(store: Arc<dyn IdempotencyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, ttl: Duration::days(DEFAULT_TTL_DAYS) }
    }

    /// Overrides the row TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Runs `f` at most once per `key`.
    ///
    /// A completed row replays the cached result without invoking `f`; a
    /// live row fails with `ConcurrentInProgress`; a failed row is taken
    /// over and retried. `f` must be deterministic enough that its cached
    /// result is acceptable to later callers.
    #[tracing::instrument(skip(self, f))]
    pub async fn execute_once<T, E, F, Fut>(
        &self,
        key: &str,
        operation: &str,
        f: F,
    ) -> Result<T, IdempotencyError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: std::error::Error + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(row) = self.store.get(key).await?
            && row.status == IdempotencyStatus::Completed
        {
            tracing::debug!(key, "returning cached result");
            return Self::decode_cached(row);
        }

        let now = self.clock.now();
        let record = IdempotencyRecord {
            key: key.to_string(),
            operation: operation.to_string(),
            status: IdempotencyStatus::InProgress,
            result: None,
            created_at: now,
            expires_at: (now + self.ttl).timestamp(),
        };

        match self.store.insert_new(&record).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => match self.store.get(key).await? {
                Some(row) if row.status == IdempotencyStatus::Completed => {
                    tracing::debug!(key, "lost the insert race to a completed execution");
                    return Self::decode_cached(row);
                }
                Some(row) if row.status == IdempotencyStatus::InProgress => {
                    return Err(IdempotencyError::ConcurrentInProgress { key: key.to_string() });
                }
                Some(_) => {
                    // FAILED: take the row over for a retry.
                    self.store.mark(key, IdempotencyStatus::InProgress, None).await?;
                }
                // Expired between the failed insert and the re-read.
                None => self.store.insert_new(&record).await?,
            },
            Err(e) => return Err(e.into()),
        }

        match f().await {
            Ok(value) => {
                let cached = serde_json::to_value(&value)?;
                self.store.mark(key, IdempotencyStatus::Completed, Some(cached)).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(mark_err) =
                    self.store.mark(key, IdempotencyStatus::Failed, None).await
                {
                    tracing::warn!(key, error = %mark_err, "could not record failed execution");
                }
                Err(IdempotencyError::Operation(e))
            }
        }
    }

    fn decode_cached<T, E>(row: IdempotencyRecord) -> Result<T, IdempotencyError<E>>
    where
        T: DeserializeOwned,
        E: std::error::Error + 'static,
    {
        let value = row.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use store::MemoryBackend;

    #[derive(Debug, Error)]
    #[error("step failed: {0}")]
    struct StepError(String);

    fn service(clock: Arc<ManualClock>) -> (IdempotencyService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        (IdempotencyService::new(backend.clone(), clock), backend)
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::starting_at(Utc::now()))
    }

    #[tokio::test]
    async fn second_call_replays_cached_result() {
        let (service, _) = service(manual_clock());
        let calls = AtomicU32::new(0);

        for expected in ["first", "first"] {
            let result: Result<String, IdempotencyError<StepError>> = service
                .execute_once("order:O1:step", "step", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("first".to_string()) }
                })
                .await;
            assert_eq!(result.unwrap(), expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn live_execution_locks_out_concurrent_callers() {
        let clock = manual_clock();
        let (service, backend) = service(clock.clone());

        // A crashed worker left the row IN_PROGRESS.
        let record = IdempotencyRecord {
            key: "order:O1:step".into(),
            operation: "step".into(),
            status: IdempotencyStatus::InProgress,
            result: None,
            created_at: clock.now(),
            expires_at: (clock.now() + Duration::days(7)).timestamp(),
        };
        backend.insert_new(&record).await.unwrap();

        let result: Result<String, IdempotencyError<StepError>> = service
            .execute_once("order:O1:step", "step", || async {
                Ok("unreachable".to_string())
            })
            .await;
        assert!(matches!(
            result.unwrap_err(),
            IdempotencyError::ConcurrentInProgress { .. }
        ));
    }

    #[tokio::test]
    async fn failed_attempts_are_retryable() {
        let (service, _) = service(manual_clock());
        let calls = AtomicU32::new(0);

        let first: Result<String, IdempotencyError<StepError>> = service
            .execute_once("order:O1:step", "step", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StepError("boom".into())) }
            })
            .await;
        assert!(matches!(first.unwrap_err(), IdempotencyError::Operation(_)));

        let second: Result<String, IdempotencyError<StepError>> = service
            .execute_once("order:O1:step", "step", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("recovered".to_string()) }
            })
            .await;
        assert_eq!(second.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_rows_allow_reexecution() {
        let clock = manual_clock();
        let (service, _) = service(clock.clone());
        let calls = AtomicU32::new(0);

        let run = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StepError>(calls.load(Ordering::SeqCst)) }
        };
        let first: u32 = service.execute_once("k", "op", run).await.unwrap();
        assert_eq!(first, 1);

        clock.advance(Duration::days(8));
        let second: u32 = service.execute_once("k", "op", run).await.unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn unit_results_are_cacheable() {
        let (service, _) = service(manual_clock());
        let first: Result<(), IdempotencyError<StepError>> =
            service.execute_once("k", "op", || async { Ok(()) }).await;
        first.unwrap();

        let replay: Result<(), IdempotencyError<StepError>> = service
            .execute_once("k", "op", || async {
                panic!("must not re-run");
            })
            .await;
        replay.unwrap();
    }
}
