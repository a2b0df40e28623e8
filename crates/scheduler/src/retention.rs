//! `RetentionSweeper` (C13): one daily INTERVAL job deleting Message,
//! PollResponse and CheckIn rows past each user's retention window.
//! Grounded in the legacy `retention_sweeper.py`, with the Message/
//! PollResponse join paths kept explicitly distinct in `RetentionStore`
//! (the source's conflated-join bug, fixed by construction here).

use std::sync::Arc;

use async_trait::async_trait;

use accord_domain::{Clock, DomainError, RetentionStore, Schedule};

use crate::runtime::{JobCallback, JobContext, RuntimeScheduler};

const RETENTION_JOB: &str = "retention_sweep";
const SWEEP_INTERVAL_SECONDS: u64 = 86_400;

pub struct RetentionSweeper<C: Clock, R: RetentionStore> {
    runtime: Arc<RuntimeScheduler<C>>,
    retention_store: Arc<R>,
    clock: Arc<C>,
}

impl<C: Clock, R: RetentionStore + 'static> RetentionSweeper<C, R> {
    pub fn new(runtime: Arc<RuntimeScheduler<C>>, retention_store: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            runtime,
            retention_store,
            clock,
        }
    }

    pub async fn install(&self) -> Result<(), DomainError> {
        let callback: Arc<dyn JobCallback> = Arc::new(RetentionJob {
            retention_store: self.retention_store.clone(),
            clock: self.clock.clone(),
        });
        self.runtime
            .schedule(
                RETENTION_JOB.to_string(),
                Schedule::Interval {
                    interval_seconds: SWEEP_INTERVAL_SECONDS,
                },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
    }
}

struct RetentionJob<C: Clock, R: RetentionStore> {
    retention_store: Arc<R>,
    clock: Arc<C>,
}

#[async_trait]
impl<C: Clock, R: RetentionStore> JobCallback for RetentionJob<C, R> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let now = self.clock.now_wall();
        let users = self.retention_store.users_with_retention().await?;

        for (user_id, retention) in users {
            let Some(window) = retention.window() else {
                continue;
            };
            let cutoff = now - window;
            let counts = self.retention_store.purge_before(&user_id, cutoff).await?;
            tracing::info!(
                job = %ctx.job_name,
                user_id = %user_id,
                messages = counts.messages,
                poll_responses = counts.poll_responses,
                check_ins = counts.check_ins,
                "retention sweep purged rows"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_domain::ports::MockRetentionStore;
    use accord_domain::{FixedClock, RetentionSweepCounts};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn skips_users_with_forever_retention() {
        let mut mock = MockRetentionStore::new();
        mock.expect_users_with_retention()
            .returning(|| Ok(vec![("user-1".to_string(), accord_domain::Retention::Forever)]));
        // `purge_before` must never be called for a forever-retention user.
        mock.expect_purge_before().times(0);

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap(),
        ));
        let job = RetentionJob {
            retention_store: Arc::new(mock),
            clock,
        };
        let ctx = JobContext {
            job_name: RETENTION_JOB.to_string(),
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        job.call(ctx).await.unwrap();
    }

    #[tokio::test]
    async fn purges_rows_older_than_the_users_window() {
        let mut mock = MockRetentionStore::new();
        mock.expect_users_with_retention()
            .returning(|| Ok(vec![("user-1".to_string(), accord_domain::Retention::OneMonth)]));
        mock.expect_purge_before().times(1).returning(|_, _| {
            Ok(RetentionSweepCounts {
                messages: 4,
                poll_responses: 2,
                check_ins: 1,
            })
        });

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap(),
        ));
        let job = RetentionJob {
            retention_store: Arc::new(mock),
            clock,
        };
        let ctx = JobContext {
            job_name: RETENTION_JOB.to_string(),
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        job.call(ctx).await.unwrap();
    }
}
