//! `RetentionStore` (C13 support) over a `sqlx::PgPool`. The two join paths
//! are kept textually separate on purpose: Message joins Chat through the
//! database primary key `chats.id`; PollResponse joins through the external
//! `chats.chat_id`. Collapsing these into one helper is the exact mistake
//! flagged as the source's ID-space hazard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use accord_domain::{DomainError, Retention, RetentionStore, RetentionSweepCounts};

use crate::error::StorageError;

#[derive(Clone)]
pub struct PgRetentionStore {
    pool: PgPool,
}

impl PgRetentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_retention(s: &str) -> Retention {
    match s {
        "1_month" => Retention::OneMonth,
        "6_months" => Retention::SixMonths,
        "forever" => Retention::Forever,
        _ => Retention::OneYear,
    }
}

#[async_trait]
impl RetentionStore for PgRetentionStore {
    async fn users_with_retention(&self) -> Result<Vec<(String, Retention)>, DomainError> {
        let rows = sqlx::query("SELECT user_id, retention FROM privacy_settings")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)?;

        rows.into_iter()
            .map(|row| {
                let user_id: String = row.try_get("user_id").map_err(StorageError::Query)?;
                let retention: String = row.try_get("retention").map_err(StorageError::Query)?;
                Ok((user_id, parse_retention(&retention)))
            })
            .collect()
    }

    async fn purge_before(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RetentionSweepCounts, DomainError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Connection)?;

        // Message -> Chat via the database primary key (`chats.id`).
        let messages = sqlx::query(
            "DELETE FROM messages \
             WHERE created_at < $1 \
               AND chat_id IN (SELECT id FROM chats WHERE user_id = $2)",
        )
        .bind(cutoff)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Query)?
        .rows_affected();

        // PollResponse -> Chat via the external identifier (`chats.chat_id`),
        // deliberately not `chats.id`.
        let poll_responses = sqlx::query(
            "DELETE FROM poll_responses \
             WHERE created_at < $1 \
               AND chat_id IN (SELECT chat_id FROM chats WHERE user_id = $2)",
        )
        .bind(cutoff)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Query)?
        .rows_affected();

        let check_ins = sqlx::query("DELETE FROM check_ins WHERE created_at < $1 AND owner = $2")
            .bind(cutoff)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?
            .rows_affected();

        tx.commit().await.map_err(StorageError::Connection)?;

        Ok(RetentionSweepCounts {
            messages,
            poll_responses,
            check_ins,
        })
    }
}
