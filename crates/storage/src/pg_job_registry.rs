//! `JobRegistry` (C8) over Postgres: a persistent index of per-user
//! schedules so they survive restart, grounded in the legacy
//! `restore_all_schedules` rehydration flow.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use accord_domain::{DomainError, JobRegistry};

use crate::error::StorageError;

#[derive(Clone)]
pub struct PgJobRegistry {
    pool: PgPool,
}

impl PgJobRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRegistry for PgJobRegistry {
    async fn schedule_user(&self, user_id: &str, chat_id: &str) -> Result<(), DomainError> {
        for job_name in [format!("checkin_{user_id}"), format!("struggle_{user_id}")] {
            sqlx::query(
                "INSERT INTO job_registry (job_name, owner_user, chat_id) VALUES ($1, $2, $3) \
                 ON CONFLICT (job_name) DO UPDATE SET chat_id = EXCLUDED.chat_id",
            )
            .bind(&job_name)
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        }
        Ok(())
    }

    async fn clear_user(&self, user_id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM job_registry WHERE owner_user = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn all_scheduled_users(&self) -> Result<Vec<(String, String)>, DomainError> {
        let rows = sqlx::query(
            "SELECT DISTINCT owner_user, chat_id FROM job_registry ORDER BY owner_user",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.try_get::<String, _>("owner_user").unwrap_or_default(),
                    r.try_get::<String, _>("chat_id").unwrap_or_default(),
                )
            })
            .collect())
    }
}
