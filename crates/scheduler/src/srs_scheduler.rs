//! `SRSScheduler` (C10): composes C5 (`SrsEngine`) with C7
//! (`RuntimeScheduler`) to keep `is_due` current and to deliver the morning
//! review batch. Grounded in the legacy `srs_scheduler.py`'s two-job split:
//! a frequent recompute tick and one daily batch dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;

use uuid::Uuid;

use accord_domain::entities::NoteType;
use accord_domain::srs::SrsEngine;
use accord_domain::{Clock, DispatchPort, DomainError, InlineAction, Payload, Schedule, Store, Vault};

use crate::runtime::{JobCallback, JobContext, RuntimeScheduler};

/// Card rating action tokens carry only the card's opaque id; the note path
/// is re-derived server-side from it on receipt, never sent over the wire
/// (§4.10, §6, §9).
pub fn action_token(prefix: &str, card_id: Uuid) -> String {
    format!("{prefix}:{card_id}")
}

pub struct SrsScheduler<C: Clock, S: Store, V: Vault, D: DispatchPort> {
    runtime: Arc<RuntimeScheduler<C>>,
    engine: Arc<SrsEngine<S, V>>,
    dispatch: Arc<D>,
    clock: Arc<C>,
    morning_batch_time: NaiveTime,
    morning_batch_size: usize,
    morning_batch_max_size: usize,
}

const RECOMPUTE_JOB: &str = "srs_recompute";
const MORNING_BATCH_JOB: &str = "srs_morning_batch";
const RECOMPUTE_INTERVAL_SECONDS: u64 = 3600;

impl<C: Clock, S: Store + 'static, V: Vault + 'static, D: DispatchPort + 'static>
    SrsScheduler<C, S, V, D>
{
    pub fn new(
        runtime: Arc<RuntimeScheduler<C>>,
        engine: Arc<SrsEngine<S, V>>,
        dispatch: Arc<D>,
        clock: Arc<C>,
        morning_batch_time: NaiveTime,
        morning_batch_size: usize,
        morning_batch_max_size: usize,
    ) -> Self {
        Self {
            runtime,
            engine,
            dispatch,
            clock,
            morning_batch_time,
            morning_batch_size: morning_batch_size.min(morning_batch_max_size),
            morning_batch_max_size,
        }
    }

    /// Installs the two global SRS jobs (§4.10). Unlike accountability,
    /// these are not per-user — every subscribed user receives the batch in
    /// the same tick, each bounded to their own `due_cards` slice.
    pub async fn install(&self, users: &[String]) -> Result<(), DomainError> {
        let recompute_cb: Arc<dyn JobCallback> = Arc::new(RecomputeJob {
            engine: self.engine.clone(),
            clock: self.clock.clone(),
        });
        self.runtime
            .schedule(
                RECOMPUTE_JOB.to_string(),
                Schedule::Interval {
                    interval_seconds: RECOMPUTE_INTERVAL_SECONDS,
                },
                0,
                serde_json::Value::Null,
                recompute_cb,
            )
            .await?;

        let batch_cb: Arc<dyn JobCallback> = Arc::new(MorningBatchJob {
            engine: self.engine.clone(),
            dispatch: self.dispatch.clone(),
            clock: self.clock.clone(),
            users: users.to_vec(),
            batch_size: self.morning_batch_size.min(self.morning_batch_max_size),
        });
        self.runtime
            .schedule(
                MORNING_BATCH_JOB.to_string(),
                Schedule::Daily {
                    times: vec![self.morning_batch_time],
                },
                0,
                serde_json::Value::Null,
                batch_cb,
            )
            .await?;

        Ok(())
    }

    /// Applies a rating action token's effect. The token carries only the
    /// card id; the note path is resolved server-side before reaching
    /// `SrsEngine::rate`. `develop` never mutates a card — it only renders
    /// an excerpt, so it is handled by the caller before reaching here
    /// (§4.10).
    pub async fn apply_rating_token(
        &self,
        card_id: Uuid,
        rating: accord_domain::entities::Rating,
    ) -> Result<(), DomainError> {
        let today = self.clock.today();
        let card = self.engine.card_by_id(card_id).await?;
        self.engine.rate(&card.note_path, rating, today).await?;
        Ok(())
    }
}

struct RecomputeJob<S: Store, V: Vault, C: Clock> {
    engine: Arc<SrsEngine<S, V>>,
    clock: Arc<C>,
}

#[async_trait]
impl<S: Store, V: Vault, C: Clock> JobCallback for RecomputeJob<S, V, C> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        let today = self.clock.today();
        let synced = self.engine.sync_vault(today).await?;
        tracing::info!(job = %ctx.job_name, synced, "srs vault sync complete");
        Ok(())
    }
}

struct MorningBatchJob<S: Store, V: Vault, C: Clock, D: DispatchPort> {
    engine: Arc<SrsEngine<S, V>>,
    dispatch: Arc<D>,
    clock: Arc<C>,
    users: Vec<String>,
    batch_size: usize,
}

#[async_trait]
impl<S: Store, V: Vault, C: Clock, D: DispatchPort> JobCallback for MorningBatchJob<S, V, C, D> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let today = self.clock.today();
        let due = self.engine.due_cards(today, self.batch_size, None).await?;
        if due.is_empty() {
            return Ok(());
        }

        for user_id in &self.users {
            for card in &due {
                let actions = vec![
                    vec![
                        InlineAction::new("Again", action_token("srs_again", card.id))?,
                        InlineAction::new("Hard", action_token("srs_hard", card.id))?,
                        InlineAction::new("Good", action_token("srs_good", card.id))?,
                        InlineAction::new("Easy", action_token("srs_easy", card.id))?,
                    ],
                    vec![InlineAction::new(
                        "Develop",
                        action_token("srs_develop", card.id),
                    )?],
                ];

                let note_kind = match card.note_type {
                    NoteType::Idea => "idea",
                    NoteType::Trail => "trail",
                    NoteType::Moc => "moc",
                    NoteType::Other => "note",
                };

                self.dispatch
                    .deliver(
                        user_id,
                        Payload::Text {
                            body: format!("Review ({note_kind}): \"{}\"", card.title),
                            inline_actions: actions,
                        },
                    )
                    .await?;
            }
        }

        tracing::info!(job = %ctx.job_name, count = due.len(), "srs morning batch dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_token_namespaces_the_card_id_not_a_note_path() {
        let id = Uuid::nil();
        assert_eq!(
            action_token("srs_again", id),
            format!("srs_again:{id}"),
        );
    }
}
