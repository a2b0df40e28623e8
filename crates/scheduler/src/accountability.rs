//! `AccountabilityScheduler` (C9): composes C4 (TrackerAggregate), C6
//! (ResponseGenerator) and C7 (RuntimeScheduler) to install check-in and
//! struggle jobs per user, and to react to rating callbacks. Grounded in
//! the legacy `accountability_scheduler.py`'s
//! `send_checkin_reminder`/`check_struggles`/`schedule_user_checkins`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;

use accord_domain::response::{self, EventKind, ResponseContext};
use accord_domain::{
    AccountabilityProfile, Clock, DomainError, DispatchPort, InlineAction, Payload, Schedule,
    Store, TrackerAggregate,
};

use crate::runtime::{JobCallback, JobContext, RuntimeScheduler};

/// Whether `t` falls inside the configured quiet-hours window, including
/// both boundary instants, with wrap-around handled (§4.9, §8, §9 — the
/// design preserves this mildly-surprising boundary behaviour from the
/// source as flagged).
pub fn is_quiet_hours(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start > end {
        t >= start || t <= end
    } else {
        start <= t && t <= end
    }
}

pub struct AccountabilityScheduler<C: Clock, S: Store, D: DispatchPort> {
    runtime: Arc<RuntimeScheduler<C>>,
    store: Arc<S>,
    dispatch: Arc<D>,
    clock: Arc<C>,
    quiet_hours_start: NaiveTime,
    quiet_hours_end: NaiveTime,
}

impl<C: Clock, S: Store + 'static, D: DispatchPort + 'static> AccountabilityScheduler<C, S, D> {
    pub fn new(
        runtime: Arc<RuntimeScheduler<C>>,
        store: Arc<S>,
        dispatch: Arc<D>,
        clock: Arc<C>,
        quiet_hours_start: NaiveTime,
        quiet_hours_end: NaiveTime,
    ) -> Self {
        Self {
            runtime,
            store,
            dispatch,
            clock,
            quiet_hours_start,
            quiet_hours_end,
        }
    }

    /// Installs `checkin_<user_id>` at the profile's `check_time` and
    /// `struggle_<user_id>` one hour later (§4.9).
    pub async fn schedule_user(&self, profile: &AccountabilityProfile) -> Result<(), DomainError> {
        let checkin_cb: Arc<dyn JobCallback> = Arc::new(CheckinJob {
            user_id: profile.user_id.clone(),
            personality: profile.personality,
            celebration_style: profile.celebration_style,
            store: self.store.clone(),
            dispatch: self.dispatch.clone(),
            clock: self.clock.clone(),
            quiet_hours_start: self.quiet_hours_start,
            quiet_hours_end: self.quiet_hours_end,
        });
        self.runtime
            .schedule(
                format!("checkin_{}", profile.user_id),
                Schedule::Daily {
                    times: vec![profile.check_time],
                },
                0,
                serde_json::json!({ "user_id": profile.user_id }),
                checkin_cb,
            )
            .await?;

        let struggle_time = add_hour(profile.check_time);
        let struggle_cb: Arc<dyn JobCallback> = Arc::new(StruggleJob {
            user_id: profile.user_id.clone(),
            struggle_threshold: profile.struggle_threshold,
            personality: profile.personality,
            celebration_style: profile.celebration_style,
            store: self.store.clone(),
            dispatch: self.dispatch.clone(),
            clock: self.clock.clone(),
        });
        self.runtime
            .schedule(
                format!("struggle_{}", profile.user_id),
                Schedule::Daily {
                    times: vec![struggle_time],
                },
                0,
                serde_json::json!({ "user_id": profile.user_id }),
                struggle_cb,
            )
            .await?;

        Ok(())
    }

    pub async fn cancel_user(&self, user_id: &str) -> Result<(), DomainError> {
        self.runtime.cancel(&format!("checkin_{user_id}")).await?;
        self.runtime.cancel(&format!("struggle_{user_id}")).await?;
        Ok(())
    }

    /// On a "done"/"skip" user action: loads the aggregate, applies the
    /// command, persists the pending check-in, recomputes the streak; if
    /// the new streak is a milestone, fires a celebration event (§4.9).
    pub async fn record_action(
        &self,
        user_id: &str,
        tracker_id: uuid::Uuid,
        completed: bool,
        profile: &AccountabilityProfile,
    ) -> Result<(), DomainError> {
        let today = self.clock.today();
        let trackers = self.store.active_trackers_for_user(user_id).await?;
        let tracker = trackers
            .into_iter()
            .find(|t| t.id == tracker_id)
            .ok_or_else(|| DomainError::not_found("Tracker", tracker_id))?;
        let check_ins = self.store.completed_check_ins_for(user_id, tracker_id).await?;

        let mut aggregate = TrackerAggregate::new(tracker.clone(), check_ins)?;
        if completed {
            aggregate.mark_completed(today)?;
        } else {
            aggregate.skip(today)?;
        }

        let mut tx = self.store.begin().await?;
        for check_in in aggregate.pending_check_ins() {
            tx.insert_check_in(check_in).await?;
        }
        tx.commit().await?;

        let streak = aggregate.compute_streak(today);
        if completed && response::is_milestone(streak) {
            let ctx = ResponseContext {
                tracker_name: tracker.name.clone(),
                streak,
                milestone: Some(streak),
                consecutive_misses: 0,
                greeting: greeting_for(today),
            };
            let rendered = response::generate(
                EventKind::Celebration,
                profile.personality,
                profile.celebration_style,
                "en",
                &ctx,
            );
            self.dispatch
                .deliver(
                    user_id,
                    Payload::Voice {
                        body: response::strip_voice_tags(&rendered.text),
                        audio_bytes: Vec::new(),
                        inline_actions: Vec::new(),
                    },
                )
                .await?;
        }

        Ok(())
    }
}

fn add_hour(t: NaiveTime) -> NaiveTime {
    t + chrono::Duration::hours(1)
}

fn greeting_for(_today: chrono::NaiveDate) -> String {
    "Good evening!".to_string()
}

struct CheckinJob<C: Clock, S: Store, D: DispatchPort> {
    user_id: String,
    personality: accord_domain::Personality,
    celebration_style: accord_domain::CelebrationStyle,
    store: Arc<S>,
    dispatch: Arc<D>,
    clock: Arc<C>,
    quiet_hours_start: NaiveTime,
    quiet_hours_end: NaiveTime,
}

#[async_trait]
impl<C: Clock, S: Store, D: DispatchPort> JobCallback for CheckinJob<C, S, D> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let now = self.clock.now_wall();
        if is_quiet_hours(now.time(), self.quiet_hours_start, self.quiet_hours_end) {
            tracing::info!(job = %ctx.job_name, outcome = "skipped_quiet_hours", "check-in gated");
            return Ok(());
        }

        let today = self.clock.today();
        let trackers = self.store.active_trackers_for_user(&self.user_id).await?;

        for tracker in trackers {
            let check_ins = self
                .store
                .completed_check_ins_for(&self.user_id, tracker.id)
                .await?;
            let has_checkin_today = check_ins.iter().any(|c| c.calendar_date() == today);
            if has_checkin_today {
                continue;
            }

            let aggregate = TrackerAggregate::new(tracker.clone(), check_ins)?;
            let streak = aggregate.compute_streak(today);
            let event_kind = if streak > 0 {
                EventKind::CheckinWithStreak
            } else {
                EventKind::Checkin
            };

            let response_ctx = ResponseContext {
                tracker_name: tracker.name.clone(),
                streak,
                milestone: None,
                consecutive_misses: 0,
                greeting: greeting_for(today),
            };
            let rendered = response::generate(
                event_kind,
                self.personality,
                self.celebration_style,
                "en",
                &response_ctx,
            );

            let actions = vec![vec![
                InlineAction::new("Done", format!("checkin_done:{}", tracker.id))?,
                InlineAction::new("Skip", format!("checkin_skip:{}", tracker.id))?,
            ]];

            self.dispatch
                .deliver(
                    &self.user_id,
                    Payload::Text {
                        body: response::strip_voice_tags(&rendered.text),
                        inline_actions: actions,
                    },
                )
                .await?;
        }

        Ok(())
    }
}

struct StruggleJob<C: Clock, S: Store, D: DispatchPort> {
    user_id: String,
    struggle_threshold: i64,
    personality: accord_domain::Personality,
    celebration_style: accord_domain::CelebrationStyle,
    store: Arc<S>,
    dispatch: Arc<D>,
    clock: Arc<C>,
}

#[async_trait]
impl<C: Clock, S: Store, D: DispatchPort> JobCallback for StruggleJob<C, S, D> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let today = self.clock.today();
        let trackers = self.store.active_trackers_for_user(&self.user_id).await?;

        for tracker in trackers {
            let check_ins = self
                .store
                .completed_check_ins_for(&self.user_id, tracker.id)
                .await?;
            let aggregate = TrackerAggregate::new(tracker.clone(), check_ins)?;
            let misses = aggregate.count_consecutive_misses(today);

            if (misses as i64) >= self.struggle_threshold {
                let response_ctx = ResponseContext {
                    tracker_name: tracker.name.clone(),
                    streak: 0,
                    milestone: None,
                    consecutive_misses: misses,
                    greeting: greeting_for(today),
                };
                let rendered = response::generate(
                    EventKind::Struggle,
                    self.personality,
                    self.celebration_style,
                    "en",
                    &response_ctx,
                );
                self.dispatch
                    .deliver(
                        &self.user_id,
                        Payload::Text {
                            body: response::strip_voice_tags(&rendered.text),
                            inline_actions: Vec::new(),
                        },
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn quiet_hours_wraps_midnight_and_includes_both_boundaries() {
        let start = t(22, 0);
        let end = t(7, 0);
        assert!(is_quiet_hours(t(22, 0), start, end));
        assert!(is_quiet_hours(t(0, 0), start, end));
        assert!(is_quiet_hours(t(7, 0), start, end));
        assert!(!is_quiet_hours(t(21, 59), start, end));
        assert!(!is_quiet_hours(t(7, 1), start, end));
    }

    #[test]
    fn non_wrapping_window_is_a_plain_range() {
        let start = t(9, 0);
        let end = t(17, 0);
        assert!(is_quiet_hours(t(12, 0), start, end));
        assert!(!is_quiet_hours(t(8, 59), start, end));
        assert!(!is_quiet_hours(t(17, 1), start, end));
    }
}
