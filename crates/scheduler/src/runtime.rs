//! `RuntimeScheduler` (C7): single in-process dispatcher loop with a
//! priority queue keyed by next fire time, callbacks executed on a bounded
//! worker pool (§4.7, §5). The job table and overlap guard are owned by a
//! `kameo` actor — the same message-passing pattern the legacy pack cache
//! used for a single-owner mutable resource — while a separate tokio task
//! ticks the dispatcher and fans work out to the worker pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::message::{Context as KameoContext, Message};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use accord_domain::{Clock, DomainError, Schedule};

use crate::health::HealthRegistry;

/// Per-callback execution context: carries the job name and a cancellation
/// token the callback is expected to honour at its next suspension point
/// (§4.7, §5).
pub struct JobContext {
    pub job_name: String,
    pub cancellation: CancellationToken,
}

/// A unit of scheduled work. Implementors read state, build domain objects,
/// and hand results to the dispatch port; they never talk to the dispatcher
/// directly.
#[async_trait]
pub trait JobCallback: Send + Sync {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError>;
}

#[derive(Clone)]
struct JobEntry {
    schedule: Schedule,
    first_delay_seconds: u64,
    data: serde_json::Value,
    registered_seq: u64,
    next_fire: DateTime<Utc>,
    callback: Arc<dyn JobCallback>,
}

struct DueJob {
    name: String,
    callback: Arc<dyn JobCallback>,
}

#[derive(Actor)]
pub struct SchedulerActor {
    jobs: HashMap<String, JobEntry>,
    in_flight: HashSet<String>,
    next_seq: u64,
}

impl SchedulerActor {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            in_flight: HashSet::new(),
            next_seq: 0,
        }
    }
}

impl Default for SchedulerActor {
    fn default() -> Self {
        Self::new()
    }
}

fn next_daily_fire(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let today_at_time = now.date_naive().and_time(time).and_utc();
    if today_at_time > now {
        today_at_time
    } else {
        (now.date_naive() + chrono::Duration::days(1))
            .and_time(time)
            .and_utc()
    }
}

pub struct ScheduleMsg {
    pub name: String,
    pub schedule: Schedule,
    pub first_delay_seconds: u64,
    pub data: serde_json::Value,
    pub callback: Arc<dyn JobCallback>,
    pub now: DateTime<Utc>,
}

/// Removes all jobs whose name equals or is prefixed by `name_` (§4.7).
pub struct CancelMsg {
    pub name: String,
}

pub struct ListMsg;

pub struct TickMsg {
    pub now: DateTime<Utc>,
}

pub struct MarkDoneMsg {
    pub name: String,
}

impl Message<ScheduleMsg> for SchedulerActor {
    /// The names actually registered in the job table — a single entry for
    /// `Interval`, one per `<name>_HH:MM` sub-job for `Daily` — so the
    /// caller can mint one cancellation token per registered name instead of
    /// one keyed by the (possibly never-inserted) parent name.
    type Reply = Result<Vec<String>, DomainError>;

    async fn handle(&mut self, msg: ScheduleMsg, _ctx: &mut KameoContext<Self, Self::Reply>) -> Self::Reply {
        match &msg.schedule {
            Schedule::Interval { interval_seconds } => {
                if *interval_seconds == 0 {
                    return Err(DomainError::invalid_schedule("interval_seconds must be > 0"));
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                let next_fire = msg.now + chrono::Duration::seconds(msg.first_delay_seconds as i64);
                self.jobs.insert(
                    msg.name.clone(),
                    JobEntry {
                        schedule: msg.schedule.clone(),
                        first_delay_seconds: msg.first_delay_seconds,
                        data: msg.data.clone(),
                        registered_seq: seq,
                        next_fire,
                        callback: msg.callback.clone(),
                    },
                );
                Ok(vec![msg.name.clone()])
            }
            Schedule::Daily { times } => {
                if times.is_empty() {
                    return Err(DomainError::invalid_schedule(
                        "daily schedule requires at least one time",
                    ));
                }
                // Each listed time is an independent sub-job named
                // `<name>_HH:MM`, firing once per civil day.
                let mut names = Vec::with_capacity(times.len());
                for time in times {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    let sub_name = format!("{}_{}", msg.name, time.format("%H:%M"));
                    let next_fire = next_daily_fire(msg.now, *time);
                    self.jobs.insert(
                        sub_name.clone(),
                        JobEntry {
                            schedule: Schedule::Daily { times: vec![*time] },
                            first_delay_seconds: msg.first_delay_seconds,
                            data: msg.data.clone(),
                            registered_seq: seq,
                            next_fire,
                            callback: msg.callback.clone(),
                        },
                    );
                    names.push(sub_name);
                }
                Ok(names)
            }
        }
    }
}

impl Message<CancelMsg> for SchedulerActor {
    type Reply = bool;

    async fn handle(&mut self, msg: CancelMsg, _ctx: &mut KameoContext<Self, Self::Reply>) -> Self::Reply {
        let prefix = format!("{}_", msg.name);
        let to_remove: Vec<String> = self
            .jobs
            .keys()
            .filter(|k| **k == msg.name || k.starts_with(&prefix))
            .cloned()
            .collect();
        let removed = !to_remove.is_empty();
        for name in to_remove {
            self.jobs.remove(&name);
            self.in_flight.remove(&name);
        }
        removed
    }
}

impl Message<ListMsg> for SchedulerActor {
    type Reply = Vec<String>;

    async fn handle(&mut self, _msg: ListMsg, _ctx: &mut KameoContext<Self, Self::Reply>) -> Self::Reply {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Message<TickMsg> for SchedulerActor {
    type Reply = Vec<DueJob>;

    async fn handle(&mut self, msg: TickMsg, _ctx: &mut KameoContext<Self, Self::Reply>) -> Self::Reply {
        let mut due: Vec<(u64, String)> = Vec::new();

        for (name, entry) in self.jobs.iter() {
            if entry.next_fire <= msg.now {
                if self.in_flight.contains(name) {
                    // Overlap: the previous fire hasn't returned. Skip this
                    // tick rather than queue it (§4.7, §5 backpressure).
                    warn!(job = %name, "skipping tick: previous invocation still in flight");
                    continue;
                }
                due.push((entry.registered_seq, name.clone()));
            }
        }

        // Dispatched in registration order when fire times coincide (§4.7).
        due.sort_by_key(|(seq, _)| *seq);

        let mut out = Vec::new();
        for (_, name) in due {
            self.in_flight.insert(name.clone());
            let entry = self.jobs.get_mut(&name).expect("job present");
            entry.next_fire = match &entry.schedule {
                Schedule::Interval { interval_seconds } => {
                    msg.now + chrono::Duration::seconds(*interval_seconds as i64)
                }
                Schedule::Daily { times } => next_daily_fire(msg.now, times[0]),
            };
            out.push(DueJob {
                name: name.clone(),
                callback: entry.callback.clone(),
            });
        }
        out
    }
}

impl Message<MarkDoneMsg> for SchedulerActor {
    type Reply = ();

    async fn handle(&mut self, msg: MarkDoneMsg, _ctx: &mut KameoContext<Self, Self::Reply>) -> Self::Reply {
        self.in_flight.remove(&msg.name);
    }
}

/// Public facade composing the actor, a tokio-driven dispatch loop, a bounded
/// worker pool, and per-job cancellation tokens.
pub struct RuntimeScheduler<C: Clock> {
    actor: ActorRef<SchedulerActor>,
    clock: Arc<C>,
    worker_permits: Arc<Semaphore>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    tick_seq: AtomicU64,
    health: Arc<HealthRegistry>,
}

const WORKER_POOL_SIZE: usize = 16;
const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Propagation policy (§7): a retryable (`Transient`) failure gets up to
/// three retries within the same fire, exponential backoff starting at 1s
/// and doubling up to a 60s cap, before the fire is abandoned and logged.
const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_INITIAL_BACKOFF: StdDuration = StdDuration::from_secs(1);
const RETRY_MAX_BACKOFF: StdDuration = StdDuration::from_secs(60);

impl<C: Clock> RuntimeScheduler<C> {
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            actor: kameo::spawn(SchedulerActor::new()),
            clock,
            worker_permits: Arc::new(Semaphore::new(WORKER_POOL_SIZE)),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: Mutex::new(None),
            tick_seq: AtomicU64::new(0),
            health: Arc::new(HealthRegistry::new()),
        }
    }

    /// The rolling per-error-kind counters backing the operational health
    /// endpoint (§7).
    pub fn health(&self) -> Arc<HealthRegistry> {
        self.health.clone()
    }

    /// Inserts or replaces a job by name (§4.7).
    pub async fn schedule(
        &self,
        name: impl Into<String>,
        schedule: Schedule,
        first_delay_seconds: u64,
        data: serde_json::Value,
        callback: Arc<dyn JobCallback>,
    ) -> Result<(), DomainError> {
        let name = name.into();
        let now = self.clock.now_wall();
        let registered_names = self
            .actor
            .ask(ScheduleMsg {
                name: name.clone(),
                schedule,
                first_delay_seconds,
                data,
                callback,
                now,
            })
            .await
            .map_err(|e| DomainError::transient(e.to_string()))??;

        let mut tokens = self.tokens.lock().await;
        for registered_name in registered_names {
            tokens.insert(registered_name, CancellationToken::new());
        }
        Ok(())
    }

    /// Removes all jobs whose name equals or is prefixed by `name_`.
    pub async fn cancel(&self, name: &str) -> Result<bool, DomainError> {
        let removed = self
            .actor
            .ask(CancelMsg { name: name.to_string() })
            .await
            .map_err(|e| DomainError::transient(e.to_string()))?;

        let mut tokens = self.tokens.lock().await;
        let prefix = format!("{name}_");
        tokens.retain(|k, token| {
            let matches = k == name || k.starts_with(&prefix);
            if matches {
                token.cancel();
            }
            !matches
        });
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<String>, DomainError> {
        self.actor
            .ask(ListMsg)
            .await
            .map_err(|e| DomainError::transient(e.to_string()))
    }

    /// Starts the dispatcher loop: ticks every second, pulls due jobs from
    /// the actor, and fans each out onto the bounded worker pool. Calling
    /// `start` again after `stop` replaces the previous (already-aborted)
    /// handle.
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                let tick = this.tick_seq.fetch_add(1, Ordering::Relaxed);
                let now = this.clock.now_wall();
                let due = match this.actor.ask(TickMsg { now }).await {
                    Ok(due) => due,
                    Err(e) => {
                        error!(error = %e, tick, "scheduler actor unreachable during tick");
                        continue;
                    }
                };

                for job in due {
                    this.dispatch_one(job).await;
                }
            }
        });

        let mut slot = self.dispatcher.lock().await;
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(handle);
    }

    async fn dispatch_one(self: &Arc<Self>, job: DueJob) {
        let permit = match self.worker_permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let token = {
            let tokens = self.tokens.lock().await;
            tokens
                .get(&job.name)
                .cloned()
                .unwrap_or_else(CancellationToken::new)
        };

        let actor = self.actor.clone();
        let name = job.name.clone();
        let callback = job.callback.clone();
        let health = self.health.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let start = tokio::time::Instant::now();

            let mut attempt: u32 = 0;
            let mut backoff = RETRY_INITIAL_BACKOFF;
            let result = loop {
                let ctx = JobContext {
                    job_name: name.clone(),
                    cancellation: token.clone(),
                };
                let outcome = callback.call(ctx).await;
                match &outcome {
                    Err(e) if e.is_retryable() && attempt < MAX_RETRY_ATTEMPTS && !token.is_cancelled() => {
                        attempt += 1;
                        warn!(
                            job = %name,
                            attempt,
                            error = %e,
                            backoff_ms = backoff.as_millis(),
                            "transient failure, retrying within this fire"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
                    }
                    _ => break outcome,
                }
            };
            let elapsed = start.elapsed();

            let outcome_tag = match &result {
                Ok(()) => "ok".to_string(),
                Err(DomainError::Cancelled) => {
                    info!(job = %name, duration_ms = elapsed.as_millis(), "fire cancelled");
                    "ok".to_string()
                }
                Err(e) => {
                    error!(job = %name, duration_ms = elapsed.as_millis(), error = %e, "fire failed");
                    format!("error:{}", e.kind_tag())
                }
            };

            if outcome_tag == "ok" {
                info!(job = %name, duration_ms = elapsed.as_millis(), outcome = "ok", "fire complete");
            }
            health.record_outcome(&name, &outcome_tag);

            let _ = actor.tell(MarkDoneMsg { name }).await;
        });
    }

    /// Cancels all tokens and drains the worker pool with a 30-second
    /// budget; jobs exceeding it are abandoned and logged (§5).
    pub async fn stop(&self) {
        let mut slot = self.dispatcher.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let tokens = self.tokens.lock().await;
        for token in tokens.values() {
            token.cancel();
        }
        drop(tokens);

        let drain_budget = StdDuration::from_secs(30);
        let total_permits = WORKER_POOL_SIZE as u32;
        let drained = tokio::time::timeout(
            drain_budget,
            self.worker_permits.acquire_many(total_permits),
        )
        .await;
        if drained.is_err() {
            warn!("worker pool did not drain within the 30s stop budget; abandoning stragglers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_domain::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    struct CountingCallback {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobCallback for CountingCallback {
        async fn call(&self, _ctx: JobContext) -> Result<(), DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn clock_at(h: u32, m: u32) -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 2, 12, h, m, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn daily_schedule_fans_out_into_named_sub_jobs() {
        let clock = clock_at(8, 0);
        let scheduler = RuntimeScheduler::new(clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback { calls });

        scheduler
            .schedule(
                "checkin_user-1",
                Schedule::Daily {
                    times: vec![
                        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                    ],
                },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
            .unwrap();

        let mut names = scheduler.list().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["checkin_user-1_09:00", "checkin_user-1_19:00"]);
    }

    #[tokio::test]
    async fn cancel_removes_exact_name_and_all_sub_job_names() {
        let clock = clock_at(8, 0);
        let scheduler = RuntimeScheduler::new(clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback { calls });

        scheduler
            .schedule(
                "checkin_user-1",
                Schedule::Daily {
                    times: vec![
                        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                    ],
                },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
            .unwrap();

        let removed = scheduler.cancel("checkin_user-1").await.unwrap();
        assert!(removed);
        assert!(scheduler.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interval_schedule_rejects_zero_seconds() {
        let clock = clock_at(8, 0);
        let scheduler = RuntimeScheduler::new(clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback { calls });

        let err = scheduler
            .schedule(
                "retention_sweep",
                Schedule::Interval { interval_seconds: 0 },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidScheduleSpec { .. }));
    }

    #[tokio::test]
    async fn tick_skips_a_job_already_in_flight() {
        let clock = clock_at(19, 0);
        let now = clock.now_wall();
        let actor: ActorRef<SchedulerActor> = kameo::spawn(SchedulerActor::new());

        let calls = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback { calls });

        actor
            .ask(ScheduleMsg {
                name: "srs_recompute".to_string(),
                schedule: Schedule::Interval { interval_seconds: 60 },
                first_delay_seconds: 0,
                data: serde_json::Value::Null,
                callback,
                now,
            })
            .await
            .unwrap()
            .unwrap();

        let due_first = actor.ask(TickMsg { now }).await.unwrap();
        assert_eq!(due_first.len(), 1);

        // A second tick before `MarkDoneMsg` is sent must be skipped — the
        // job is still marked in-flight.
        let due_second = actor.ask(TickMsg { now }).await.unwrap();
        assert!(due_second.is_empty());

        actor
            .tell(MarkDoneMsg {
                name: "srs_recompute".to_string(),
            })
            .await
            .unwrap();

        let due_third = actor.ask(TickMsg { now }).await.unwrap();
        assert_eq!(due_third.len(), 1);
    }

    #[tokio::test]
    async fn jobs_with_the_same_fire_time_dispatch_in_registration_order() {
        let clock = clock_at(19, 0);
        let now = clock.now_wall();
        let actor: ActorRef<SchedulerActor> = kameo::spawn(SchedulerActor::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for name in ["first", "second", "third"] {
            let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback {
                calls: calls.clone(),
            });
            actor
                .ask(ScheduleMsg {
                    name: name.to_string(),
                    schedule: Schedule::Interval { interval_seconds: 60 },
                    first_delay_seconds: 0,
                    data: serde_json::Value::Null,
                    callback,
                    now,
                })
                .await
                .unwrap()
                .unwrap();
        }

        let due = actor.ask(TickMsg { now }).await.unwrap();
        let names: Vec<&str> = due.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn daily_sub_jobs_each_get_their_own_cancellation_token() {
        let clock = clock_at(8, 0);
        let scheduler = RuntimeScheduler::new(clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(CountingCallback { calls });

        scheduler
            .schedule(
                "checkin_user-1",
                Schedule::Daily {
                    times: vec![
                        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                    ],
                },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
            .unwrap();

        let tokens = scheduler.tokens.lock().await;
        assert!(tokens.contains_key("checkin_user-1_09:00"));
        assert!(tokens.contains_key("checkin_user-1_19:00"));
        assert!(!tokens.contains_key("checkin_user-1"));
        assert!(!tokens["checkin_user-1_09:00"].is_cancelled());
        // The two sub-jobs' tokens are independent: cancelling one must not
        // affect the other.
        tokens["checkin_user-1_09:00"].cancel();
        assert!(!tokens["checkin_user-1_19:00"].is_cancelled());
    }

    struct FlakyCallback {
        attempts: Arc<AtomicUsize>,
        fail_until: usize,
    }

    #[async_trait]
    impl JobCallback for FlakyCallback {
        async fn call(&self, _ctx: JobContext) -> Result<(), DomainError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(DomainError::transient("not yet"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_within_the_same_fire_before_succeeding() {
        let clock = clock_at(8, 0);
        let scheduler = Arc::new(RuntimeScheduler::new(clock));
        let attempts = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(FlakyCallback {
            attempts: attempts.clone(),
            fail_until: 2,
        });

        scheduler
            .dispatch_one(DueJob {
                name: "flaky".to_string(),
                callback,
            })
            .await;

        // The retry loop runs on a detached task with real sleeps between
        // attempts; with the tokio clock paused, awaiting a permit-full
        // acquire_many lets every pending timer fire without real delay.
        let _ = scheduler.worker_permits.acquire_many(WORKER_POOL_SIZE as u32).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transient_failure_is_abandoned_after_max_retries() {
        let clock = clock_at(8, 0);
        let scheduler = Arc::new(RuntimeScheduler::new(clock));
        let attempts = Arc::new(AtomicUsize::new(0));
        let callback: Arc<dyn JobCallback> = Arc::new(FlakyCallback {
            attempts: attempts.clone(),
            fail_until: usize::MAX,
        });

        scheduler
            .dispatch_one(DueJob {
                name: "always_flaky".to_string(),
                callback,
            })
            .await;

        let _ = scheduler.worker_permits.acquire_many(WORKER_POOL_SIZE as u32).await;
        // One initial attempt plus MAX_RETRY_ATTEMPTS retries, then abandoned.
        assert_eq!(attempts.load(Ordering::SeqCst), 1 + MAX_RETRY_ATTEMPTS as usize);
    }
}
