//! `LifeWeeksScheduler` (C11): one daily job firing at four coarse times,
//! rendering a 52x90 life-weeks grid for eligible users. Grounded in the
//! legacy `life_weeks_scheduler.py`'s weekday+hour gate and grid renderer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};

use accord_domain::entities::LifeWeeksSettings;
use accord_domain::{Clock, DispatchPort, DomainError, Payload};

use crate::runtime::{JobCallback, JobContext, RuntimeScheduler};

const GRID_WEEKS_PER_ROW: u32 = 52;
const GRID_ROWS: u32 = 90;
const REFERENCE_LIFESPAN_YEARS: f64 = 90.0;

pub const FIRE_TIMES: [(u32, u32); 4] = [(6, 0), (9, 0), (12, 0), (18, 0)];

/// Narrow hook the transport implements to route a user's reply on this
/// message back to wherever `destination` points (§4.11).
#[async_trait]
pub trait ReplyRouter: Send + Sync {
    async fn track_reply_context(
        &self,
        user_id: &str,
        settings: &LifeWeeksSettings,
    ) -> Result<(), DomainError>;
}

pub fn weeks_lived(today: NaiveDate, date_of_birth: NaiveDate) -> i64 {
    (today - date_of_birth).num_days() / 7
}

/// Renders the grid as a PNG-equivalent byte buffer; here it produces a
/// plain-text bitmap body, deferring real image encoding to an external
/// collaborator the way voice synthesis is deferred (§4.11, §5).
pub fn render_grid_overlay(weeks: i64, date_of_birth: NaiveDate, today: NaiveDate) -> String {
    let total_cells = (GRID_WEEKS_PER_ROW * GRID_ROWS) as i64;
    let filled = weeks.clamp(0, total_cells);
    let age_years = (today - date_of_birth).num_days() as f64 / 365.25;
    let percent = (age_years / REFERENCE_LIFESPAN_YEARS) * 100.0;

    let mut grid = String::with_capacity((total_cells + GRID_ROWS as i64) as usize);
    for row in 0..GRID_ROWS {
        for col in 0..GRID_WEEKS_PER_ROW {
            let index = (row * GRID_WEEKS_PER_ROW + col) as i64;
            grid.push(if index < filled { '#' } else { '.' });
        }
        grid.push('\n');
    }

    format!(
        "{grid}\nWeek {filled} of {total_cells} — {age_years:.1} years lived ({percent:.1}% of a {REFERENCE_LIFESPAN_YEARS:.0}-year reference lifespan)"
    )
}

/// Matches the hour of one of the four fixed daily fire slots against the
/// user's configured hour, same-hour minute threshold, so a user only ever
/// receives the grid once per eligible day instead of once per remaining
/// slot (§4.11).
fn is_eligible_now(settings: &LifeWeeksSettings, today: NaiveDate, today_weekday: Weekday, now: NaiveTime) -> bool {
    settings.enabled
        && settings.weekday == today_weekday
        && now.hour() == settings.time_of_day.hour()
        && now.minute() >= settings.time_of_day.minute()
        && settings.date_of_birth <= today
}

pub struct LifeWeeksScheduler<C: Clock, D: DispatchPort, R: ReplyRouter> {
    runtime: Arc<RuntimeScheduler<C>>,
    dispatch: Arc<D>,
    router: Arc<R>,
    clock: Arc<C>,
}

impl<C: Clock, D: DispatchPort + 'static, R: ReplyRouter + 'static> LifeWeeksScheduler<C, D, R> {
    pub fn new(runtime: Arc<RuntimeScheduler<C>>, dispatch: Arc<D>, router: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            runtime,
            dispatch,
            router,
            clock,
        }
    }

    /// Installs the single daily job with four fire times (§4.11).
    pub async fn install(
        &self,
        users: Vec<(String, LifeWeeksSettings)>,
    ) -> Result<(), DomainError> {
        let times = FIRE_TIMES
            .iter()
            .map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0).expect("fixed constants are valid times"))
            .collect();

        let callback: Arc<dyn JobCallback> = Arc::new(LifeWeeksJob {
            dispatch: self.dispatch.clone(),
            router: self.router.clone(),
            clock: self.clock.clone(),
            users,
        });

        self.runtime
            .schedule(
                "life_weeks".to_string(),
                accord_domain::Schedule::Daily { times },
                0,
                serde_json::Value::Null,
                callback,
            )
            .await
    }
}

struct LifeWeeksJob<C: Clock, D: DispatchPort, R: ReplyRouter> {
    dispatch: Arc<D>,
    router: Arc<R>,
    clock: Arc<C>,
    users: Vec<(String, LifeWeeksSettings)>,
}

#[async_trait]
impl<C: Clock, D: DispatchPort, R: ReplyRouter> JobCallback for LifeWeeksJob<C, D, R> {
    async fn call(&self, ctx: JobContext) -> Result<(), DomainError> {
        if ctx.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let now = self.clock.now_wall();
        let today = now.date_naive();
        let weekday = today.weekday();

        for (user_id, settings) in &self.users {
            if !is_eligible_now(settings, today, weekday, now.time()) {
                continue;
            }

            let weeks = weeks_lived(today, settings.date_of_birth);
            let overlay = render_grid_overlay(weeks, settings.date_of_birth, today);

            self.dispatch
                .deliver(
                    user_id,
                    Payload::Photo {
                        body: overlay,
                        image_bytes: Vec::new(),
                        inline_actions: Vec::new(),
                    },
                )
                .await?;

            self.router.track_reply_context(user_id, settings).await?;
        }

        tracing::info!(job = %ctx.job_name, "life-weeks tick complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weeks_lived_floors_to_whole_weeks() {
        let dob = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2000, 1, 10).unwrap();
        assert_eq!(weeks_lived(today, dob), 1);
    }

    #[test]
    fn grid_overlay_reports_percentage_of_reference_lifespan() {
        let dob = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let weeks = weeks_lived(today, dob);
        let overlay = render_grid_overlay(weeks, dob, today);
        assert!(overlay.contains("% of a 90-year reference lifespan"));
    }

    #[test]
    fn eligibility_requires_matching_weekday_and_elapsed_hour() {
        let settings = LifeWeeksSettings {
            user_id: "user-1".to_string(),
            enabled: true,
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            time_of_day: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            weekday: Weekday::Mon,
            destination: accord_domain::entities::LifeWeeksDestination::Chat,
            custom_path: None,
        };
        let today = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(); // a Monday
        assert_eq!(today.weekday(), Weekday::Mon);

        assert!(is_eligible_now(
            &settings,
            today,
            Weekday::Mon,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        ));
        assert!(!is_eligible_now(
            &settings,
            today,
            Weekday::Mon,
            NaiveTime::from_hms_opt(8, 59, 0).unwrap()
        ));
        assert!(!is_eligible_now(
            &settings,
            today,
            Weekday::Tue,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        ));
    }

    #[test]
    fn eligibility_matches_only_the_slot_sharing_the_configured_hour() {
        // Configured for 09:00; the job also ticks at 06:00, 12:00 and
        // 18:00 on the same day. Only the 09:00 tick should be eligible —
        // a blanket `now >= time_of_day` would match 12:00 and 18:00 too
        // and send the image up to four times in one day.
        let settings = LifeWeeksSettings {
            user_id: "user-1".to_string(),
            enabled: true,
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            time_of_day: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            weekday: Weekday::Mon,
            destination: accord_domain::entities::LifeWeeksDestination::Chat,
            custom_path: None,
        };
        let today = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(); // a Monday

        for (h, m) in FIRE_TIMES {
            let eligible = is_eligible_now(
                &settings,
                today,
                Weekday::Mon,
                NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            );
            assert_eq!(eligible, h == 9, "fire slot {h:02}:{m:02}");
        }
    }
}
