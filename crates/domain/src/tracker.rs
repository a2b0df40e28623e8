//! `TrackerAggregate`: the only sanctioned way to create CheckIn rows (§4.4).

use chrono::NaiveDate;
use uuid::Uuid;

use crate::entities::{CheckIn, CheckInStatus, Tracker};
use crate::error::DomainError;

/// A Tracker plus its CheckIns, as a single consistency boundary. Construction
/// rejects any check-in whose `tracker_id` or `owner` disagrees with the
/// tracker (§4.4).
pub struct TrackerAggregate {
    tracker: Tracker,
    persisted: Vec<CheckIn>,
    pending: Vec<CheckIn>,
}

impl TrackerAggregate {
    pub fn new(tracker: Tracker, check_ins: Vec<CheckIn>) -> Result<Self, DomainError> {
        for check_in in &check_ins {
            if check_in.tracker_id != tracker.id {
                return Err(DomainError::ownership_mismatch(format!(
                    "check-in {} belongs to tracker {}, not {}",
                    check_in.id, check_in.tracker_id, tracker.id
                )));
            }
            if check_in.owner != tracker.owner {
                return Err(DomainError::ownership_mismatch(format!(
                    "check-in {} owner {} disagrees with tracker owner {}",
                    check_in.id, check_in.owner, tracker.owner
                )));
            }
        }

        Ok(Self {
            tracker,
            persisted: check_ins,
            pending: Vec::new(),
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// All check-ins, persisted and pending, for invariant checks.
    fn all_check_ins(&self) -> impl Iterator<Item = &CheckIn> {
        self.persisted.iter().chain(self.pending.iter())
    }

    fn has_checkin_on(&self, date: NaiveDate) -> bool {
        self.all_check_ins().any(|c| c.calendar_date() == date)
    }

    /// Fails with `DuplicateCheckIn` when a check-in for that date already
    /// exists, persisted *or* pending — this checks pending state too, unlike
    /// the legacy implementation this is descended from, which checked only
    /// persisted rows.
    pub fn mark_completed(&mut self, date: NaiveDate) -> Result<(), DomainError> {
        self.add_check_in(date, CheckInStatus::Completed)
    }

    /// Symmetric to `mark_completed`.
    pub fn skip(&mut self, date: NaiveDate) -> Result<(), DomainError> {
        self.add_check_in(date, CheckInStatus::Skipped)
    }

    fn add_check_in(&mut self, date: NaiveDate, status: CheckInStatus) -> Result<(), DomainError> {
        if self.has_checkin_on(date) {
            return Err(DomainError::DuplicateCheckIn {
                tracker_id: self.tracker.id,
                date,
            });
        }

        let created_at = date
            .and_hms_opt(12, 0, 0)
            .expect("12:00:00 is always a valid time")
            .and_utc();

        self.pending.push(CheckIn {
            id: Uuid::new_v4(),
            tracker_id: self.tracker.id,
            owner: self.tracker.owner.clone(),
            status,
            created_at,
            note: None,
        });

        Ok(())
    }

    /// Snapshot of check-ins created by this aggregate and not yet persisted.
    /// The caller persists these via the Store; the aggregate never writes.
    pub fn pending_check_ins(&self) -> &[CheckIn] {
        &self.pending
    }

    /// Greatest `k` such that, for every `i ∈ [0, k)`, the aggregate contains
    /// a `completed`/`partial` row whose calendar date equals `today − i`.
    pub fn compute_streak(&self, today: NaiveDate) -> u32 {
        let mut streak = 0u32;
        loop {
            let date = today - chrono::Duration::days(streak as i64);
            let counted = self
                .all_check_ins()
                .any(|c| c.calendar_date() == date && c.status.counts_toward_streak());
            if !counted {
                break;
            }
            streak += 1;
        }
        streak
    }

    /// Daily trackers only: days between today and the latest check-in of
    /// any status, floored at zero. Zero for non-daily frequencies (§3, §9).
    pub fn count_consecutive_misses(&self, today: NaiveDate) -> u32 {
        use crate::entities::TrackerFrequency;
        if self.tracker.frequency != TrackerFrequency::Daily {
            return 0;
        }

        let latest = self.all_check_ins().map(|c| c.calendar_date()).max();
        match latest {
            Some(date) => {
                let days = (today - date).num_days();
                days.max(0) as u32
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{TrackerFrequency, TrackerType};
    use chrono::{TimeZone, Utc};

    fn tracker(frequency: TrackerFrequency) -> Tracker {
        Tracker {
            id: Uuid::new_v4(),
            owner: "user-42".to_string(),
            tracker_type: TrackerType::Habit,
            name: "Exercise".to_string(),
            frequency,
            check_time: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn check_in_on(tracker: &Tracker, date: NaiveDate, status: CheckInStatus) -> CheckIn {
        CheckIn {
            id: Uuid::new_v4(),
            tracker_id: tracker.id,
            owner: tracker.owner.clone(),
            status,
            created_at: date.and_hms_opt(12, 0, 0).unwrap().and_utc(),
            note: None,
        }
    }

    #[test]
    fn rejects_mismatched_owner() {
        let t = tracker(TrackerFrequency::Daily);
        let mut foreign = check_in_on(&t, t.created_at.date_naive(), CheckInStatus::Completed);
        foreign.owner = "someone-else".to_string();
        let err = TrackerAggregate::new(t, vec![foreign]).unwrap_err();
        assert!(matches!(err, DomainError::OwnershipMismatch { .. }));
    }

    #[test]
    fn mark_completed_then_duplicate_fails() {
        let t = tracker(TrackerFrequency::Daily);
        let today = Utc::now().date_naive();
        let mut agg = TrackerAggregate::new(t, vec![]).unwrap();
        agg.mark_completed(today).unwrap();
        assert_eq!(agg.pending_check_ins().len(), 1);
        let err = agg.mark_completed(today).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateCheckIn { .. }));
        let err = agg.skip(today).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateCheckIn { .. }));
    }

    #[test]
    fn streak_counts_consecutive_completed_days() {
        let t = tracker(TrackerFrequency::Daily);
        let today = Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap().date_naive();
        let check_ins = (0..5)
            .map(|i| check_in_on(&t, today - chrono::Duration::days(i), CheckInStatus::Completed))
            .collect();
        let agg = TrackerAggregate::new(t, check_ins).unwrap();
        assert_eq!(agg.compute_streak(today), 5);
    }

    #[test]
    fn streak_is_zero_when_latest_completion_before_today() {
        let t = tracker(TrackerFrequency::Daily);
        let today = Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap().date_naive();
        let check_ins = vec![check_in_on(
            &t,
            today - chrono::Duration::days(2),
            CheckInStatus::Completed,
        )];
        let agg = TrackerAggregate::new(t, check_ins).unwrap();
        assert_eq!(agg.compute_streak(today), 0);
    }

    #[test]
    fn misses_are_zero_for_non_daily_trackers() {
        let t = tracker(TrackerFrequency::Weekly);
        let today = Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap().date_naive();
        let check_ins = vec![check_in_on(
            &t,
            today - chrono::Duration::days(30),
            CheckInStatus::Completed,
        )];
        let agg = TrackerAggregate::new(t, check_ins).unwrap();
        assert_eq!(agg.count_consecutive_misses(today), 0);
    }

    #[test]
    fn misses_count_days_since_latest_check_in_for_daily_trackers() {
        let t = tracker(TrackerFrequency::Daily);
        let today = Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap().date_naive();
        let check_ins = vec![check_in_on(
            &t,
            today - chrono::Duration::days(4),
            CheckInStatus::Skipped,
        )];
        let agg = TrackerAggregate::new(t, check_ins).unwrap();
        assert_eq!(agg.count_consecutive_misses(today), 4);
    }

    #[test]
    fn pending_check_ins_are_considered_for_duplicate_detection() {
        // The deliberate deviation from the prior persisted-only check: a
        // second command against the same pending aggregate must still fail.
        let t = tracker(TrackerFrequency::Daily);
        let today = Utc.with_ymd_and_hms(2026, 2, 12, 0, 0, 0).unwrap().date_naive();
        let mut agg = TrackerAggregate::new(t, vec![]).unwrap();
        agg.skip(today).unwrap();
        let err = agg.mark_completed(today).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateCheckIn { .. }));
    }
}
