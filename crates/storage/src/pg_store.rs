//! `Store` (C2) over a `sqlx::PgPool`. One method per query/command
//! primitive named in §4.2, each wrapped in the narrowest transaction that
//! preserves atomicity — mirrors the legacy sync repository's
//! `pool.begin()`/`tx.commit()` pattern for multi-table writes.

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use accord_domain::{
    AccountabilityProfile, CelebrationStyle, CheckIn, CheckInStatus, DomainError,
    LifeWeeksDestination, LifeWeeksSettings, NoteType, Personality, Rating, SrsCard, Store,
    StoreTx, Tracker, TrackerFrequency, TrackerType,
};

use crate::error::StorageError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_tracker_type(s: &str) -> TrackerType {
    match s {
        "medication" => TrackerType::Medication,
        "value" => TrackerType::Value,
        "commitment" => TrackerType::Commitment,
        _ => TrackerType::Habit,
    }
}

fn parse_frequency(s: &str) -> TrackerFrequency {
    match s {
        "weekly" => TrackerFrequency::Weekly,
        "custom" => TrackerFrequency::Custom,
        _ => TrackerFrequency::Daily,
    }
}

fn parse_personality(s: &str) -> Personality {
    match s {
        "gentle" => Personality::Gentle,
        "direct" => Personality::Direct,
        "assertive" => Personality::Assertive,
        "tough_love" => Personality::ToughLove,
        _ => Personality::Supportive,
    }
}

fn parse_celebration_style(s: &str) -> CelebrationStyle {
    match s {
        "quiet" => CelebrationStyle::Quiet,
        "enthusiastic" => CelebrationStyle::Enthusiastic,
        _ => CelebrationStyle::Moderate,
    }
}

fn parse_life_weeks_destination(s: &str) -> LifeWeeksDestination {
    match s {
        "journal_folder" => LifeWeeksDestination::JournalFolder,
        "chat" => LifeWeeksDestination::Chat,
        "custom" => LifeWeeksDestination::Custom,
        _ => LifeWeeksDestination::DailyNote,
    }
}

fn weekday_from_num(n: i16) -> Weekday {
    match n.rem_euclid(7) {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

fn accountability_profile_from_row(
    row: &sqlx::postgres::PgRow,
) -> Result<AccountabilityProfile, sqlx::Error> {
    Ok(AccountabilityProfile {
        user_id: row.try_get("user_id")?,
        personality: parse_personality(row.try_get::<String, _>("personality")?.as_str()),
        struggle_threshold: row.try_get("struggle_threshold")?,
        celebration_style: parse_celebration_style(
            row.try_get::<String, _>("celebration_style")?.as_str(),
        ),
        voice_override: row.try_get("voice_override")?,
        check_time: row.try_get("check_time")?,
    })
}

fn life_weeks_settings_from_row(
    row: &sqlx::postgres::PgRow,
) -> Result<LifeWeeksSettings, sqlx::Error> {
    let weekday_num: i16 = row.try_get("weekday")?;
    Ok(LifeWeeksSettings {
        user_id: row.try_get("user_id")?,
        enabled: row.try_get("enabled")?,
        date_of_birth: row.try_get("date_of_birth")?,
        time_of_day: row.try_get("time_of_day")?,
        weekday: weekday_from_num(weekday_num),
        destination: parse_life_weeks_destination(
            row.try_get::<String, _>("destination")?.as_str(),
        ),
        custom_path: row.try_get("custom_path")?,
    })
}

fn status_str(s: CheckInStatus) -> &'static str {
    match s {
        CheckInStatus::Completed => "completed",
        CheckInStatus::Skipped => "skipped",
        CheckInStatus::Partial => "partial",
    }
}

fn parse_status(s: &str) -> CheckInStatus {
    match s {
        "skipped" => CheckInStatus::Skipped,
        "partial" => CheckInStatus::Partial,
        _ => CheckInStatus::Completed,
    }
}

fn note_type_str(t: NoteType) -> &'static str {
    match t {
        NoteType::Idea => "idea",
        NoteType::Trail => "trail",
        NoteType::Moc => "moc",
        NoteType::Other => "other",
    }
}

fn parse_note_type(s: &str) -> NoteType {
    match s {
        "trail" => NoteType::Trail,
        "moc" => NoteType::Moc,
        "other" => NoteType::Other,
        _ => NoteType::Idea,
    }
}

fn tracker_from_row(row: &sqlx::postgres::PgRow) -> Result<Tracker, sqlx::Error> {
    Ok(Tracker {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        tracker_type: parse_tracker_type(row.try_get::<String, _>("tracker_type")?.as_str()),
        name: row.try_get("name")?,
        frequency: parse_frequency(row.try_get::<String, _>("frequency")?.as_str()),
        check_time: row.try_get("check_time")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn check_in_from_row(row: &sqlx::postgres::PgRow) -> Result<CheckIn, sqlx::Error> {
    Ok(CheckIn {
        id: row.try_get("id")?,
        tracker_id: row.try_get("tracker_id")?,
        owner: row.try_get("owner")?,
        status: parse_status(row.try_get::<String, _>("status")?.as_str()),
        created_at: row.try_get("created_at")?,
        note: row.try_get("note")?,
    })
}

fn card_from_row(row: &sqlx::postgres::PgRow) -> Result<SrsCard, sqlx::Error> {
    Ok(SrsCard {
        id: row.try_get("id")?,
        note_path: row.try_get("note_path")?,
        note_type: parse_note_type(row.try_get::<String, _>("note_type")?.as_str()),
        title: row.try_get("title")?,
        srs_enabled: row.try_get("srs_enabled")?,
        next_review_date: row.try_get("next_review_date")?,
        last_review_date: row.try_get("last_review_date")?,
        interval_days: row.try_get("interval_days")?,
        ease_factor: row.try_get("ease_factor")?,
        repetitions: row.try_get("repetitions")?,
        is_due: row.try_get("is_due")?,
        total_reviews: row.try_get("total_reviews")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DomainError> {
        let tx: DomainError = match self.pool.begin().await {
            Ok(tx) => return Ok(Box::new(PgStoreTx { tx })),
            Err(e) => StorageError::Connection(e).into(),
        };
        Err(tx)
    }

    async fn active_trackers_for_user(&self, user_id: &str) -> Result<Vec<Tracker>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, owner, tracker_type, name, frequency, check_time, active, created_at \
             FROM trackers WHERE owner = $1 AND active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        rows.iter()
            .map(|r| tracker_from_row(r).map_err(StorageError::Query))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn completed_check_ins_for(
        &self,
        user_id: &str,
        tracker_id: Uuid,
    ) -> Result<Vec<CheckIn>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, tracker_id, owner, status, created_at, note FROM check_ins \
             WHERE owner = $1 AND tracker_id = $2 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(tracker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        rows.iter()
            .map(|r| check_in_from_row(r).map_err(StorageError::Query))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn card_by_note_path(&self, note_path: &str) -> Result<SrsCard, DomainError> {
        let row = sqlx::query(
            "SELECT id, note_path, note_type, title, srs_enabled, next_review_date, \
             last_review_date, interval_days, ease_factor, repetitions, is_due, total_reviews \
             FROM srs_cards WHERE note_path = $1",
        )
        .bind(note_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?
        .ok_or_else(|| DomainError::not_found("SrsCard", note_path))?;

        card_from_row(&row).map_err(|e| StorageError::Query(e).into())
    }

    async fn card_by_id(&self, id: Uuid) -> Result<SrsCard, DomainError> {
        let row = sqlx::query(
            "SELECT id, note_path, note_type, title, srs_enabled, next_review_date, \
             last_review_date, interval_days, ease_factor, repetitions, is_due, total_reviews \
             FROM srs_cards WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?
        .ok_or_else(|| DomainError::not_found("SrsCard", id))?;

        card_from_row(&row).map_err(|e| StorageError::Query(e).into())
    }

    async fn due_cards(
        &self,
        today: NaiveDate,
        limit: usize,
        note_type: Option<NoteType>,
    ) -> Result<Vec<SrsCard>, DomainError> {
        let rows = match note_type {
            Some(nt) => sqlx::query(
                "SELECT id, note_path, note_type, title, srs_enabled, next_review_date, \
                 last_review_date, interval_days, ease_factor, repetitions, is_due, total_reviews \
                 FROM srs_cards WHERE srs_enabled AND next_review_date <= $1 AND note_type = $2 \
                 ORDER BY next_review_date ASC LIMIT $3",
            )
            .bind(today)
            .bind(note_type_str(nt))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT id, note_path, note_type, title, srs_enabled, next_review_date, \
                 last_review_date, interval_days, ease_factor, repetitions, is_due, total_reviews \
                 FROM srs_cards WHERE srs_enabled AND next_review_date <= $1 \
                 ORDER BY next_review_date ASC LIMIT $2",
            )
            .bind(today)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(StorageError::Query)?;

        rows.iter()
            .map(|r| card_from_row(r).map_err(StorageError::Query))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn accountability_profiles(&self) -> Result<Vec<AccountabilityProfile>, DomainError> {
        let rows = sqlx::query(
            "SELECT user_id, personality, struggle_threshold, celebration_style, \
             voice_override, check_time FROM accountability_profiles",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        rows.iter()
            .map(|r| accountability_profile_from_row(r).map_err(StorageError::Query))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn life_weeks_settings_for_enabled_users(
        &self,
    ) -> Result<Vec<LifeWeeksSettings>, DomainError> {
        let rows = sqlx::query(
            "SELECT user_id, enabled, date_of_birth, time_of_day, weekday, destination, \
             custom_path FROM life_weeks_settings WHERE enabled",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        rows.iter()
            .map(|r| life_weeks_settings_from_row(r).map_err(StorageError::Query))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn erase_user(&self, user_id: &str) -> Result<(), DomainError> {
        // Cascading FKs (ON DELETE CASCADE) remove trackers, check-ins,
        // privacy/accountability/life-weeks settings, and job_registry rows.
        // SRS cards are vault-shared and are never touched here (§3).
        sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn card_by_note_path(&mut self, note_path: &str) -> Result<SrsCard, DomainError> {
        let row = sqlx::query(
            "SELECT id, note_path, note_type, title, srs_enabled, next_review_date, \
             last_review_date, interval_days, ease_factor, repetitions, is_due, total_reviews \
             FROM srs_cards WHERE note_path = $1 FOR UPDATE",
        )
        .bind(note_path)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StorageError::Query)?
        .ok_or_else(|| DomainError::not_found("SrsCard", note_path))?;

        card_from_row(&row).map_err(|e| StorageError::Query(e).into())
    }

    async fn upsert_card(&mut self, card: &SrsCard) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO srs_cards (id, note_path, note_type, title, srs_enabled, \
             next_review_date, last_review_date, interval_days, ease_factor, repetitions, \
             is_due, total_reviews) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
             ON CONFLICT (note_path) DO UPDATE SET \
               note_type = EXCLUDED.note_type, title = EXCLUDED.title, \
               srs_enabled = EXCLUDED.srs_enabled, next_review_date = EXCLUDED.next_review_date, \
               last_review_date = EXCLUDED.last_review_date, interval_days = EXCLUDED.interval_days, \
               ease_factor = EXCLUDED.ease_factor, repetitions = EXCLUDED.repetitions, \
               is_due = EXCLUDED.is_due, total_reviews = EXCLUDED.total_reviews",
        )
        .bind(card.id)
        .bind(&card.note_path)
        .bind(note_type_str(card.note_type))
        .bind(&card.title)
        .bind(card.srs_enabled)
        .bind(card.next_review_date)
        .bind(card.last_review_date)
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.repetitions)
        .bind(card.is_due)
        .bind(card.total_reviews)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn update_card(&mut self, card: &SrsCard) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE srs_cards SET next_review_date = $1, last_review_date = $2, \
             interval_days = $3, ease_factor = $4, repetitions = $5, is_due = $6, \
             total_reviews = $7 WHERE id = $8",
        )
        .bind(card.next_review_date)
        .bind(card.last_review_date)
        .bind(card.interval_days)
        .bind(card.ease_factor)
        .bind(card.repetitions)
        .bind(card.is_due)
        .bind(card.total_reviews)
        .bind(card.id)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn append_review_history(
        &mut self,
        card_id: Uuid,
        rating: Rating,
        interval_before: i64,
        interval_after: i64,
        ease_before: f64,
        ease_after: f64,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO review_history \
             (id, card_id, rating, interval_before, interval_after, ease_before, ease_after) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(Uuid::new_v4())
        .bind(card_id)
        .bind(rating.as_u8() as i16)
        .bind(interval_before)
        .bind(interval_after)
        .bind(ease_before)
        .bind(ease_after)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn insert_check_in(&mut self, check_in: &CheckIn) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO check_ins (id, tracker_id, owner, status, created_at, note) \
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(check_in.id)
        .bind(check_in.tracker_id)
        .bind(&check_in.owner)
        .bind(status_str(check_in.status))
        .bind(check_in.created_at)
        .bind(&check_in.note)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(StorageError::Query)?;
        Ok(())
    }
}
