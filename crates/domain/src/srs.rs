//! SM-2 spaced-repetition math and the engine composing it with persistence
//! (§4.5). Grounded on the exact algorithm implemented by the legacy
//! `srs_algorithm.py`: the `(rating == 0)` special case, the `reps == 0 → 1`
//! / `reps == 1 → 3` interval steps, and the ease-adjustment formula below.

use chrono::NaiveDate;
use rand::Rng;

use crate::entities::{NoteType, Rating, SrsCard};
use crate::error::DomainError;
use crate::ports::{Store, Vault};

pub const MIN_EASE_FACTOR: f64 = 1.3;
const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// The six vault metadata keys the SRS engine reads and writes (§4.3).
pub struct VaultPatch {
    pub srs_enabled: bool,
    pub srs_next_review: NaiveDate,
    pub srs_last_review: NaiveDate,
    pub srs_interval: i64,
    pub srs_ease_factor: f64,
    pub srs_repetitions: i64,
}

/// Result of applying a rating to a card's SM-2 state, independent of any
/// particular card or storage (§4.5, §8 SM-2 round-trip property).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingOutcome {
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    pub next_review_date: NaiveDate,
}

/// Pure SM-2 step: no I/O, deterministic given its inputs.
pub fn apply_rating(
    rating: Rating,
    ease_factor: f64,
    interval_days: i64,
    repetitions: i64,
    today: NaiveDate,
) -> RatingOutcome {
    if rating == Rating::Again {
        return RatingOutcome {
            interval_days: 1,
            ease_factor,
            repetitions: 0,
            next_review_date: today + chrono::Duration::days(1),
        };
    }

    let new_repetitions = repetitions + 1;
    let new_interval = if repetitions == 0 {
        1
    } else if repetitions == 1 {
        3
    } else {
        (interval_days as f64 * ease_factor).floor() as i64
    };

    let r = rating.as_u8() as f64;
    let ease_adjustment = 0.1 - (3.0 - r) * (0.08 + (3.0 - r) * 0.02);
    let new_ease = (ease_factor + ease_adjustment).max(MIN_EASE_FACTOR);

    RatingOutcome {
        interval_days: new_interval,
        ease_factor: new_ease,
        repetitions: new_repetitions,
        next_review_date: today + chrono::Duration::days(new_interval),
    }
}

/// Composes the pure SM-2 step with persistence across a Store and a Vault.
pub struct SrsEngine<S, V> {
    store: S,
    vault: V,
}

impl<S: Store, V: Vault> SrsEngine<S, V> {
    pub fn new(store: S, vault: V) -> Self {
        Self { store, vault }
    }

    /// Runs inside one transaction: loads the card, computes new values,
    /// appends a ReviewHistory row, updates the card, writes the six
    /// metadata keys back to the vault. Either all of these commit or none
    /// do (§4.5).
    pub async fn rate(
        &self,
        note_path: &str,
        rating: Rating,
        today: NaiveDate,
    ) -> Result<SrsCard, DomainError> {
        let mut tx = self.store.begin().await?;
        let card = tx.card_by_note_path(note_path).await?;

        let outcome = apply_rating(
            rating,
            card.ease_factor,
            card.interval_days,
            card.repetitions,
            today,
        );

        tx.append_review_history(
            card.id,
            rating,
            card.interval_days,
            outcome.interval_days,
            card.ease_factor,
            outcome.ease_factor,
        )
        .await?;

        let mut updated = card.clone();
        updated.interval_days = outcome.interval_days;
        updated.ease_factor = outcome.ease_factor;
        updated.repetitions = outcome.repetitions;
        updated.next_review_date = outcome.next_review_date;
        updated.last_review_date = Some(today);
        updated.is_due = false;
        updated.total_reviews += 1;

        tx.update_card(&updated).await?;
        tx.commit().await?;

        self.vault
            .update_metadata(
                note_path,
                &VaultPatch {
                    srs_enabled: updated.srs_enabled,
                    srs_next_review: updated.next_review_date,
                    srs_last_review: today,
                    srs_interval: updated.interval_days,
                    srs_ease_factor: updated.ease_factor,
                    srs_repetitions: updated.repetitions,
                },
            )
            .await?;

        Ok(updated)
    }

    /// Resolves a card by its opaque id, so an inbound action token never
    /// needs to carry a note path (§4.10, §6, §9).
    pub async fn card_by_id(&self, id: uuid::Uuid) -> Result<SrsCard, DomainError> {
        self.store.card_by_id(id).await
    }

    /// Cards with `srs_enabled ∧ next_review_date ≤ today`, ascending by
    /// `next_review_date`, optionally filtered by type, capped at `limit`.
    pub async fn due_cards(
        &self,
        today: NaiveDate,
        limit: usize,
        note_type: Option<NoteType>,
    ) -> Result<Vec<SrsCard>, DomainError> {
        self.store.due_cards(today, limit, note_type).await
    }

    /// Walks the vault, upserts a card row per eligible file, recomputes
    /// `is_due`, never deletes rows for files that disappeared.
    pub async fn sync_vault(&self, today: NaiveDate) -> Result<usize, DomainError> {
        let files = self.vault.list_files("").await?;
        let mut synced = 0usize;

        for path in files {
            let (metadata, _body) = self.vault.read(&path).await?;
            if !metadata.is_srs_eligible() {
                continue;
            }

            let mut tx = self.store.begin().await?;
            let existing = tx.card_by_note_path(&path).await.ok();

            let mut card = existing.unwrap_or_else(|| SrsCard {
                id: uuid::Uuid::new_v4(),
                note_path: path.clone(),
                note_type: metadata.note_type.unwrap_or(NoteType::Other),
                title: metadata.title.clone().unwrap_or_else(|| path.clone()),
                srs_enabled: metadata.srs_enabled,
                next_review_date: metadata.srs_next_review.unwrap_or(today),
                last_review_date: metadata.srs_last_review,
                interval_days: metadata.srs_interval.unwrap_or(1),
                ease_factor: metadata.srs_ease_factor.unwrap_or(DEFAULT_EASE_FACTOR),
                repetitions: metadata.srs_repetitions.unwrap_or(0),
                is_due: false,
                total_reviews: 0,
            });

            card.is_due = card.srs_enabled && card.next_review_date <= today;
            tx.upsert_card(&card).await?;
            tx.commit().await?;
            synced += 1;
        }

        Ok(synced)
    }

    /// Assigns newly discovered ideas a random initial interval in `[1, 30]`
    /// days so the stream is not bursty; ease = 2.5, repetitions = 0 (§4.5).
    pub async fn seed(
        &self,
        note_path: &str,
        note_type: NoteType,
        title: &str,
        today: NaiveDate,
        rng: &mut impl Rng,
    ) -> Result<SrsCard, DomainError> {
        let interval = rng.gen_range(1..=30);
        let card = SrsCard {
            id: uuid::Uuid::new_v4(),
            note_path: note_path.to_string(),
            note_type,
            title: title.to_string(),
            srs_enabled: true,
            next_review_date: today + chrono::Duration::days(interval),
            last_review_date: None,
            interval_days: interval,
            ease_factor: DEFAULT_EASE_FACTOR,
            repetitions: 0,
            is_due: false,
            total_reviews: 0,
        };

        let mut tx = self.store.begin().await?;
        tx.upsert_card(&card).await?;
        tx.commit().await?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn again_resets_interval_and_repetitions() {
        let out = apply_rating(Rating::Again, 2.1, 10, 4, date(2026, 2, 12));
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.repetitions, 0);
        assert_eq!(out.ease_factor, 2.1);
        assert_eq!(out.next_review_date, date(2026, 2, 13));
    }

    #[test]
    fn good_rating_from_fresh_card_schedules_three_days() {
        // Scenario 6: (ease=2.5, interval=1, reps=0, next_review=today),
        // rating 2 (Good) -> reps=1, interval=3, ease approx 2.5.
        let out = apply_rating(Rating::Good, 2.5, 1, 0, date(2026, 2, 12));
        assert_eq!(out.repetitions, 1);
        assert_eq!(out.interval_days, 3);
        assert!((out.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(out.next_review_date, date(2026, 2, 15));
    }

    #[test]
    fn second_good_rating_multiplies_by_ease() {
        let out = apply_rating(Rating::Good, 2.5, 3, 1, date(2026, 2, 12));
        assert_eq!(out.repetitions, 2);
        assert_eq!(out.interval_days, 7); // floor(3 * 2.5) = 7
    }

    #[test]
    fn ease_never_drops_below_minimum() {
        let out = apply_rating(Rating::Hard, MIN_EASE_FACTOR, 5, 3, date(2026, 2, 12));
        assert!(out.ease_factor >= MIN_EASE_FACTOR);
    }

    proptest! {
        #[test]
        fn sm2_round_trip_never_violates_floors(
            ease in 1.3f64..3.5,
            interval in 1i64..400,
            reps in 0i64..50,
            rating_code in 1u8..=3,
        ) {
            let rating = Rating::from_u8(rating_code).unwrap();
            let out = apply_rating(rating, ease, interval, reps, date(2026, 1, 1));
            prop_assert!(out.ease_factor >= MIN_EASE_FACTOR);
            prop_assert!(out.interval_days >= 1);
        }

        #[test]
        fn again_always_yields_interval_one_and_zero_repetitions(
            ease in 1.3f64..3.5,
            interval in 1i64..400,
            reps in 0i64..50,
        ) {
            let out = apply_rating(Rating::Again, ease, interval, reps, date(2026, 1, 1));
            prop_assert_eq!(out.interval_days, 1);
            prop_assert_eq!(out.repetitions, 0);
        }
    }
}
