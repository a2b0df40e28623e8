//! Exercises schema-level constraints (uniqueness, cascades) directly
//! against the sqlite mirror of the schema, independent of the
//! Postgres-only repository code. Mirrors the legacy
//! `integration_sqlite_tests.rs` style of hitting SQL directly rather than
//! through a repository struct typed to `PgPool`.

mod support;

use support::sqlite::{seed_common_fixtures, setup_test_db};

#[tokio::test]
async fn duplicate_active_tracker_name_is_rejected() {
    let db = setup_test_db().await.unwrap();
    seed_common_fixtures(&db.pool).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO trackers (id, owner, tracker_type, name, frequency, active) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind("22222222-2222-2222-2222-222222222222")
    .bind("user-42")
    .bind("habit")
    .bind("exercise") // same name, different case, same owner, active
    .bind("daily")
    .bind(true)
    .execute(&db.pool)
    .await;

    assert!(result.is_err(), "duplicate active tracker name should violate the unique index");
}

#[tokio::test]
async fn inactive_duplicate_name_is_allowed() {
    let db = setup_test_db().await.unwrap();
    seed_common_fixtures(&db.pool).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO trackers (id, owner, tracker_type, name, frequency, active) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind("33333333-3333-3333-3333-333333333333")
    .bind("user-42")
    .bind("habit")
    .bind("Exercise")
    .bind("daily")
    .bind(false)
    .execute(&db.pool)
    .await;

    assert!(result.is_ok(), "the partial unique index only applies to active rows");
}

#[tokio::test]
async fn deleting_a_user_cascades_to_trackers() {
    let db = setup_test_db().await.unwrap();
    seed_common_fixtures(&db.pool).await.unwrap();

    sqlx::query("DELETE FROM users WHERE user_id = ?1")
        .bind("user-42")
        .execute(&db.pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trackers WHERE owner = ?1")
        .bind("user-42")
        .fetch_one(&db.pool)
        .await
        .unwrap();

    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn job_registry_insert_is_idempotent_via_on_conflict() {
    let db = setup_test_db().await.unwrap();
    seed_common_fixtures(&db.pool).await.unwrap();

    for _ in 0..2 {
        sqlx::query(
            "INSERT INTO job_registry (job_name, owner_user, chat_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (job_name) DO UPDATE SET chat_id = excluded.chat_id",
        )
        .bind("checkin_user-42")
        .bind("user-42")
        .bind("chat-1")
        .execute(&db.pool)
        .await
        .unwrap();
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_registry WHERE job_name = ?1")
        .bind("checkin_user-42")
        .fetch_one(&db.pool)
        .await
        .unwrap();

    assert_eq!(count, 1);
}
