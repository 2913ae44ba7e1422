mod dose_log;
mod goals;
mod people;
mod plans;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::traits::{DoseLog, Goal, Person, PrescriptionPlan};

/// SQLite-backed structured store for persons, prescription plans, dose logs,
/// and goals. Timestamps are RFC 3339 TEXT so date comparisons work
/// lexicographically.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate(&pool).await?;

        Ok(Self { pool })
    }

    fn parse_ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn parse_ts_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
        raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    fn row_to_person(r: &sqlx::sqlite::SqliteRow) -> Person {
        Person {
            id: r.get("id"),
            username: r.get("username"),
            full_name: r.get("full_name"),
            family_info: r.get("family_info"),
            emergency_contact_name: r.get("emergency_contact_name"),
            emergency_contact_phone: r.get("emergency_contact_phone"),
            hobbies: r.get("hobbies"),
            active: r.get::<i64, _>("active") != 0,
            created_at: Self::parse_ts(&r.get::<String, _>("created_at")),
        }
    }

    fn row_to_plan(r: &sqlx::sqlite::SqliteRow) -> PrescriptionPlan {
        PrescriptionPlan {
            id: r.get("id"),
            person_id: r.get("person_id"),
            name: r.get("name"),
            times_per_day: r.get("times_per_day"),
            dose_times: r.get("dose_times"),
            instructions: r.get("instructions"),
            active: r.get::<i64, _>("active") != 0,
            window_start: Self::parse_ts(&r.get::<String, _>("window_start")),
            window_end: Self::parse_ts_opt(r.get("window_end")),
            created_at: Self::parse_ts(&r.get::<String, _>("created_at")),
        }
    }

    fn row_to_goal(r: &sqlx::sqlite::SqliteRow) -> Goal {
        Goal {
            id: r.get("id"),
            person_id: r.get("person_id"),
            text: r.get("text"),
            completed: r.get::<i64, _>("completed") != 0,
            created_at: Self::parse_ts(&r.get::<String, _>("created_at")),
            completed_at: Self::parse_ts_opt(r.get("completed_at")),
        }
    }

    fn row_to_dose_log(r: &sqlx::sqlite::SqliteRow) -> DoseLog {
        DoseLog {
            id: r.get("id"),
            plan_id: r.get("plan_id"),
            taken_at: Self::parse_ts(&r.get::<String, _>("taken_at")),
            slot: r.get("slot"),
        }
    }
}

/// Idempotent schema migration — safe to call on every startup.
async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            family_info TEXT,
            emergency_contact_name TEXT,
            emergency_contact_phone TEXT,
            hobbies TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            times_per_day INTEGER NOT NULL,
            dose_times TEXT,
            instructions TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            window_start TEXT NOT NULL,
            window_end TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (person_id) REFERENCES people(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_plans_person_active ON plans(person_id, active)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dose_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id INTEGER NOT NULL,
            taken_at TEXT NOT NULL,
            slot INTEGER,
            FOREIGN KEY (plan_id) REFERENCES plans(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dose_log_plan_time ON dose_log(plan_id, taken_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (person_id) REFERENCES people(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_goals_person_completed ON goals(person_id, completed)",
    )
    .execute(pool)
    .await?;

    info!("Structured store migration complete");
    Ok(())
}

/// UTC day bounds for the calendar day containing `now`, as RFC 3339 strings.
/// RFC 3339 with a fixed offset sorts lexicographically, so these bind
/// directly into range predicates.
pub(crate) fn day_bounds(now: DateTime<Utc>) -> (String, String) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    let end = start + chrono::Duration::days(1);
    (start.to_rfc3339(), end.to_rfc3339())
}
