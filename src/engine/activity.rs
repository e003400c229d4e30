use crate::db::{DAY_FORMAT, TIMESTAMP_FORMAT};
use crate::engine::catalog::{self, Metric};
use crate::engine::error::{EngineError, Result};
use crate::engine::students;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// An append-only fact. Only `photo_url` may be set afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub student_id: String,
    pub exercise_id: String,
    pub logged_at: NaiveDateTime,
    pub logged_on: NaiveDate,
    pub count: Option<i64>,
    pub duration_sec: Option<i64>,
    pub steps: Option<i64>,
    pub photo_url: Option<String>,
}

impl ActivityRecord {
    pub fn quantity(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Count => self.count,
            Metric::Duration => self.duration_sec,
            Metric::Steps => self.steps,
        }
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub student_id: String,
    pub exercise_id: String,
    pub logged_at: Option<NaiveDateTime>,
    pub count: Option<i64>,
    pub duration_sec: Option<i64>,
    pub steps: Option<i64>,
}

const RECORD_COLUMNS: &str =
    "id, student_id, exercise_id, logged_at, logged_on, count, duration_sec, steps, photo_url";

fn row_to_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityRecord> {
    let logged_at: String = r.get(3)?;
    let logged_on: String = r.get(4)?;
    let logged_at = NaiveDateTime::parse_from_str(&logged_at, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let logged_on = NaiveDate::parse_from_str(&logged_on, DAY_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ActivityRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        exercise_id: r.get(2)?,
        logged_at,
        logged_on,
        count: r.get(5)?,
        duration_sec: r.get(6)?,
        steps: r.get(7)?,
        photo_url: r.get(8)?,
    })
}

/// Upper bound for a single quantity in one record.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Validates and appends one record. `now` is used when the caller did not
/// supply a timestamp.
pub fn insert(conn: &Connection, new: &NewActivity, now: NaiveDateTime) -> Result<ActivityRecord> {
    students::require(conn, &new.student_id)?;
    let Some(exercise) = catalog::get(conn, &new.exercise_id)? else {
        return Err(EngineError::bad_input(format!("unknown exercise {}", new.exercise_id)));
    };

    let quantities = [
        (Metric::Count, new.count),
        (Metric::Duration, new.duration_sec),
        (Metric::Steps, new.steps),
    ];
    let mut any = false;
    for (metric, value) in quantities {
        let Some(v) = value else { continue };
        if v < 0 {
            return Err(EngineError::bad_input(format!(
                "{} must not be negative",
                metric.as_str()
            )));
        }
        if v > MAX_QUANTITY {
            return Err(EngineError::bad_input(format!(
                "{} must be at most {}",
                metric.as_str(),
                MAX_QUANTITY
            )));
        }
        if !exercise.declares(metric) {
            return Err(EngineError::bad_input(format!(
                "{} is not measured in {}",
                exercise.id,
                metric.as_str()
            )));
        }
        any = true;
    }
    if !any {
        return Err(EngineError::bad_input("record needs at least one quantity"));
    }

    let logged_at = new.logged_at.unwrap_or(now);
    let logged_at = logged_at.with_nanosecond(0).unwrap_or(logged_at);
    if logged_at.date() > now.date() {
        return Err(EngineError::bad_input("loggedAt must not be after today"));
    }
    let record = ActivityRecord {
        id: Uuid::new_v4().to_string(),
        student_id: new.student_id.clone(),
        exercise_id: exercise.id,
        logged_at,
        logged_on: logged_at.date(),
        count: new.count,
        duration_sec: new.duration_sec,
        steps: new.steps,
        photo_url: None,
    };
    conn.execute(
        "INSERT INTO activity_records(
             id, student_id, exercise_id, logged_at, logged_on, count, duration_sec, steps
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.exercise_id,
            record.logged_at.format(TIMESTAMP_FORMAT).to_string(),
            record.logged_on.format(DAY_FORMAT).to_string(),
            record.count,
            record.duration_sec,
            record.steps,
        ),
    )?;
    Ok(record)
}

pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    day: Option<NaiveDate>,
) -> Result<Vec<ActivityRecord>> {
    let sql = format!(
        "SELECT {} FROM activity_records
         WHERE student_id = ?1 AND (?2 IS NULL OR logged_on = ?2)
         ORDER BY logged_at, id",
        RECORD_COLUMNS
    );
    let day_key = day.map(|d| d.format(DAY_FORMAT).to_string());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, day_key), row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_for_class(
    conn: &Connection,
    grade: i64,
    section: i64,
    day: NaiveDate,
) -> Result<Vec<ActivityRecord>> {
    let cols = RECORD_COLUMNS
        .split(", ")
        .map(|c| format!("a.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM activity_records a
         JOIN students s ON s.id = a.student_id
         WHERE s.grade = ? AND s.section = ? AND a.logged_on = ?
         ORDER BY a.logged_at, a.id",
        cols
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (grade, section, day.format(DAY_FORMAT).to_string()),
            row_to_record,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn distinct_days(conn: &Connection, student_id: &str) -> Result<BTreeSet<NaiveDate>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT logged_on FROM activity_records WHERE student_id = ?")?;
    let keys = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(keys
        .iter()
        .filter_map(|k| NaiveDate::parse_from_str(k, DAY_FORMAT).ok())
        .collect())
}

pub fn attach_photo(conn: &Connection, record_id: &str, photo_url: &str) -> Result<()> {
    let url = photo_url.trim();
    if url.is_empty() {
        return Err(EngineError::bad_input("photoUrl must not be empty"));
    }
    let changed = conn.execute(
        "UPDATE activity_records SET photo_url = ? WHERE id = ?",
        (url, record_id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("activity record"));
    }
    Ok(())
}
