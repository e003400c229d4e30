use crate::db::{with_immediate_tx, DAY_FORMAT, TIMESTAMP_FORMAT};
use crate::engine::catalog::{self, Metric};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A daily target in exactly one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", content = "target", rename_all = "camelCase")]
pub enum GoalTarget {
    Count(i64),
    /// Seconds.
    Duration(i64),
    Steps(i64),
}

impl GoalTarget {
    pub fn metric(self) -> Metric {
        match self {
            GoalTarget::Count(_) => Metric::Count,
            GoalTarget::Duration(_) => Metric::Duration,
            GoalTarget::Steps(_) => Metric::Steps,
        }
    }

    pub fn amount(self) -> i64 {
        match self {
            GoalTarget::Count(n) | GoalTarget::Duration(n) | GoalTarget::Steps(n) => n,
        }
    }

    pub fn from_parts(metric: Metric, amount: i64) -> GoalTarget {
        match metric {
            Metric::Count => GoalTarget::Count(amount),
            Metric::Duration => GoalTarget::Duration(amount),
            Metric::Steps => GoalTarget::Steps(amount),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGoals {
    pub targets: BTreeMap<String, GoalTarget>,
    pub skipped: BTreeSet<String>,
}

impl DayGoals {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.skipped.is_empty()
    }
}

pub fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT)
        .map_err(|_| EngineError::bad_input("day must be YYYY-MM-DD"))
}

fn validate(conn: &Connection, goals: &DayGoals) -> Result<()> {
    for (exercise_id, target) in &goals.targets {
        if target.amount() < 0 {
            return Err(EngineError::bad_input(format!(
                "target for {} must not be negative",
                exercise_id
            )));
        }
        if target.amount() > 0 && goals.skipped.contains(exercise_id) {
            return Err(EngineError::bad_input(format!(
                "{} cannot have a target and be skipped",
                exercise_id
            )));
        }
        let Some(exercise) = catalog::get(conn, exercise_id)? else {
            return Err(EngineError::bad_input(format!("unknown exercise {}", exercise_id)));
        };
        if !exercise.declares(target.metric()) {
            return Err(EngineError::bad_input(format!(
                "{} is not measured in {}",
                exercise_id,
                target.metric().as_str()
            )));
        }
    }
    for exercise_id in &goals.skipped {
        if catalog::get(conn, exercise_id)?.is_none() {
            return Err(EngineError::bad_input(format!("unknown exercise {}", exercise_id)));
        }
    }
    Ok(())
}

/// Replaces the ledger entry for one day. Rows of other days are not read
/// or written, so concurrent writes to different days both survive.
pub fn set_day(
    conn: &Connection,
    clock: &dyn Clock,
    student_id: &str,
    day: NaiveDate,
    goals: &DayGoals,
) -> Result<()> {
    let day_key = day.format(DAY_FORMAT).to_string();
    let stamp = clock.now().format(TIMESTAMP_FORMAT).to_string();
    with_immediate_tx(conn, |tx| {
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(EngineError::not_found("student"));
        }
        validate(tx, goals)?;

        tx.execute(
            "INSERT INTO goal_days(student_id, day, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(student_id, day) DO UPDATE SET updated_at = excluded.updated_at",
            (student_id, &day_key, &stamp),
        )?;
        tx.execute(
            "DELETE FROM goal_targets WHERE student_id = ? AND day = ?",
            (student_id, &day_key),
        )?;
        tx.execute(
            "DELETE FROM goal_skips WHERE student_id = ? AND day = ?",
            (student_id, &day_key),
        )?;
        for (exercise_id, target) in &goals.targets {
            tx.execute(
                "INSERT INTO goal_targets(student_id, day, exercise_id, metric, target)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    student_id,
                    &day_key,
                    exercise_id,
                    target.metric().as_str(),
                    target.amount(),
                ),
            )?;
        }
        for exercise_id in &goals.skipped {
            tx.execute(
                "INSERT INTO goal_skips(student_id, day, exercise_id) VALUES(?, ?, ?)",
                (student_id, &day_key, exercise_id),
            )?;
        }
        Ok(())
    })?;
    tracing::debug!(
        student_id,
        day = %day_key,
        targets = goals.targets.len(),
        skipped = goals.skipped.len(),
        "goal day saved"
    );
    Ok(())
}

pub fn get_all(conn: &Connection, student_id: &str) -> Result<BTreeMap<NaiveDate, DayGoals>> {
    let mut ledger: BTreeMap<NaiveDate, DayGoals> = BTreeMap::new();

    let mut days = conn.prepare("SELECT day FROM goal_days WHERE student_id = ?")?;
    let day_keys = days
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for key in day_keys {
        if let Ok(day) = NaiveDate::parse_from_str(&key, DAY_FORMAT) {
            ledger.entry(day).or_default();
        }
    }

    let mut targets = conn.prepare(
        "SELECT day, exercise_id, metric, target FROM goal_targets WHERE student_id = ?",
    )?;
    let rows = targets
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (key, exercise_id, metric, target) in rows {
        let (Ok(day), Some(metric)) = (
            NaiveDate::parse_from_str(&key, DAY_FORMAT),
            Metric::parse(&metric),
        ) else {
            continue;
        };
        ledger
            .entry(day)
            .or_default()
            .targets
            .insert(exercise_id, GoalTarget::from_parts(metric, target));
    }

    let mut skips =
        conn.prepare("SELECT day, exercise_id FROM goal_skips WHERE student_id = ?")?;
    let rows = skips
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (key, exercise_id) in rows {
        if let Ok(day) = NaiveDate::parse_from_str(&key, DAY_FORMAT) {
            ledger.entry(day).or_default().skipped.insert(exercise_id);
        }
    }

    Ok(ledger)
}

pub fn get_day(conn: &Connection, student_id: &str, day: NaiveDate) -> Result<DayGoals> {
    let day_key = day.format(DAY_FORMAT).to_string();
    let mut out = DayGoals::default();

    let mut targets = conn.prepare(
        "SELECT exercise_id, metric, target FROM goal_targets WHERE student_id = ? AND day = ?",
    )?;
    let rows = targets
        .query_map((student_id, &day_key), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (exercise_id, metric, target) in rows {
        if let Some(metric) = Metric::parse(&metric) {
            out.targets
                .insert(exercise_id, GoalTarget::from_parts(metric, target));
        }
    }

    let mut skips = conn
        .prepare("SELECT exercise_id FROM goal_skips WHERE student_id = ? AND day = ?")?;
    out.skipped = skips
        .query_map((student_id, &day_key), |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;

    Ok(out)
}
