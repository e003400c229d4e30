use crate::db::{with_immediate_tx, DAY_FORMAT, TIMESTAMP_FORMAT};
use crate::engine::error::Result;
use crate::engine::levels::{level_of, next_threshold, LevelTier};
use crate::engine::students;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpEvent {
    pub student_id: String,
    pub student_name: String,
    pub from: LevelTier,
    pub to: LevelTier,
    pub total_xp: i64,
    pub next_threshold: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardOutcome {
    pub newly_awarded: Vec<String>,
    /// Met goals whose XP write failed; they stay unawarded and are paid on
    /// a later pass.
    pub deferred: Vec<String>,
    pub total_xp: i64,
    pub level_up: Option<LevelUpEvent>,
}

pub fn awarded_set(
    conn: &Connection,
    student_id: &str,
    day: NaiveDate,
) -> Result<BTreeSet<String>> {
    let mut stmt =
        conn.prepare("SELECT exercise_id FROM xp_awards WHERE student_id = ? AND day = ?")?;
    let set = stmt
        .query_map((student_id, day.format(DAY_FORMAT).to_string()), |r| {
            r.get::<_, String>(0)
        })?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(set)
}

/// Pays `goal_xp` once for every exercise in `met` that has not been paid
/// for `day` yet.
///
/// The award row and the XP increment commit together, so an exercise is in
/// the awarded set iff its XP landed. A second client racing on the same
/// exercise hits the primary key and pays nothing.
pub fn award_met(
    conn: &Connection,
    goal_xp: i64,
    student_id: &str,
    day: NaiveDate,
    met: &BTreeSet<String>,
    now: NaiveDateTime,
) -> Result<AwardOutcome> {
    let already = awarded_set(conn, student_id, day)?;
    let day_key = day.format(DAY_FORMAT).to_string();
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();

    let mut outcome = AwardOutcome::default();
    let mut start_xp: Option<i64> = None;

    for exercise_id in met.difference(&already) {
        let paid = with_immediate_tx(conn, |tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO xp_awards(student_id, day, exercise_id, xp, awarded_at)
                 VALUES(?, ?, ?, ?, ?)",
                (student_id, &day_key, exercise_id, goal_xp, &stamp),
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            tx.execute(
                "UPDATE students SET total_xp = total_xp + ? WHERE id = ?",
                (goal_xp, student_id),
            )?;
            let total: Option<i64> = tx
                .query_row(
                    "SELECT total_xp FROM students WHERE id = ?",
                    [student_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(total)
        });
        match paid {
            Ok(Some(total)) => {
                start_xp.get_or_insert(total - goal_xp);
                outcome.total_xp = total;
                outcome.newly_awarded.push(exercise_id.clone());
                tracing::info!(
                    student_id,
                    exercise_id = %exercise_id,
                    day = %day_key,
                    total_xp = total,
                    "goal xp awarded"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    student_id,
                    exercise_id = %exercise_id,
                    error = %e,
                    "goal xp award deferred"
                );
                outcome.deferred.push(exercise_id.clone());
            }
        }
    }

    if start_xp.is_none() {
        outcome.total_xp = students::total_xp(conn, student_id)?;
    }

    if let Some(start) = start_xp {
        let from = *level_of(start);
        let to = *level_of(outcome.total_xp);
        if to.rank > from.rank {
            let student = students::require(conn, student_id)?;
            tracing::info!(student_id, from = from.name, to = to.name, "level up");
            outcome.level_up = Some(LevelUpEvent {
                student_id: student_id.to_string(),
                student_name: student.name,
                from,
                to,
                total_xp: outcome.total_xp,
                next_threshold: next_threshold(outcome.total_xp),
            });
        }
    }

    Ok(outcome)
}
