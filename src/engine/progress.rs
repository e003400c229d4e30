use crate::config::Rewards;
use crate::engine::achievement::{evaluate, Evaluation};
use crate::engine::activity::{self, ActivityRecord, NewActivity};
use crate::engine::awards::{award_met, awarded_set, LevelUpEvent};
use crate::engine::catalog;
use crate::engine::clock::Clock;
use crate::engine::error::Result;
use crate::engine::goals;
use crate::engine::levels::{level_of, next_threshold, LevelTier};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayReport {
    pub day: NaiveDate,
    pub evaluation: Evaluation,
    pub awarded: BTreeSet<String>,
    pub newly_awarded: Vec<String>,
    pub deferred: Vec<String>,
    pub total_xp: i64,
    pub level: LevelTier,
    pub next_threshold: Option<i64>,
    pub level_up: Option<LevelUpEvent>,
}

/// Re-evaluates `day` in full and pays any goal that became met.
pub fn refresh_day(
    conn: &Connection,
    clock: &dyn Clock,
    rewards: &Rewards,
    student_id: &str,
    day: NaiveDate,
) -> Result<DayReport> {
    let goals = goals::get_day(conn, student_id, day)?;
    let records = activity::list_for_student(conn, student_id, Some(day))?;
    let exercises = catalog::list(conn)?;
    let evaluation = evaluate(&goals, &records, &exercises, day);

    let outcome = award_met(
        conn,
        rewards.goal_xp,
        student_id,
        day,
        &evaluation.met,
        clock.now(),
    )?;
    let awarded = awarded_set(conn, student_id, day)?;

    Ok(DayReport {
        day,
        evaluation,
        awarded,
        newly_awarded: outcome.newly_awarded,
        deferred: outcome.deferred,
        total_xp: outcome.total_xp,
        level: *level_of(outcome.total_xp),
        next_threshold: next_threshold(outcome.total_xp),
        level_up: outcome.level_up,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedActivity {
    pub record: ActivityRecord,
    /// Present when the record falls on today; back-dated records never pay.
    pub report: Option<DayReport>,
}

pub fn log_activity(
    conn: &Connection,
    clock: &dyn Clock,
    rewards: &Rewards,
    new: &NewActivity,
) -> Result<LoggedActivity> {
    let record = activity::insert(conn, new, clock.now())?;
    let today = clock.today();
    let report = if record.logged_on == today {
        Some(refresh_day(conn, clock, rewards, &record.student_id, today)?)
    } else {
        None
    };
    Ok(LoggedActivity { record, report })
}
