use crate::db::{with_immediate_tx, TIMESTAMP_FORMAT};
use crate::engine::error::{EngineError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LikeAction {
    Like,
    Unlike,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub action: LikeAction,
    pub week: String,
    pub target_total_xp: i64,
    pub like_count: i64,
}

/// ISO week key, e.g. `2026-W20`.
pub fn week_key(date: NaiveDate) -> String {
    let w = date.iso_week();
    format!("{}-W{:02}", w.year(), w.week())
}

pub fn is_valid_week_key(raw: &str) -> bool {
    let Some((year, week)) = raw.split_once("-W") else {
        return false;
    };
    year.len() == 4
        && year.bytes().all(|b| b.is_ascii_digit())
        && week.len() == 2
        && matches!(week.parse::<u32>(), Ok(1..=53))
}

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Adds or removes `liker_id` from the target's likers for `week` and moves
/// `like_xp` on the target in the same transaction.
pub fn toggle_like(
    conn: &Connection,
    like_xp: i64,
    liker_id: &str,
    target_id: &str,
    week: &str,
    now: NaiveDateTime,
) -> Result<LikeToggle> {
    if liker_id == target_id {
        return Err(EngineError::InvalidTransition("cannot like yourself".into()));
    }
    if !is_valid_week_key(week) {
        return Err(EngineError::bad_input("week must be YYYY-Www"));
    }
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();

    let toggled = with_immediate_tx(conn, |tx| {
        if !student_exists(tx, target_id)? || !student_exists(tx, liker_id)? {
            return Err(EngineError::not_found("student"));
        }
        let paid: Option<i64> = tx
            .query_row(
                "SELECT xp FROM likes WHERE target_id = ? AND week_key = ? AND liker_id = ?",
                (target_id, week, liker_id),
                |r| r.get(0),
            )
            .optional()?;

        // Unlike reverses what this like paid, not the current reward amount.
        let action = if let Some(paid) = paid {
            tx.execute(
                "DELETE FROM likes WHERE target_id = ? AND week_key = ? AND liker_id = ?",
                (target_id, week, liker_id),
            )?;
            tx.execute(
                "UPDATE students SET total_xp = MAX(total_xp - ?, 0) WHERE id = ?",
                (paid, target_id),
            )?;
            LikeAction::Unlike
        } else {
            tx.execute(
                "INSERT INTO likes(target_id, week_key, liker_id, xp, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (target_id, week, liker_id, like_xp, &stamp),
            )?;
            tx.execute(
                "UPDATE students SET total_xp = total_xp + ? WHERE id = ?",
                (like_xp, target_id),
            )?;
            LikeAction::Like
        };

        let target_total_xp: i64 = tx.query_row(
            "SELECT total_xp FROM students WHERE id = ?",
            [target_id],
            |r| r.get(0),
        )?;
        let like_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM likes WHERE target_id = ? AND week_key = ?",
            (target_id, week),
            |r| r.get(0),
        )?;
        Ok(LikeToggle {
            action,
            week: week.to_string(),
            target_total_xp,
            like_count,
        })
    })?;

    tracing::info!(
        liker_id,
        target_id,
        week,
        action = ?toggled.action,
        total_xp = toggled.target_total_xp,
        "like toggled"
    );
    Ok(toggled)
}

pub fn likers(conn: &Connection, target_id: &str, week: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT liker_id FROM likes WHERE target_id = ? AND week_key = ?
         ORDER BY created_at, liker_id",
    )?;
    let rows = stmt
        .query_map((target_id, week), |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_db;
    use crate::engine::clock::{Clock, FixedClock};
    use crate::engine::students;

    fn setup() -> (Connection, FixedClock, String, String) {
        let conn = memory_db();
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2026, 5, 13).unwrap());
        let a = students::create(&conn, &clock, &students::sample("가람", 3, 2, 0)).unwrap();
        let b = students::create(&conn, &clock, &students::sample("나래", 3, 2, 100)).unwrap();
        (conn, clock, a.id, b.id)
    }

    #[test]
    fn week_keys_follow_iso_weeks() {
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2026, 5, 13).unwrap()), "2026-W20");
        // 2027-01-01 is a Friday and still belongs to 2026's last ISO week.
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()), "2026-W53");
        assert!(is_valid_week_key("2026-W07"));
        assert!(!is_valid_week_key("2026-W7"));
        assert!(!is_valid_week_key("2026-W54"));
    }

    #[test]
    fn toggle_twice_is_identity() {
        let (conn, clock, a, b) = setup();
        let week = week_key(clock.today());
        let first = toggle_like(&conn, 5, &a, &b, &week, clock.now()).unwrap();
        assert_eq!(first.action, LikeAction::Like);
        assert_eq!(first.target_total_xp, 105);
        assert_eq!(likers(&conn, &b, &week).unwrap(), vec![a.clone()]);

        let second = toggle_like(&conn, 5, &a, &b, &week, clock.now()).unwrap();
        assert_eq!(second.action, LikeAction::Unlike);
        assert_eq!(second.target_total_xp, 100);
        assert!(likers(&conn, &b, &week).unwrap().is_empty());
    }

    #[test]
    fn unlike_reverses_the_amount_the_like_paid() {
        let (conn, clock, a, b) = setup();
        let week = week_key(clock.today());
        toggle_like(&conn, 5, &a, &b, &week, clock.now()).unwrap();
        let unliked = toggle_like(&conn, 50, &a, &b, &week, clock.now()).unwrap();
        assert_eq!(unliked.action, LikeAction::Unlike);
        assert_eq!(unliked.target_total_xp, 100);

        toggle_like(&conn, 40, &a, &b, &week, clock.now()).unwrap();
        let again = toggle_like(&conn, 5, &a, &b, &week, clock.now()).unwrap();
        assert_eq!(again.target_total_xp, 100);
    }

    #[test]
    fn weeks_are_independent() {
        let (conn, clock, a, b) = setup();
        toggle_like(&conn, 5, &a, &b, "2026-W20", clock.now()).unwrap();
        let other = toggle_like(&conn, 5, &a, &b, "2026-W21", clock.now()).unwrap();
        assert_eq!(other.action, LikeAction::Like);
        assert_eq!(other.target_total_xp, 110);
        assert_eq!(other.like_count, 1);
    }

    #[test]
    fn self_like_changes_nothing() {
        let (conn, clock, a, _b) = setup();
        let res = toggle_like(&conn, 5, &a, &a, "2026-W20", clock.now());
        assert!(matches!(res, Err(EngineError::InvalidTransition(_))));
        assert_eq!(students::total_xp(&conn, &a).unwrap(), 0);
        assert!(likers(&conn, &a, "2026-W20").unwrap().is_empty());
    }

    #[test]
    fn unknown_target_is_not_found() {
        let (conn, clock, a, _b) = setup();
        let res = toggle_like(&conn, 5, &a, "ghost", "2026-W20", clock.now());
        assert!(matches!(res, Err(EngineError::NotFound(_))));
    }
}
