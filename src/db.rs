use crate::engine::error::{EngineError, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "fitquest.sqlite3";

/// Attempts made by `with_immediate_tx` before reporting `Busy`.
pub const TX_MAX_ATTEMPTS: u32 = 5;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    // Several sidecars may share one workspace; let writers queue briefly
    // before the retry loop takes over.
    conn.busy_timeout(Duration::from_millis(1000))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade INTEGER NOT NULL,
            section INTEGER NOT NULL,
            gender TEXT NOT NULL,
            avatar TEXT,
            pin_hash TEXT NOT NULL,
            total_xp INTEGER NOT NULL DEFAULT 0 CHECK(total_xp >= 0),
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(grade, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exercises(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            has_count INTEGER NOT NULL DEFAULT 0,
            has_duration INTEGER NOT NULL DEFAULT 0,
            has_steps INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exercise_id TEXT NOT NULL,
            logged_at TEXT NOT NULL,
            logged_on TEXT NOT NULL,
            count INTEGER,
            duration_sec INTEGER,
            steps INTEGER,
            photo_url TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(exercise_id) REFERENCES exercises(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_student_day
         ON activity_records(student_id, logged_on)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_day ON activity_records(logged_on)",
        [],
    )?;

    // Goal ledger: one row per (student, day) so writes to one day never
    // rewrite another.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS goal_days(
            student_id TEXT NOT NULL,
            day TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, day),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS goal_targets(
            student_id TEXT NOT NULL,
            day TEXT NOT NULL,
            exercise_id TEXT NOT NULL,
            metric TEXT NOT NULL,
            target INTEGER NOT NULL,
            PRIMARY KEY(student_id, day, exercise_id),
            FOREIGN KEY(student_id, day) REFERENCES goal_days(student_id, day)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS goal_skips(
            student_id TEXT NOT NULL,
            day TEXT NOT NULL,
            exercise_id TEXT NOT NULL,
            PRIMARY KEY(student_id, day, exercise_id),
            FOREIGN KEY(student_id, day) REFERENCES goal_days(student_id, day)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS xp_awards(
            student_id TEXT NOT NULL,
            day TEXT NOT NULL,
            exercise_id TEXT NOT NULL,
            xp INTEGER NOT NULL,
            awarded_at TEXT NOT NULL,
            PRIMARY KEY(student_id, day, exercise_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS likes(
            target_id TEXT NOT NULL,
            week_key TEXT NOT NULL,
            liker_id TEXT NOT NULL,
            xp INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            PRIMARY KEY(target_id, week_key, liker_id),
            FOREIGN KEY(target_id) REFERENCES students(id),
            FOREIGN KEY(liker_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS manito_assignments(
            grade INTEGER NOT NULL,
            section INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            PRIMARY KEY(grade, section, student_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(friend_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_manito_student ON manito_assignments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mailbox_messages(
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            mission_status TEXT,
            completed_at TEXT,
            FOREIGN KEY(sender_id) REFERENCES students(id),
            FOREIGN KEY(recipient_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mailbox_recipient
         ON mailbox_messages(recipient_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mission_sends(
            sender_id TEXT NOT NULL,
            day TEXT NOT NULL,
            message_id TEXT NOT NULL,
            PRIMARY KEY(sender_id, day),
            FOREIGN KEY(sender_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    ensure_likes_xp(conn)?;
    seed_default_exercises(conn)?;
    Ok(())
}

/// Workspaces created before likes recorded their payout.
fn ensure_likes_xp(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "likes", "xp")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE likes ADD COLUMN xp INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn seed_default_exercises(conn: &Connection) -> anyhow::Result<()> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM exercises", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(());
    }
    // (id, name, category, count, duration, steps)
    let defaults: [(&str, &str, &str, bool, bool, bool); 8] = [
        ("squat", "스쿼트", "strength", true, false, false),
        ("pushup", "팔굽혀펴기", "strength", true, false, false),
        ("situp", "윗몸일으키기", "strength", true, false, false),
        ("jumprope", "줄넘기", "cardio", true, false, false),
        ("plank", "플랭크", "strength", false, true, false),
        ("stretching", "스트레칭", "flexibility", false, true, false),
        ("running", "달리기", "cardio", false, true, false),
        ("walking", "걷기", "walking", false, false, true),
    ];
    for (i, (id, name, category, c, d, s)) in defaults.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO exercises(
                 id, name, category, has_count, has_duration, has_steps, sort_order
             )
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (id, name, category, *c as i64, *d as i64, *s as i64, i as i64),
        )?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Runs `body` inside a `BEGIN IMMEDIATE` transaction and commits it.
///
/// When another writer holds the database the whole body is re-run, so the
/// closure must derive everything it writes from what it reads inside the
/// transaction. Any error rolls the attempt back.
pub fn with_immediate_tx<T, F>(conn: &Connection, mut body: F) -> Result<T>
where
    F: FnMut(&Connection) -> Result<T>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(EngineError::from)
            .and_then(|tx| {
                let in_tx: &Connection = &tx;
                let value = body(in_tx)?;
                tx.commit()?;
                Ok(value)
            });
        match outcome {
            Ok(v) => return Ok(v),
            Err(e) if e.is_conflict() && attempt < TX_MAX_ATTEMPTS => {
                tracing::debug!(attempt, "storage busy, retrying transaction");
                std::thread::sleep(Duration::from_millis(20 * attempt as u64));
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(attempts = attempt, "storage busy, giving up");
                return Err(EngineError::Busy { attempts: attempt });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) fn memory_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_idempotent_and_seeds_catalog_once() {
        let conn = memory_db();
        init_schema(&conn).expect("second init");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM exercises", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 8);
    }

    #[test]
    fn settings_round_trip() {
        let conn = memory_db();
        assert!(settings_get_json(&conn, "rewards").unwrap().is_none());
        settings_set_json(&conn, "rewards", &json!({ "goalXp": 12 })).unwrap();
        settings_set_json(&conn, "rewards", &json!({ "goalXp": 15 })).unwrap();
        assert_eq!(
            settings_get_json(&conn, "rewards").unwrap(),
            Some(json!({ "goalXp": 15 }))
        );
    }

    #[test]
    fn old_likes_table_gains_xp_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE likes(
                target_id TEXT NOT NULL,
                week_key TEXT NOT NULL,
                liker_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY(target_id, week_key, liker_id)
            );
            INSERT INTO likes VALUES('t', '2026-W20', 'l', '2026-05-11T08:00:00');",
        )
        .unwrap();
        init_schema(&conn).unwrap();
        assert!(table_has_column(&conn, "likes", "xp").unwrap());
        let xp: i64 = conn
            .query_row("SELECT xp FROM likes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(xp, 0);
    }

    #[test]
    fn failed_body_rolls_back() {
        let conn = memory_db();
        let res: Result<()> = with_immediate_tx(&conn, |tx| {
            tx.execute(
                "INSERT INTO settings(key, value_json) VALUES('k', '1')",
                [],
            )?;
            Err(EngineError::bad_input("nope"))
        });
        assert!(matches!(res, Err(EngineError::BadInput(_))));
        assert!(settings_get_json(&conn, "k").unwrap().is_none());
    }
}
