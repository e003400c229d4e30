use crate::db::{with_immediate_tx, TIMESTAMP_FORMAT};
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, Result};
use crate::engine::levels::{level_of, LevelTier};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade: i64,
    pub section: i64,
    pub gender: String,
    pub avatar: Option<String>,
    pub total_xp: i64,
}

impl Student {
    pub fn level(&self) -> &'static LevelTier {
        level_of(self.total_xp)
    }
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub grade: i64,
    pub section: i64,
    pub gender: String,
    pub pin: String,
    pub avatar: Option<String>,
    pub initial_xp: i64,
}

fn hash_pin(pin: &str) -> String {
    format!("{:x}", Sha256::digest(pin.as_bytes()))
}

fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(EngineError::bad_input("pin must be exactly 4 digits"))
    }
}

const STUDENT_COLUMNS: &str = "id, name, grade, section, gender, avatar, total_xp";

fn row_to_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        grade: r.get(2)?,
        section: r.get(3)?,
        gender: r.get(4)?,
        avatar: r.get(5)?,
        total_xp: r.get(6)?,
    })
}

pub fn create(conn: &Connection, clock: &dyn Clock, new: &NewStudent) -> Result<Student> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(EngineError::bad_input("name must not be empty"));
    }
    if new.grade < 1 || new.section < 1 {
        return Err(EngineError::bad_input("grade and section must be positive"));
    }
    if new.initial_xp < 0 {
        return Err(EngineError::bad_input("initialXp must not be negative"));
    }
    validate_pin(&new.pin)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
             id, name, grade, section, gender, avatar, pin_hash, total_xp, created_at
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            new.grade,
            new.section,
            new.gender.trim(),
            new.avatar.as_deref(),
            hash_pin(&new.pin),
            new.initial_xp,
            clock.now().format(TIMESTAMP_FORMAT).to_string(),
        ),
    )?;
    tracing::info!(student_id = %id, grade = new.grade, section = new.section, "student created");
    Ok(Student {
        id,
        name: name.to_string(),
        grade: new.grade,
        section: new.section,
        gender: new.gender.trim().to_string(),
        avatar: new.avatar.clone(),
        total_xp: new.initial_xp,
    })
}

pub fn get(conn: &Connection, student_id: &str) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    Ok(conn
        .query_row(&sql, [student_id], row_to_student)
        .optional()?)
}

pub fn require(conn: &Connection, student_id: &str) -> Result<Student> {
    get(conn, student_id)?.ok_or_else(|| EngineError::not_found("student"))
}

pub fn list(conn: &Connection, grade: Option<i64>, section: Option<i64>) -> Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE (?1 IS NULL OR grade = ?1) AND (?2 IS NULL OR section = ?2)
         ORDER BY grade, section, name, id",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((grade, section), row_to_student)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Class leaderboard: highest XP first, ties by name.
pub fn ranking(conn: &Connection, grade: i64, section: i64) -> Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE grade = ? AND section = ?
         ORDER BY total_xp DESC, name, id",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((grade, section), row_to_student)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn verify_pin(conn: &Connection, student_id: &str, pin: &str) -> Result<bool> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT pin_hash FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Err(EngineError::not_found("student"));
    };
    Ok(stored == hash_pin(pin.trim()))
}

pub fn total_xp(conn: &Connection, student_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT total_xp FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("student"))
}

/// Removes the student and everything that references them.
pub fn delete(conn: &Connection, student_id: &str) -> Result<()> {
    with_immediate_tx(conn, |tx| {
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(EngineError::not_found("student"));
        }
        // Dependency order; foreign keys have no ON DELETE CASCADE.
        tx.execute("DELETE FROM activity_records WHERE student_id = ?", [student_id])?;
        tx.execute("DELETE FROM goal_targets WHERE student_id = ?", [student_id])?;
        tx.execute("DELETE FROM goal_skips WHERE student_id = ?", [student_id])?;
        tx.execute("DELETE FROM goal_days WHERE student_id = ?", [student_id])?;
        tx.execute("DELETE FROM xp_awards WHERE student_id = ?", [student_id])?;
        tx.execute(
            "DELETE FROM likes WHERE target_id = ?1 OR liker_id = ?1",
            [student_id],
        )?;
        tx.execute("DELETE FROM mission_sends WHERE sender_id = ?", [student_id])?;
        tx.execute(
            "DELETE FROM mailbox_messages WHERE sender_id = ?1 OR recipient_id = ?1",
            [student_id],
        )?;
        tx.execute(
            "DELETE FROM manito_assignments WHERE student_id = ?1 OR friend_id = ?1",
            [student_id],
        )?;
        tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
        Ok(())
    })?;
    tracing::info!(student_id, "student deleted");
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample(name: &str, grade: i64, section: i64, initial_xp: i64) -> NewStudent {
    NewStudent {
        name: name.to_string(),
        grade,
        section,
        gender: "female".to_string(),
        pin: "1234".to_string(),
        avatar: None,
        initial_xp,
    }
}
