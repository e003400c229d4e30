use crate::db::{with_immediate_tx, DAY_FORMAT, TIMESTAMP_FORMAT};
use crate::engine::error::{EngineError, Result};
use crate::engine::students;
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Cheer,
    Mission,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Cheer => "cheer",
            MessageKind::Mission => "mission",
        }
    }

    pub fn parse(s: &str) -> Option<MessageKind> {
        match s {
            "cheer" => Some(MessageKind::Cheer),
            "mission" => Some(MessageKind::Mission),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissionStatus {
    Pending,
    Completed,
}

impl MissionStatus {
    fn as_str(self) -> &'static str {
        match self {
            MissionStatus::Pending => "pending",
            MissionStatus::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Option<MissionStatus> {
        match s {
            "pending" => Some(MissionStatus::Pending),
            "completed" => Some(MissionStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub mission_status: Option<MissionStatus>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionCompletion {
    pub message_id: String,
    pub bonus_xp: i64,
    pub total_xp: i64,
}

fn row_to_message(r: &rusqlite::Row<'_>) -> rusqlite::Result<MailboxMessage> {
    let kind: String = r.get(3)?;
    let status: Option<String> = r.get(7)?;
    Ok(MailboxMessage {
        id: r.get(0)?,
        sender_id: r.get(1)?,
        recipient_id: r.get(2)?,
        kind: MessageKind::parse(&kind).unwrap_or(MessageKind::Cheer),
        content: r.get(4)?,
        is_read: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        mission_status: status.as_deref().and_then(MissionStatus::parse),
        completed_at: r.get(8)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, kind, content, is_read, created_at, mission_status, completed_at";

/// The student `student_id` secretly supports, if a pairing exists.
pub fn manito_friend(conn: &Connection, student_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT friend_id FROM manito_assignments WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Replaces the pairing of one class section. Every student in `pairs` must
/// belong to that section and nobody may be their own friend.
pub fn set_manito(
    conn: &Connection,
    grade: i64,
    section: i64,
    pairs: &BTreeMap<String, String>,
) -> Result<()> {
    with_immediate_tx(conn, |tx| {
        let members: HashSet<String> = students::list(tx, Some(grade), Some(section))?
            .into_iter()
            .map(|s| s.id)
            .collect();
        for (student, friend) in pairs {
            if student == friend {
                return Err(EngineError::bad_input("a student cannot be their own manito"));
            }
            if !members.contains(student) || !members.contains(friend) {
                return Err(EngineError::bad_input(format!(
                    "{} -> {} is not within grade {} section {}",
                    student, friend, grade, section
                )));
            }
        }
        tx.execute(
            "DELETE FROM manito_assignments WHERE grade = ? AND section = ?",
            (grade, section),
        )?;
        for (student, friend) in pairs {
            tx.execute(
                "INSERT INTO manito_assignments(grade, section, student_id, friend_id)
                 VALUES(?, ?, ?, ?)",
                (grade, section, student, friend),
            )?;
        }
        Ok(())
    })
}

/// Appends a message to the recipient's mailbox. A mission also claims the
/// sender's once-per-day mission slot in the same transaction.
///
/// Without an explicit recipient the message goes to the sender's manito.
pub fn send_message(
    conn: &Connection,
    now: NaiveDateTime,
    sender_id: &str,
    recipient_id: Option<&str>,
    kind: MessageKind,
    content: &str,
) -> Result<MailboxMessage> {
    let content = content.trim();
    if content.is_empty() {
        return Err(EngineError::bad_input("content must not be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(EngineError::bad_input(format!(
            "content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    let recipient = match recipient_id {
        Some(r) => r.to_string(),
        None => manito_friend(conn, sender_id)?
            .ok_or_else(|| EngineError::not_found("manito assignment"))?,
    };
    if recipient == sender_id {
        return Err(EngineError::InvalidTransition("cannot message yourself".into()));
    }
    let day = now.date().format(DAY_FORMAT).to_string();
    let message = MailboxMessage {
        id: Uuid::new_v4().to_string(),
        sender_id: sender_id.to_string(),
        recipient_id: recipient,
        kind,
        content: content.to_string(),
        is_read: false,
        created_at: now.format(TIMESTAMP_FORMAT).to_string(),
        mission_status: match kind {
            MessageKind::Mission => Some(MissionStatus::Pending),
            MessageKind::Cheer => None,
        },
        completed_at: None,
    };

    with_immediate_tx(conn, |tx| {
        students::require(tx, &message.sender_id)?;
        students::require(tx, &message.recipient_id)?;
        if kind == MessageKind::Mission {
            let claimed = tx.execute(
                "INSERT OR IGNORE INTO mission_sends(sender_id, day, message_id) VALUES(?, ?, ?)",
                (&message.sender_id, &day, &message.id),
            )?;
            if claimed == 0 {
                return Err(EngineError::RateLimited(
                    "only one mission can be sent per day".into(),
                ));
            }
        }
        tx.execute(
            "INSERT INTO mailbox_messages(
                 id, sender_id, recipient_id, kind, content, is_read, created_at, mission_status
             )
             VALUES(?, ?, ?, ?, ?, 0, ?, ?)",
            (
                &message.id,
                &message.sender_id,
                &message.recipient_id,
                kind.as_str(),
                &message.content,
                &message.created_at,
                message.mission_status.map(|s| s.as_str()),
            ),
        )?;
        Ok(())
    })?;

    tracing::info!(
        sender_id,
        recipient_id = %message.recipient_id,
        kind = kind.as_str(),
        "mailbox message sent"
    );
    Ok(message)
}

/// `pending -> completed` exactly once, paying `bonus_xp` to the recipient.
pub fn complete_mission(
    conn: &Connection,
    bonus_xp: i64,
    recipient_id: &str,
    message_id: &str,
    now: NaiveDateTime,
) -> Result<MissionCompletion> {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    let done = with_immediate_tx(conn, |tx| {
        let row: Option<(String, String, Option<String>)> = tx
            .query_row(
                "SELECT recipient_id, kind, mission_status FROM mailbox_messages WHERE id = ?",
                [message_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((owner, kind, status)) = row else {
            return Err(EngineError::not_found("message"));
        };
        if owner != recipient_id {
            return Err(EngineError::not_found("message"));
        }
        if MessageKind::parse(&kind) != Some(MessageKind::Mission) {
            return Err(EngineError::InvalidTransition("message is not a mission".into()));
        }
        if status.as_deref().and_then(MissionStatus::parse) != Some(MissionStatus::Pending) {
            return Err(EngineError::InvalidTransition("mission already completed".into()));
        }
        let changed = tx.execute(
            "UPDATE mailbox_messages SET mission_status = 'completed', completed_at = ?
             WHERE id = ? AND mission_status = 'pending'",
            (&stamp, message_id),
        )?;
        if changed != 1 {
            return Err(EngineError::InvalidTransition("mission already completed".into()));
        }
        tx.execute(
            "UPDATE students SET total_xp = total_xp + ? WHERE id = ?",
            (bonus_xp, recipient_id),
        )?;
        let total_xp: i64 = tx.query_row(
            "SELECT total_xp FROM students WHERE id = ?",
            [recipient_id],
            |r| r.get(0),
        )?;
        Ok(MissionCompletion {
            message_id: message_id.to_string(),
            bonus_xp,
            total_xp,
        })
    })?;
    tracing::info!(recipient_id, message_id, total_xp = done.total_xp, "mission completed");
    Ok(done)
}

pub fn list_mailbox(conn: &Connection, recipient_id: &str) -> Result<Vec<MailboxMessage>> {
    let sql = format!(
        "SELECT {} FROM mailbox_messages WHERE recipient_id = ? ORDER BY created_at DESC, id",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([recipient_id], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_read(conn: &Connection, recipient_id: &str, message_id: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE mailbox_messages SET is_read = 1 WHERE id = ? AND recipient_id = ?",
        (message_id, recipient_id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("message"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_db;
    use crate::engine::clock::{Clock, FixedClock};
    use chrono::NaiveDate;

    struct Fixture {
        conn: Connection,
        clock: FixedClock,
        a: String,
        b: String,
    }

    fn setup() -> Fixture {
        let conn = memory_db();
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2026, 5, 13).unwrap());
        let a = students::create(&conn, &clock, &students::sample("가람", 3, 2, 0))
            .unwrap()
            .id;
        let b = students::create(&conn, &clock, &students::sample("나래", 3, 2, 0))
            .unwrap()
            .id;
        Fixture { conn, clock, a, b }
    }

    fn mailbox_len(f: &Fixture, who: &str) -> usize {
        list_mailbox(&f.conn, who).unwrap().len()
    }

    #[test]
    fn second_mission_same_day_is_rate_limited() {
        let f = setup();
        let now = f.clock.now();
        let b = Some(f.b.as_str());
        send_message(&f.conn, now, &f.a, b, MessageKind::Mission, "줄넘기 100개!").unwrap();
        let second = send_message(&f.conn, now, &f.a, b, MessageKind::Mission, "하나 더");
        assert!(matches!(second, Err(EngineError::RateLimited(_))));
        assert_eq!(mailbox_len(&f, &f.b), 1);

        // Cheers are unlimited and missions reopen the next day.
        send_message(&f.conn, now, &f.a, b, MessageKind::Cheer, "화이팅").unwrap();
        let tomorrow = now + chrono::Duration::days(1);
        send_message(&f.conn, tomorrow, &f.a, b, MessageKind::Mission, "스쿼트 20개").unwrap();
        assert_eq!(mailbox_len(&f, &f.b), 3);
    }

    #[test]
    fn mission_completes_exactly_once() {
        let f = setup();
        let now = f.clock.now();
        let b = Some(f.b.as_str());
        let msg = send_message(&f.conn, now, &f.a, b, MessageKind::Mission, "플랭크 1분").unwrap();
        assert_eq!(msg.mission_status, Some(MissionStatus::Pending));
        let done = complete_mission(&f.conn, 20, &f.b, &msg.id, f.clock.now()).unwrap();
        assert_eq!(done.total_xp, 20);
        let again = complete_mission(&f.conn, 20, &f.b, &msg.id, f.clock.now());
        assert!(matches!(again, Err(EngineError::InvalidTransition(_))));
        assert_eq!(students::total_xp(&f.conn, &f.b).unwrap(), 20);
        let stored = &list_mailbox(&f.conn, &f.b).unwrap()[0];
        assert_eq!(stored.mission_status, Some(MissionStatus::Completed));
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn only_the_recipient_can_complete() {
        let f = setup();
        let now = f.clock.now();
        let b = Some(f.b.as_str());
        let msg = send_message(&f.conn, now, &f.a, b, MessageKind::Mission, "걷기").unwrap();
        let res = complete_mission(&f.conn, 20, &f.a, &msg.id, f.clock.now());
        assert!(matches!(res, Err(EngineError::NotFound(_))));
        let cheer = send_message(&f.conn, now, &f.a, b, MessageKind::Cheer, "최고").unwrap();
        let res = complete_mission(&f.conn, 20, &f.b, &cheer.id, f.clock.now());
        assert!(matches!(res, Err(EngineError::InvalidTransition(_))));
        assert_eq!(students::total_xp(&f.conn, &f.b).unwrap(), 0);
    }

    #[test]
    fn recipient_defaults_to_manito() {
        let f = setup();
        let pairs: BTreeMap<String, String> =
            [(f.a.clone(), f.b.clone()), (f.b.clone(), f.a.clone())].into_iter().collect();
        set_manito(&f.conn, 3, 2, &pairs).unwrap();
        let now = f.clock.now();
        let msg = send_message(&f.conn, now, &f.a, None, MessageKind::Cheer, "안녕").unwrap();
        assert_eq!(msg.recipient_id, f.b);
        mark_read(&f.conn, &f.b, &msg.id).unwrap();
        assert!(list_mailbox(&f.conn, &f.b).unwrap()[0].is_read);
    }

    #[test]
    fn manito_must_stay_in_section() {
        let f = setup();
        let other = students::create(&f.conn, &f.clock, &students::sample("다온", 4, 1, 0))
            .unwrap()
            .id;
        let pairs: BTreeMap<String, String> = [(f.a.clone(), other)].into_iter().collect();
        assert!(matches!(set_manito(&f.conn, 3, 2, &pairs), Err(EngineError::BadInput(_))));
    }

    #[test]
    fn rejects_empty_and_self_messages() {
        let f = setup();
        let now = f.clock.now();
        assert!(matches!(
            send_message(&f.conn, now, &f.a, Some(&f.b), MessageKind::Cheer, "   "),
            Err(EngineError::BadInput(_))
        ));
        assert!(matches!(
            send_message(&f.conn, now, &f.a, Some(&f.a), MessageKind::Mission, "혼자"),
            Err(EngineError::InvalidTransition(_))
        ));
        // The self-addressed mission must not have used up the daily slot.
        send_message(&f.conn, now, &f.a, Some(&f.b), MessageKind::Mission, "같이").unwrap();
    }
}
