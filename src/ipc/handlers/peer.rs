use crate::engine::likes::{self, is_valid_week_key, week_key};
use crate::engine::mailbox::{self, MessageKind};
use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, load_rewards, to_json, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::collections::BTreeMap;

fn week_param(params: &serde_json::Value, default: String) -> Result<String, HandlerErr> {
    match get_optional_str(params, "week")? {
        Some(w) if is_valid_week_key(&w) => Ok(w),
        Some(_) => Err(HandlerErr::bad_params("week must be YYYY-Www")),
        None => Ok(default),
    }
}

fn handle_likes_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let liker_id = get_required_str(params, "likerId")?;
        let target_id = get_required_str(params, "targetId")?;
        let week = week_param(params, week_key(clock.today()))?;
        let rewards = load_rewards(conn)?;
        let toggled = likes::toggle_like(
            conn,
            rewards.like_xp,
            &liker_id,
            &target_id,
            &week,
            clock.now(),
        )?;
        to_json(&toggled)
    })
}

fn handle_likes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let target_id = get_required_str(params, "targetId")?;
        let week = week_param(params, week_key(clock.today()))?;
        let likers = likes::likers(conn, &target_id, &week)?;
        Ok(json!({ "week": week, "count": likers.len(), "likers": likers }))
    })
}

fn handle_manito_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let grade = get_required_i64(params, "grade")?;
        let section = get_required_i64(params, "section")?;
        let pairs: BTreeMap<String, String> = params
            .get("pairs")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|_| HandlerErr::bad_params("pairs must map student ids to friend ids"))?
            .ok_or_else(|| HandlerErr::bad_params("missing pairs"))?;
        mailbox::set_manito(conn, grade, section, &pairs)?;
        Ok(json!({ "pairs": pairs.len() }))
    })
}

fn handle_manito_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let friend = mailbox::manito_friend(conn, &student_id)?;
        Ok(json!({ "friendId": friend }))
    })
}

fn handle_mailbox_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let sender_id = get_required_str(params, "senderId")?;
        let recipient_id = get_optional_str(params, "recipientId")?;
        let kind_raw = get_required_str(params, "type")?;
        let Some(kind) = MessageKind::parse(&kind_raw) else {
            return Err(HandlerErr::bad_params("type must be cheer or mission"));
        };
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("missing content"))?;
        let message = mailbox::send_message(
            conn,
            clock.now(),
            &sender_id,
            recipient_id.as_deref(),
            kind,
            content,
        )?;
        Ok(json!({ "messageId": message.id, "message": to_json(&message)? }))
    })
}

fn handle_mailbox_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let messages = mailbox::list_mailbox(conn, &student_id)?;
        let unread = messages.iter().filter(|m| !m.is_read).count();
        Ok(json!({ "messages": to_json(&messages)?, "unreadCount": unread }))
    })
}

fn handle_mailbox_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let message_id = get_required_str(params, "messageId")?;
        mailbox::mark_read(conn, &student_id, &message_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_mailbox_complete_mission(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let message_id = get_required_str(params, "messageId")?;
        let rewards = load_rewards(conn)?;
        let done = mailbox::complete_mission(
            conn,
            rewards.mission_bonus_xp,
            &student_id,
            &message_id,
            clock.now(),
        )?;
        to_json(&done)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "likes.toggle" => Some(handle_likes_toggle(state, req)),
        "likes.get" => Some(handle_likes_get(state, req)),
        "manito.set" => Some(handle_manito_set(state, req)),
        "manito.get" => Some(handle_manito_get(state, req)),
        "mailbox.send" => Some(handle_mailbox_send(state, req)),
        "mailbox.list" => Some(handle_mailbox_list(state, req)),
        "mailbox.markRead" => Some(handle_mailbox_mark_read(state, req)),
        "mailbox.completeMission" => Some(handle_mailbox_complete_mission(state, req)),
        _ => None,
    }
}
