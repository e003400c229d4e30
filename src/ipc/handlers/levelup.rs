use crate::engine::levels::{next_threshold, LEVEL_TIERS};
use crate::engine::textgen::{tip_or_fallback, TipRequest};
use crate::engine::{goals, students};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, to_json, with_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_levels_list(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "tiers": LEVEL_TIERS }))
}

/// Latest congratulation for the student. The text is filled in by a
/// background request, so callers poll until `pending` is false.
fn handle_levelup_message(state: &mut AppState, req: &Request) -> serde_json::Value {
    let messenger = state.messenger.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let student = students::require(conn, &student_id)?;
        let status = messenger.status(&student_id);
        Ok(json!({
            "level": student.level(),
            "totalXp": student.total_xp,
            "nextThreshold": next_threshold(student.total_xp),
            "pending": status.pending,
            "message": to_json(&status.message)?,
        }))
    })
}

fn handle_tips_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    let messenger = state.messenger.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let student = students::require(conn, &student_id)?;
        let today_goals = goals::get_day(conn, &student_id, clock.today())?;
        let tip_req = TipRequest {
            grade: student.grade,
            gender: student.gender.clone(),
            level_name: student.level().name.to_string(),
            xp: student.total_xp,
            goals: today_goals,
        };
        let (tip, from_fallback) = tip_or_fallback(messenger.generator(), &tip_req);
        Ok(json!({ "tip": to_json(&tip)?, "fromFallback": from_fallback }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "levels.list" => Some(handle_levels_list(req)),
        "levelup.message" => Some(handle_levelup_message(state, req)),
        "tips.generate" => Some(handle_tips_generate(state, req)),
        _ => None,
    }
}
