use crate::engine::levels::progress_in_tier;
use crate::engine::{activity, progress, streak, students};
use crate::ipc::helpers::{get_required_str, load_rewards, to_json, with_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_progress_today(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    let messenger = state.messenger.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        students::require(conn, &student_id)?;
        let rewards = load_rewards(conn)?;
        let today = clock.today();
        // Also picks up awards deferred by an earlier failed write.
        let report = progress::refresh_day(conn, clock.as_ref(), &rewards, &student_id, today)?;
        if let Some(ev) = report.level_up.as_ref() {
            let _ = messenger.request(ev);
        }
        let days = activity::distinct_days(conn, &student_id)?;
        let (earned_in_tier, tier_span) = progress_in_tier(report.total_xp);
        Ok(json!({
            "report": to_json(&report)?,
            "streak": streak::current_streak(&days, today),
            "tierProgress": { "earned": earned_in_tier, "span": tier_span },
        }))
    })
}

fn handle_progress_streak(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        students::require(conn, &student_id)?;
        let days = activity::distinct_days(conn, &student_id)?;
        let stats = streak::stats(&days, clock.today());
        Ok(json!({ "streak": to_json(&stats)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.today" => Some(handle_progress_today(state, req)),
        "progress.streak" => Some(handle_progress_streak(state, req)),
        _ => None,
    }
}
