use crate::engine::activity::{self, NewActivity};
use crate::engine::progress;
use crate::ipc::helpers::{
    get_optional_day, get_optional_i64, get_optional_timestamp, get_required_i64,
    get_required_str, load_rewards, to_json, with_db,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_activity_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    let messenger = state.messenger.clone();
    with_db(state, req, |conn, params| {
        let new = NewActivity {
            student_id: get_required_str(params, "studentId")?,
            exercise_id: get_required_str(params, "exerciseId")?,
            logged_at: get_optional_timestamp(params, "loggedAt")?,
            count: get_optional_i64(params, "count")?,
            duration_sec: get_optional_i64(params, "durationSec")?,
            steps: get_optional_i64(params, "steps")?,
        };
        let rewards = load_rewards(conn)?;
        let logged = progress::log_activity(conn, clock.as_ref(), &rewards, &new)?;
        if let Some(ev) = logged.report.as_ref().and_then(|r| r.level_up.as_ref()) {
            let _ = messenger.request(ev);
        }
        Ok(json!({
            "recordId": logged.record.id,
            "record": to_json(&logged.record)?,
            "report": to_json(&logged.report)?,
        }))
    })
}

fn handle_activity_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let day = get_optional_day(params, "day")?;
        let records = activity::list_for_student(conn, &student_id, day)?;
        Ok(json!({ "records": to_json(&records)? }))
    })
}

fn handle_activity_list_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let grade = get_required_i64(params, "grade")?;
        let section = get_required_i64(params, "section")?;
        let day = get_optional_day(params, "day")?.unwrap_or_else(|| clock.today());
        let records = activity::list_for_class(conn, grade, section, day)?;
        Ok(json!({ "records": to_json(&records)? }))
    })
}

fn handle_activity_attach_photo(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let record_id = get_required_str(params, "recordId")?;
        let photo_url = get_required_str(params, "photoUrl")?;
        activity::attach_photo(conn, &record_id, &photo_url)?;
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activity.log" => Some(handle_activity_log(state, req)),
        "activity.list" => Some(handle_activity_list(state, req)),
        "activity.listClass" => Some(handle_activity_list_class(state, req)),
        "activity.attachPhoto" => Some(handle_activity_attach_photo(state, req)),
        _ => None,
    }
}
