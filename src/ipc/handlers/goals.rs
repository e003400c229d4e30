use crate::engine::goals::{self, DayGoals, GoalTarget};
use crate::engine::progress;
use crate::ipc::helpers::{get_required_str, load_rewards, to_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

fn parse_day_goals(params: &serde_json::Value) -> Result<DayGoals, HandlerErr> {
    let targets: BTreeMap<String, GoalTarget> = match params.get("goals") {
        None | Some(serde_json::Value::Null) => BTreeMap::new(),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            HandlerErr::bad_params(format!(
                "goals must map exercise ids to {{metric, target}}: {}",
                e
            ))
        })?,
    };
    let skipped: BTreeSet<String> = match params.get("skipped") {
        None | Some(serde_json::Value::Null) => BTreeSet::new(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("skipped must be an array of exercise ids"))?,
    };
    Ok(DayGoals { targets, skipped })
}

fn handle_goals_set_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    let messenger = state.messenger.clone();
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let day = goals::parse_day(&get_required_str(params, "day")?)?;
        let day_goals = parse_day_goals(params)?;
        goals::set_day(conn, clock.as_ref(), &student_id, day, &day_goals)?;

        // Editing today's goals can satisfy a goal with records already logged.
        let report = if day == clock.today() {
            let rewards = load_rewards(conn)?;
            let report = progress::refresh_day(conn, clock.as_ref(), &rewards, &student_id, day)?;
            if let Some(ev) = report.level_up.as_ref() {
                let _ = messenger.request(ev);
            }
            Some(report)
        } else {
            None
        };
        Ok(json!({
            "day": day.to_string(),
            "goals": to_json(&day_goals)?,
            "report": to_json(&report)?,
        }))
    })
}

fn handle_goals_get_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let ledger = goals::get_all(conn, &student_id)?;
        let mut days = serde_json::Map::new();
        for (day, entry) in &ledger {
            days.insert(day.to_string(), to_json(entry)?);
        }
        Ok(json!({ "days": days }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "goals.setDay" => Some(handle_goals_set_day(state, req)),
        "goals.getAll" => Some(handle_goals_get_all(state, req)),
        _ => None,
    }
}
