use crate::engine::catalog::{self, Category, Exercise, Metric};
use crate::ipc::helpers::{get_required_str, to_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_exercises_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _params| {
        let all = catalog::list(conn)?;
        Ok(json!({ "exercises": to_json(&all)? }))
    })
}

fn handle_exercises_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let id = get_required_str(params, "id")?;
        let name = get_required_str(params, "name")?;
        let category_raw = get_required_str(params, "category")?;
        let Some(category) = Category::parse(&category_raw) else {
            return Err(HandlerErr::bad_params(format!("unknown category: {}", category_raw)));
        };
        let Some(units_raw) = params.get("units").and_then(|v| v.as_array()) else {
            return Err(HandlerErr::bad_params("missing units"));
        };
        let mut units = Vec::new();
        for u in units_raw {
            let metric = u
                .as_str()
                .and_then(Metric::parse)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown unit: {}", u)))?;
            if !units.contains(&metric) {
                units.push(metric);
            }
        }
        let exercise = Exercise {
            id,
            name,
            category,
            units,
        };
        catalog::upsert(conn, &exercise)?;
        Ok(json!({ "exercise": to_json(&exercise)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exercises.list" => Some(handle_exercises_list(state, req)),
        "exercises.upsert" => Some(handle_exercises_upsert(state, req)),
        _ => None,
    }
}
