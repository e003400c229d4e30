use crate::ipc::helpers::{load_rewards, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_rewards_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _params| {
        let rewards = load_rewards(conn)?;
        Ok(json!({ "rewards": rewards }))
    })
}

fn handle_rewards_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
            return Err(HandlerErr::bad_params("missing patch"));
        };
        let mut rewards = load_rewards(conn)?;
        rewards.merge_patch(patch).map_err(HandlerErr::bad_params)?;
        rewards.save(conn).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "settings" })),
        })?;
        tracing::info!(?rewards, "rewards updated");
        Ok(json!({ "rewards": rewards }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rewards.get" => Some(handle_rewards_get(state, req)),
        "rewards.update" => Some(handle_rewards_update(state, req)),
        _ => None,
    }
}
