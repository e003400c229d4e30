use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let started = std::time::Instant::now();
    let resp = dispatch(state, &req);
    let ok = resp.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    tracing::debug!(
        method = %req.method,
        id = %req.id,
        ok,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    resp
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::exercises::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::activity::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::goals::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::progress::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::peer::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::levelup::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
