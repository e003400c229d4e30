use crate::config::Rewards;
use crate::db::{DAY_FORMAT, TIMESTAMP_FORMAT};
use crate::engine::error::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        let details = match &e {
            EngineError::Busy { attempts } => Some(serde_json::json!({ "attempts": attempts })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

/// Runs a handler body against the open workspace and wraps the reply.
pub fn with_db<F>(state: &AppState, req: &Request, body: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match body(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn load_rewards(conn: &Connection) -> Result<Rewards, HandlerErr> {
    Rewards::load(conn).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()).filter(|s| !s.is_empty()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_optional_day(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(raw) = get_optional_str(params, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, DAY_FORMAT)
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

/// Accepts RFC 3339 (converted to local wall time) or a naive local
/// `YYYY-MM-DDTHH:MM:SS`.
pub fn get_optional_timestamp(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveDateTime>, HandlerErr> {
    let Some(raw) = get_optional_str(params, key)? else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Local).naive_local()));
    }
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be an RFC 3339 timestamp", key)))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr {
        code: "encode_failed",
        message: e.to_string(),
        details: None,
    })
}
