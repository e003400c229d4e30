use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::engine::clock::Clock;
use crate::engine::textgen::LevelUpMessenger;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub clock: Arc<dyn Clock>,
    pub messenger: LevelUpMessenger,
}
