use crate::db;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REWARDS_KEY: &str = "rewards";
const MAX_REWARD_XP: i64 = 1000;

/// Process-level settings read once at startup.
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    pub log_filter: Option<String>,
    pub text_service_url: Option<String>,
    /// Pins the engine clock to one local date.
    pub today_override: Option<NaiveDate>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let today_override = match non_empty("FITQUEST_TODAY") {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, db::DAY_FORMAT)
                    .map_err(|e| anyhow::anyhow!("FITQUEST_TODAY must be YYYY-MM-DD: {e}"))?,
            ),
            None => None,
        };
        Ok(Self {
            log_filter: non_empty("FITQUEST_LOG"),
            text_service_url: non_empty("FITQUEST_TEXT_SERVICE_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            today_override,
        })
    }
}

/// XP amounts paid by the three writers of `total_xp`. Stored per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rewards {
    pub goal_xp: i64,
    pub like_xp: i64,
    pub mission_bonus_xp: i64,
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            goal_xp: 10,
            like_xp: 5,
            mission_bonus_xp: 20,
        }
    }
}

impl Rewards {
    /// Applies a partial `{goalXp?, likeXp?, missionBonusXp?}` patch.
    pub fn merge_patch(&mut self, patch: &serde_json::Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            let slot = match k.as_str() {
                "goalXp" => &mut self.goal_xp,
                "likeXp" => &mut self.like_xp,
                "missionBonusXp" => &mut self.mission_bonus_xp,
                _ => return Err(format!("unknown rewards field: {}", k)),
            };
            let Some(n) = v.as_i64() else {
                return Err(format!("{} must be an integer", k));
            };
            if !(0..=MAX_REWARD_XP).contains(&n) {
                return Err(format!("{} must be between 0 and {}", k, MAX_REWARD_XP));
            }
            *slot = n;
        }
        Ok(())
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let mut current = Rewards::default();
        if let Some(saved) = db::settings_get_json(conn, REWARDS_KEY)? {
            if let Some(obj) = saved.as_object() {
                // Best-effort: a malformed saved value falls back field by field.
                for (k, v) in obj {
                    let mut one = serde_json::Map::new();
                    one.insert(k.clone(), v.clone());
                    let _ = current.merge_patch(&one);
                }
            }
        }
        Ok(current)
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, REWARDS_KEY, &serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_db;
    use serde_json::json;

    #[test]
    fn defaults_match_reference_amounts() {
        let conn = memory_db();
        assert_eq!(
            Rewards::load(&conn).unwrap(),
            Rewards {
                goal_xp: 10,
                like_xp: 5,
                mission_bonus_xp: 20,
            }
        );
    }

    #[test]
    fn patch_validates_and_persists() {
        let conn = memory_db();
        let mut r = Rewards::load(&conn).unwrap();
        let patch = json!({ "goalXp": 15 });
        r.merge_patch(patch.as_object().unwrap()).unwrap();
        r.save(&conn).unwrap();
        assert_eq!(Rewards::load(&conn).unwrap().goal_xp, 15);

        let bad = json!({ "likeXp": -1 });
        assert!(r.merge_patch(bad.as_object().unwrap()).is_err());
        let unknown = json!({ "streakXp": 3 });
        assert!(r.merge_patch(unknown.as_object().unwrap()).is_err());
    }

    #[test]
    fn malformed_saved_fields_fall_back() {
        let conn = memory_db();
        db::settings_set_json(&conn, REWARDS_KEY, &json!({ "goalXp": "lots", "likeXp": 7 }))
            .unwrap();
        let r = Rewards::load(&conn).unwrap();
        assert_eq!((r.goal_xp, r.like_xp), (10, 7));
    }
}
