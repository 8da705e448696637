use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Per-user progression row, keyed by user id. Written only through the
/// store's apply_reward so concurrent completions cannot lose XP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatsRecord {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub xp: i64,
    pub level: u32,
    pub streak_days: u32,
    pub best_combo: u32,
    #[serde(default)]
    pub last_active_date: Option<String>,
    pub updated_at: BsonDateTime,
}

impl UserStatsRecord {
    /// Zeroed row for users who have never earned a reward.
    pub fn fresh(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            xp: 0,
            level: 1,
            streak_days: 0,
            best_combo: 0,
            last_active_date: None,
            updated_at: BsonDateTime::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub user_id: String,
    pub xp: i64,
    pub level: u32,
    pub streak_days: u32,
    pub best_combo: u32,
    pub last_active_date: Option<String>,
}

impl StatsView {
    pub fn from_record(record: &UserStatsRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            xp: record.xp,
            level: record.level,
            streak_days: record.streak_days,
            best_combo: record.best_combo,
            last_active_date: record.last_active_date.clone(),
        }
    }
}

/// Progression result returned by sprint and task completion. Also the exact
/// payload cached in Redis for completion replays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardResponse {
    pub xp_earned: i64,
    pub new_streak: u32,
    pub new_level: u32,
    pub total_xp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn fresh_stats_start_at_level_one() {
        let stats = UserStatsRecord::fresh("user-1");
        assert_eq!(stats.xp, 0);
        assert_eq!(stats.level, 1);
        assert_eq!(stats.streak_days, 0);
        assert!(stats.last_active_date.is_none());
    }

    #[test]
    fn stats_record_accepts_missing_last_active_date() {
        let doc = doc! {
            "_id": "user-1",
            "xp": 250_i64,
            "level": 2,
            "streak_days": 3,
            "best_combo": 5,
            "updated_at": BsonDateTime::now(),
        };

        let parsed: UserStatsRecord =
            mongodb::bson::from_document(doc).expect("stats should deserialize");
        assert_eq!(parsed.xp, 250);
        assert_eq!(parsed.last_active_date, None);
    }
}
