use std::sync::Arc;

use chrono::NaiveDate;
use mongodb::bson::DateTime as BsonDateTime;

use crate::metrics::XP_AWARDED_TOTAL;
use crate::models::session::{ComboState, SprintOutcome};
use crate::models::stats::{RewardResponse, UserStatsRecord};
use crate::utils::time::{date_to_str, parse_date};

use super::store::SprintStore;
use super::SprintError;

pub const XP_PER_CORRECT: i64 = 10;
pub const XP_PER_COMBO: i64 = 5;
pub const TASK_XP: i64 = 10;
pub const LEVEL_CAP: u32 = 99;
const LEVEL_BASE_COST: i64 = 100;

/// XP for a finished sprint: flat XP per correct answer, a flat bonus per
/// point of best combo, then the combo multiplier, floored. The multiplier
/// is applied in integer tenths so the floor never depends on float
/// rounding. Counters far beyond any real sprint saturate instead of
/// wrapping.
pub fn xp_earned(questions_correct: u32, combo_max: u32) -> i64 {
    let base = questions_correct as i64 * XP_PER_CORRECT;
    let bonus = combo_max as i64 * XP_PER_COMBO;
    (base + bonus).saturating_mul(ComboState::multiplier_tenths(combo_max) as i64) / 10
}

/// Level rungs double in cost: 100 XP to reach level 2, 200 more for level
/// 3, 400 more for level 4, capped at LEVEL_CAP. Recomputed from total XP on
/// every write, never stored incrementally.
pub fn level_for_xp(xp: i64) -> u32 {
    let mut level = 1u32;
    let mut threshold = 0i64;
    let mut cost = LEVEL_BASE_COST;
    while level < LEVEL_CAP && xp >= threshold.saturating_add(cost) {
        threshold = threshold.saturating_add(cost);
        cost = cost.saturating_mul(2);
        level += 1;
    }
    level
}

/// An award on the day after the last active day extends the streak, a
/// second award on the same day leaves it alone, any other gap restarts at
/// one.
pub fn next_streak(last_active: Option<&str>, today: NaiveDate, current: u32) -> u32 {
    match last_active.and_then(parse_date) {
        Some(last) if last == today => current,
        Some(last) if last.succ_opt() == Some(today) => current.saturating_add(1),
        _ => 1,
    }
}

/// Pure step from previous stats to next stats. The store runs this inside
/// its atomic apply so every call site shares one rule set.
pub fn advance(
    prev: &UserStatsRecord,
    xp_delta: i64,
    combo_max: u32,
    today: NaiveDate,
) -> UserStatsRecord {
    let xp = prev.xp.saturating_add(xp_delta);
    UserStatsRecord {
        user_id: prev.user_id.clone(),
        xp,
        level: level_for_xp(xp),
        streak_days: next_streak(prev.last_active_date.as_deref(), today, prev.streak_days),
        best_combo: prev.best_combo.max(combo_max),
        last_active_date: Some(date_to_str(today)),
        updated_at: BsonDateTime::now(),
    }
}

/// Applies sprint and task rewards through the store's atomic operation.
pub struct ProgressionEngine {
    store: Arc<dyn SprintStore>,
}

impl ProgressionEngine {
    pub fn new(store: Arc<dyn SprintStore>) -> Self {
        Self { store }
    }

    pub async fn award_sprint(
        &self,
        user_id: &str,
        outcome: &SprintOutcome,
        today: NaiveDate,
    ) -> Result<RewardResponse, SprintError> {
        let xp = xp_earned(outcome.questions_correct, outcome.combo_max);
        let stats = self
            .store
            .apply_reward(user_id, xp, outcome.combo_max, today)
            .await?;
        XP_AWARDED_TOTAL.inc_by(xp as u64);

        Ok(RewardResponse {
            xp_earned: xp,
            new_streak: stats.streak_days,
            new_level: stats.level,
            total_xp: stats.xp,
        })
    }

    pub async fn award_task(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<RewardResponse, SprintError> {
        let stats = self.store.apply_reward(user_id, TASK_XP, 0, today).await?;
        XP_AWARDED_TOTAL.inc_by(TASK_XP as u64);

        Ok(RewardResponse {
            xp_earned: TASK_XP,
            new_streak: stats.streak_days,
            new_level: stats.level,
            total_xp: stats.xp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn xp_follows_the_documented_example() {
        // 5 correct, best combo 5: base 50, bonus 25, multiplier 1.1
        assert_eq!(xp_earned(5, 5), 82);
    }

    #[test]
    fn xp_flooring_does_not_lose_to_float_rounding() {
        // 90 * 1.2 in f64 is 107.999..., which would floor to 107.
        assert_eq!(xp_earned(6, 6), 108);
    }

    #[test]
    fn xp_floors_fractional_totals() {
        // base 50, bonus 45, multiplier 1.3: 95 * 1.3 = 123.5
        assert_eq!(xp_earned(5, 9), 123);
    }

    #[test]
    fn xp_edges() {
        assert_eq!(xp_earned(0, 0), 0);
        assert_eq!(xp_earned(10, 0), 100);
        assert_eq!(xp_earned(0, 3), 16);
    }

    #[test]
    fn xp_saturates_on_absurd_counters() {
        // The raw product exceeds i64; the result must stay positive
        // rather than wrap into a stats-shrinking negative.
        assert_eq!(xp_earned(u32::MAX, u32::MAX), i64::MAX / 10);
    }

    #[test]
    fn level_thresholds_double_per_rung() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(299), 2);
        assert_eq!(level_for_xp(300), 3);
        assert_eq!(level_for_xp(699), 3);
        assert_eq!(level_for_xp(700), 4);
        assert_eq!(level_for_xp(1500), 5);
    }

    #[test]
    fn level_is_capped() {
        assert_eq!(level_for_xp(i64::MAX), LEVEL_CAP);
    }

    #[test]
    fn level_survives_huge_xp_totals() {
        // Rung 58 costs more XP than an i64 can hold, so every total from
        // the level-57 threshold up to i64::MAX - 1 stops there.
        let last_affordable = 100 * ((1i64 << 56) - 1);
        assert_eq!(level_for_xp(last_affordable), 57);
        assert_eq!(level_for_xp(last_affordable + 1), 57);
        assert_eq!(level_for_xp(i64::MAX - 1), 57);
    }

    #[test]
    fn level_never_decreases_with_more_xp() {
        let mut last = 0;
        for xp in (0..=5000).step_by(50) {
            let level = level_for_xp(xp);
            assert!(level >= last, "level dropped at {} xp", xp);
            last = level;
        }
    }

    #[test]
    fn streak_extends_on_consecutive_days() {
        let today = date(2025, 3, 8);
        assert_eq!(next_streak(Some("2025-03-07"), today, 4), 5);
    }

    #[test]
    fn streak_unchanged_on_same_day() {
        let today = date(2025, 3, 8);
        assert_eq!(next_streak(Some("2025-03-08"), today, 4), 4);
    }

    #[test]
    fn streak_resets_after_a_gap() {
        let today = date(2025, 3, 8);
        assert_eq!(next_streak(Some("2025-03-05"), today, 9), 1);
    }

    #[test]
    fn streak_starts_at_one_for_new_users() {
        let today = date(2025, 3, 8);
        assert_eq!(next_streak(None, today, 0), 1);
        assert_eq!(next_streak(Some("garbage"), today, 7), 1);
    }

    #[test]
    fn streak_crosses_month_boundaries() {
        let today = date(2025, 4, 1);
        assert_eq!(next_streak(Some("2025-03-31"), today, 2), 3);
    }

    #[test]
    fn advance_applies_every_rule_at_once() {
        let mut prev = UserStatsRecord::fresh("u1");
        prev.xp = 250;
        prev.level = 2;
        prev.streak_days = 3;
        prev.best_combo = 4;
        prev.last_active_date = Some("2025-03-07".to_string());

        let next = advance(&prev, 82, 5, date(2025, 3, 8));
        assert_eq!(next.xp, 332);
        assert_eq!(next.level, 3);
        assert_eq!(next.streak_days, 4);
        assert_eq!(next.best_combo, 5);
        assert_eq!(next.last_active_date.as_deref(), Some("2025-03-08"));
    }

    #[test]
    fn advance_keeps_higher_historical_combo() {
        let mut prev = UserStatsRecord::fresh("u1");
        prev.best_combo = 8;

        let next = advance(&prev, 10, 3, date(2025, 3, 8));
        assert_eq!(next.best_combo, 8);
    }
}
