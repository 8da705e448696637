use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use redis::aio::ConnectionManager;

use crate::metrics::{
    record_cache_hit, record_cache_miss, track_cache_operation, SPRINTS_COMPLETED_TOTAL,
    SPRINTS_STARTED_TOTAL, SYNTHESIS_ATTEMPTS_TOTAL, TRACKS_SYNTHESIZED_TOTAL,
};
use crate::models::card::{CardKind, SprintCard};
use crate::models::session::{SprintOutcome, SprintSession};
use crate::models::sprint::{DailySprintRecord, SprintTaskRecord};
use crate::models::stats::{RewardResponse, UserStatsRecord};
use crate::models::track::{Difficulty, TrackBundle, TrackRecord};
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::utc_today;

use super::generation::GenerationProvider;
use super::progression::{self, ProgressionEngine};
use super::store::{CompletionOutcome, SprintStore, StoreError};
use super::{normalizer, prompt_builder, SprintError};

const DEFAULT_TOPIC: &str = "general programming";
const REPLY_CACHE_TTL_SECS: u64 = 86400;

/// Built-in cards served when generation fails twice. Generic on purpose so
/// they read sensibly for any topic.
fn fallback_cards(topic: &str) -> Vec<SprintCard> {
    vec![
        SprintCard {
            title: "Spaced repetition".to_string(),
            content: format!(
                "We could not build fresh cards for \"{}\" right now. Reviewing \
                 yesterday's material is the next best use of this sprint.",
                topic
            ),
            kind: CardKind::Info,
            options: None,
            correct_answer: None,
            explanation: None,
            code_snippet: None,
        },
        SprintCard {
            title: "Quick check".to_string(),
            content: "What is the most effective way to retain new material?".to_string(),
            kind: CardKind::Quiz,
            options: Some(vec![
                "Reread your notes once".to_string(),
                "Test yourself at spaced intervals".to_string(),
                "Highlight everything important".to_string(),
            ]),
            correct_answer: Some(1),
            explanation: Some(
                "Active recall at increasing intervals beats passive review.".to_string(),
            ),
            code_snippet: None,
        },
    ]
}

/// Façade over the sprint engine. The API layer calls nothing else.
pub struct SprintOrchestrator {
    store: Arc<dyn SprintStore>,
    provider: Arc<dyn GenerationProvider>,
    progression: ProgressionEngine,
    reply_cache: Option<ConnectionManager>,
}

impl SprintOrchestrator {
    pub fn new(store: Arc<dyn SprintStore>, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            progression: ProgressionEngine::new(store.clone()),
            store,
            provider,
            reply_cache: None,
        }
    }

    pub fn with_reply_cache(mut self, redis: ConnectionManager) -> Self {
        self.reply_cache = Some(redis);
        self
    }

    /// Starts (or resumes) today's sprint for the user. Serves the cached
    /// sprint when one exists, otherwise synthesizes one, falling back to
    /// built-in cards rather than failing the request. The returned session
    /// is already active.
    pub async fn start_sprint(
        &self,
        user_id: &str,
        topic: Option<&str>,
        difficulty: Option<Difficulty>,
    ) -> Result<SprintSession, SprintError> {
        if user_id.trim().is_empty() {
            return Err(SprintError::InvalidInput(
                "user_id must not be blank".to_string(),
            ));
        }
        let topic = match topic {
            Some(topic) if !topic.trim().is_empty() => topic.trim(),
            Some(_) => {
                return Err(SprintError::InvalidInput(
                    "topic must not be blank".to_string(),
                ))
            }
            None => DEFAULT_TOPIC,
        };
        let difficulty = difficulty.unwrap_or(Difficulty::Beginner);

        let mut session = SprintSession::begin(user_id);
        let today = utc_today();

        if let Some(existing) = self.store.cached_sprint(user_id, today).await? {
            SPRINTS_STARTED_TOTAL.with_label_values(&["cached"]).inc();
            session.activate(&existing).map_err(anyhow::Error::new)?;
            return Ok(session);
        }

        let record = match self.synthesize_sprint(user_id, topic, difficulty, today).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    "sprint generation for {} failed, serving fallback: {}",
                    user_id,
                    err
                );
                DailySprintRecord::new(user_id, today, topic, difficulty, fallback_cards(topic), true)
            }
        };

        let record = match self.store.insert_sprint(&record).await {
            Ok(()) => {
                let source = if record.degraded { "fallback" } else { "generated" };
                SPRINTS_STARTED_TOTAL.with_label_values(&[source]).inc();
                record
            }
            // Another call won the per-day uniqueness race; serve its sprint.
            Err(StoreError::AlreadyExists) => {
                SPRINTS_STARTED_TOTAL.with_label_values(&["cached"]).inc();
                self.store.cached_sprint(user_id, today).await?.ok_or_else(|| {
                    SprintError::Internal(anyhow!(
                        "sprint insert for {} lost a uniqueness race but no row is readable",
                        user_id
                    ))
                })?
            }
            Err(err) => return Err(err.into()),
        };

        session.activate(&record).map_err(anyhow::Error::new)?;
        Ok(session)
    }

    async fn synthesize_sprint(
        &self,
        user_id: &str,
        topic: &str,
        difficulty: Difficulty,
        today: NaiveDate,
    ) -> Result<DailySprintRecord, SprintError> {
        let prompt = prompt_builder::sprint_prompt(topic, difficulty)?;

        let cards = retry_async_with_config(RetryConfig::synthesis(), || async {
            let result = async {
                let raw = self.provider.generate(&prompt).await?;
                normalizer::normalize_cards(&raw)
            }
            .await;

            let outcome = if result.is_ok() { "ok" } else { "error" };
            SYNTHESIS_ATTEMPTS_TOTAL
                .with_label_values(&["sprint", outcome])
                .inc();
            result
        })
        .await?;

        Ok(DailySprintRecord::new(
            user_id, today, topic, difficulty, cards, false,
        ))
    }

    /// Applies the sprint reward exactly once. Replays return the original
    /// reward, rebuilt from storage when the reply cache has expired.
    pub async fn complete_sprint(
        &self,
        user_id: &str,
        sprint_id: &str,
        outcome: SprintOutcome,
    ) -> Result<RewardResponse, SprintError> {
        if user_id.trim().is_empty() || sprint_id.trim().is_empty() {
            return Err(SprintError::InvalidInput(
                "user_id and sprint_id must not be blank".to_string(),
            ));
        }
        if outcome.total_questions == 0 {
            return Err(SprintError::InvalidInput(
                "total_questions must be positive".to_string(),
            ));
        }
        if outcome.questions_correct > outcome.total_questions {
            return Err(SprintError::InvalidInput(
                "questions_correct cannot exceed total_questions".to_string(),
            ));
        }
        if outcome.combo_max > outcome.questions_correct {
            return Err(SprintError::InvalidInput(
                "combo_max cannot exceed questions_correct".to_string(),
            ));
        }

        if let Some(reward) = self.cached_reply("sprint", sprint_id, user_id).await {
            SPRINTS_COMPLETED_TOTAL.with_label_values(&["replayed"]).inc();
            return Ok(reward);
        }

        let today = utc_today();
        let xp = progression::xp_earned(outcome.questions_correct, outcome.combo_max);

        let completion = self
            .store
            .complete_sprint(sprint_id, user_id, xp)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => SprintError::NotFound("sprint".to_string()),
                other => other.into(),
            })?;

        match completion {
            CompletionOutcome::First => {
                let reward = match self.progression.award_sprint(user_id, &outcome, today).await {
                    Ok(reward) => reward,
                    Err(err) => {
                        // The reward never landed; hand the row back so a
                        // retry observes First again instead of Replay.
                        if let Err(reopen_err) =
                            self.store.reopen_sprint(sprint_id, user_id).await
                        {
                            tracing::error!(
                                "sprint {} reward failed and the row could not be reopened: {}",
                                sprint_id,
                                reopen_err
                            );
                        }
                        return Err(err);
                    }
                };
                self.cache_reply("sprint", sprint_id, user_id, &reward).await;
                SPRINTS_COMPLETED_TOTAL.with_label_values(&["rewarded"]).inc();
                Ok(reward)
            }
            CompletionOutcome::Replay { xp_earned } => {
                SPRINTS_COMPLETED_TOTAL.with_label_values(&["replayed"]).inc();
                self.replayed_reward(user_id, xp_earned).await
            }
        }
    }

    pub async fn create_task(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<SprintTaskRecord, SprintError> {
        if user_id.trim().is_empty() {
            return Err(SprintError::InvalidInput(
                "user_id must not be blank".to_string(),
            ));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(SprintError::InvalidInput(
                "content must not be blank".to_string(),
            ));
        }

        let record = SprintTaskRecord::new(user_id, content);
        self.store.insert_task(&record).await?;
        Ok(record)
    }

    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<RewardResponse, SprintError> {
        if user_id.trim().is_empty() || task_id.trim().is_empty() {
            return Err(SprintError::InvalidInput(
                "user_id and task_id must not be blank".to_string(),
            ));
        }

        if let Some(reward) = self.cached_reply("task", task_id, user_id).await {
            return Ok(reward);
        }

        let today = utc_today();
        let completion = self
            .store
            .complete_task(task_id, user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => SprintError::NotFound("task".to_string()),
                other => other.into(),
            })?;

        match completion {
            CompletionOutcome::First => {
                let reward = match self.progression.award_task(user_id, today).await {
                    Ok(reward) => reward,
                    Err(err) => {
                        if let Err(reopen_err) = self.store.reopen_task(task_id, user_id).await {
                            tracing::error!(
                                "task {} reward failed and the row could not be reopened: {}",
                                task_id,
                                reopen_err
                            );
                        }
                        return Err(err);
                    }
                };
                self.cache_reply("task", task_id, user_id, &reward).await;
                Ok(reward)
            }
            CompletionOutcome::Replay { xp_earned } => {
                self.replayed_reward(user_id, xp_earned).await
            }
        }
    }

    /// Synthesizes and persists a full course track. The draft is validated
    /// before any row lands, so a partial persist means storage trouble, not
    /// bad content; it surfaces with the track id attached.
    pub async fn synthesize_track(&self, topic: &str) -> Result<TrackRecord, SprintError> {
        let prompt = prompt_builder::track_prompt(topic)?;

        let draft = retry_async_with_config(RetryConfig::synthesis(), || async {
            let result = async {
                let raw = self.provider.generate(&prompt).await?;
                normalizer::normalize_track(&raw, topic)
            }
            .await;

            let outcome = if result.is_ok() { "ok" } else { "error" };
            SYNTHESIS_ATTEMPTS_TOTAL
                .with_label_values(&["track", outcome])
                .inc();
            result
        })
        .await?;

        match self.store.insert_track(&draft).await {
            Ok(track) => {
                TRACKS_SYNTHESIZED_TOTAL.with_label_values(&["ok"]).inc();
                tracing::info!(
                    "Track synthesized: {} ({} lessons)",
                    track.id.to_hex(),
                    track.lessons_count
                );
                Ok(track)
            }
            Err(err) => {
                TRACKS_SYNTHESIZED_TOTAL.with_label_values(&["error"]).inc();
                Err(err.into())
            }
        }
    }

    pub async fn track(&self, track_id: &str) -> Result<TrackBundle, SprintError> {
        self.store
            .track_bundle(track_id)
            .await?
            .ok_or_else(|| SprintError::NotFound("track".to_string()))
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStatsRecord, SprintError> {
        Ok(self
            .store
            .user_stats(user_id)
            .await?
            .unwrap_or_else(|| UserStatsRecord::fresh(user_id)))
    }

    /// Reward response for a row that was already completed. The XP comes
    /// from the row itself; streak and level reflect current stats, which
    /// only later-day activity can have moved.
    async fn replayed_reward(
        &self,
        user_id: &str,
        xp_earned: i64,
    ) -> Result<RewardResponse, SprintError> {
        let stats = self
            .store
            .user_stats(user_id)
            .await?
            .unwrap_or_else(|| UserStatsRecord::fresh(user_id));

        Ok(RewardResponse {
            xp_earned,
            new_streak: stats.streak_days,
            new_level: stats.level,
            total_xp: stats.xp,
        })
    }

    async fn cached_reply(
        &self,
        scope: &str,
        id: &str,
        user_id: &str,
    ) -> Option<RewardResponse> {
        let redis = self.reply_cache.as_ref()?;
        let mut conn = redis.clone();
        let cache_key = format!("idempotency:{}:{}:{}", scope, id, user_id);

        let lookup = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(&cache_key)
                .query_async::<Option<String>>(&mut conn)
                .await
                .context("Failed to check completion reply cache")
        })
        .await;

        match lookup {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(reward) => {
                    record_cache_hit();
                    Some(reward)
                }
                Err(err) => {
                    tracing::warn!("discarding unreadable cached reply {}: {}", cache_key, err);
                    None
                }
            },
            Ok(None) => {
                record_cache_miss();
                None
            }
            // A cache outage must not block completion.
            Err(err) => {
                tracing::warn!("reply cache lookup failed for {}: {}", cache_key, err);
                None
            }
        }
    }

    async fn cache_reply(&self, scope: &str, id: &str, user_id: &str, reward: &RewardResponse) {
        let redis = match self.reply_cache.as_ref() {
            Some(redis) => redis,
            None => return,
        };
        let mut conn = redis.clone();
        let cache_key = format!("idempotency:{}:{}:{}", scope, id, user_id);

        let json = match serde_json::to_string(reward) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("failed to serialize reply for {}: {}", cache_key, err);
                return;
            }
        };

        let saved = track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&cache_key)
                .arg(REPLY_CACHE_TTL_SECS)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to cache completion reply")
        })
        .await;

        if let Err(err) = saved {
            tracing::warn!("reply cache write failed for {}: {}", cache_key, err);
        }
    }
}
