use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;
use tokio::sync::Mutex;

use crate::models::sprint::{DailySprintRecord, SprintTaskRecord};
use crate::models::stats::UserStatsRecord;
use crate::models::track::{
    LessonRecord, LessonWithQuestion, QuestionRecord, TrackBundle, TrackDraft, TrackRecord,
};
use crate::services::progression;
use crate::utils::time::date_to_str;

use super::{CompletionOutcome, SprintStore, StoreError};

#[derive(Default)]
struct MemoryState {
    sprints: HashMap<String, DailySprintRecord>,
    tasks: HashMap<String, SprintTaskRecord>,
    tracks: HashMap<ObjectId, TrackRecord>,
    lessons: Vec<LessonRecord>,
    questions: Vec<QuestionRecord>,
    stats: HashMap<String, UserStatsRecord>,
    reward_failures: usize,
}

/// In-memory store with the same contracts as the Mongo implementation. One
/// mutex around the whole state stands in for the database's atomicity.
#[derive(Default)]
pub struct MemorySprintStore {
    state: Mutex<MemoryState>,
    fail_lessons_after: Option<usize>,
}

impl MemorySprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that aborts track persistence after `n` lessons, for exercising
    /// partial-synthesis handling.
    pub fn failing_after(n: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            fail_lessons_after: Some(n),
        }
    }

    /// Store whose next `n` reward writes fail, for exercising the
    /// completion rollback path.
    pub fn failing_rewards(n: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reward_failures: n,
                ..MemoryState::default()
            }),
            fail_lessons_after: None,
        }
    }
}

#[async_trait]
impl SprintStore for MemorySprintStore {
    async fn cached_sprint(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySprintRecord>, StoreError> {
        let date = date_to_str(date);
        let state = self.state.lock().await;
        Ok(state
            .sprints
            .values()
            .find(|row| row.user_id == user_id && row.date == date)
            .cloned())
    }

    async fn insert_sprint(&self, record: &DailySprintRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let duplicate = state.sprints.contains_key(&record.id)
            || state
                .sprints
                .values()
                .any(|row| row.user_id == record.user_id && row.date == record.date);
        if duplicate {
            return Err(StoreError::AlreadyExists);
        }
        state.sprints.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn sprint(&self, sprint_id: &str) -> Result<Option<DailySprintRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sprints.get(sprint_id).cloned())
    }

    async fn complete_sprint(
        &self,
        sprint_id: &str,
        user_id: &str,
        xp_earned: i64,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut state = self.state.lock().await;
        match state.sprints.get_mut(sprint_id) {
            Some(row) if row.user_id == user_id => {
                if row.is_completed {
                    return Ok(CompletionOutcome::Replay {
                        xp_earned: row.xp_earned,
                    });
                }
                row.is_completed = true;
                row.xp_earned = xp_earned;
                row.completed_at = Some(BsonDateTime::now());
                Ok(CompletionOutcome::First)
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn reopen_sprint(&self, sprint_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.sprints.get_mut(sprint_id) {
            Some(row) if row.user_id == user_id && row.is_completed => {
                row.is_completed = false;
                row.xp_earned = 0;
                row.completed_at = None;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn insert_task(&self, record: &SprintTaskRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists);
        }
        state.tasks.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn task(&self, task_id: &str) -> Result<Option<SprintTaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(task_id).cloned())
    }

    async fn complete_task(
        &self,
        task_id: &str,
        user_id: &str,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(task_id) {
            Some(row) if row.user_id == user_id => {
                if row.is_completed {
                    return Ok(CompletionOutcome::Replay {
                        xp_earned: progression::TASK_XP,
                    });
                }
                row.is_completed = true;
                row.completed_at = Some(BsonDateTime::now());
                Ok(CompletionOutcome::First)
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn reopen_task(&self, task_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(task_id) {
            Some(row) if row.user_id == user_id && row.is_completed => {
                row.is_completed = false;
                row.completed_at = None;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn insert_track(&self, draft: &TrackDraft) -> Result<TrackRecord, StoreError> {
        let mut state = self.state.lock().await;

        let track = TrackRecord {
            id: ObjectId::new(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            topic: draft.topic.clone(),
            difficulty: draft.difficulty,
            lessons_count: draft.lessons.len() as i32,
            is_published: false,
            created_at: BsonDateTime::now(),
        };
        state.tracks.insert(track.id, track.clone());

        for (position, lesson) in draft.lessons.iter().enumerate() {
            if let Some(limit) = self.fail_lessons_after {
                if position >= limit {
                    return Err(StoreError::PartialSynthesis {
                        track_id: track.id.to_hex(),
                        detail: format!("lesson insert aborted at position {}", position),
                    });
                }
            }

            let lesson_record = LessonRecord {
                id: ObjectId::new(),
                track_id: track.id,
                position: position as i32,
                title: lesson.title.clone(),
                content: lesson.content.clone(),
            };
            let question_record = QuestionRecord {
                id: ObjectId::new(),
                lesson_id: lesson_record.id,
                prompt: lesson.question.prompt.clone(),
                options: lesson.question.options.clone(),
                correct_answer: lesson.question.correct_answer,
                explanation: lesson.question.explanation.clone(),
            };
            state.lessons.push(lesson_record);
            state.questions.push(question_record);
        }

        Ok(track)
    }

    async fn track_bundle(&self, track_id: &str) -> Result<Option<TrackBundle>, StoreError> {
        let oid = match ObjectId::parse_str(track_id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        let state = self.state.lock().await;
        let track = match state.tracks.get(&oid) {
            Some(track) => track.clone(),
            None => return Ok(None),
        };

        let mut lessons: Vec<&LessonRecord> = state
            .lessons
            .iter()
            .filter(|lesson| lesson.track_id == oid)
            .collect();
        lessons.sort_by_key(|lesson| lesson.position);

        let pairs = lessons
            .into_iter()
            .filter_map(|lesson| {
                state
                    .questions
                    .iter()
                    .find(|question| question.lesson_id == lesson.id)
                    .map(|question| LessonWithQuestion {
                        lesson: lesson.clone(),
                        question: question.clone(),
                    })
            })
            .collect();

        Ok(Some(TrackBundle {
            track,
            lessons: pairs,
        }))
    }

    async fn user_stats(&self, user_id: &str) -> Result<Option<UserStatsRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.stats.get(user_id).cloned())
    }

    async fn apply_reward(
        &self,
        user_id: &str,
        xp_delta: i64,
        combo_max: u32,
        today: NaiveDate,
    ) -> Result<UserStatsRecord, StoreError> {
        let mut state = self.state.lock().await;
        if state.reward_failures > 0 {
            state.reward_failures -= 1;
            return Err(StoreError::Backend(anyhow!("reward write refused")));
        }
        let prev = state
            .stats
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserStatsRecord::fresh(user_id));
        let next = progression::advance(&prev, xp_delta, combo_max, today);
        state.stats.insert(user_id.to_string(), next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::card::{CardKind, SprintCard};
    use crate::models::track::{Difficulty, LessonDraft, QuestionDraft};

    fn sample_sprint(user_id: &str, date: NaiveDate) -> DailySprintRecord {
        let card = SprintCard {
            title: "t".to_string(),
            content: "c".to_string(),
            kind: CardKind::Info,
            options: None,
            correct_answer: None,
            explanation: None,
            code_snippet: None,
        };
        DailySprintRecord::new(user_id, date, "rust", Difficulty::Beginner, vec![card], false)
    }

    fn sample_draft(lessons: usize) -> TrackDraft {
        TrackDraft {
            title: "Track".to_string(),
            description: String::new(),
            topic: "rust".to_string(),
            difficulty: Difficulty::Beginner,
            lessons: (0..lessons)
                .map(|i| LessonDraft {
                    title: format!("lesson {}", i),
                    content: "body".to_string(),
                    question: QuestionDraft {
                        prompt: "?".to_string(),
                        options: vec!["a".to_string(), "b".to_string()],
                        correct_answer: 0,
                        explanation: None,
                    },
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn second_sprint_for_same_day_is_rejected() {
        let store = MemorySprintStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();

        store
            .insert_sprint(&sample_sprint("u1", date))
            .await
            .unwrap();
        let err = store
            .insert_sprint(&sample_sprint("u1", date))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        // Different user on the same day is fine.
        store
            .insert_sprint(&sample_sprint("u2", date))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn completion_is_first_then_replay() {
        let store = MemorySprintStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let sprint = sample_sprint("u1", date);
        store.insert_sprint(&sprint).await.unwrap();

        let first = store.complete_sprint(&sprint.id, "u1", 82).await.unwrap();
        assert_eq!(first, CompletionOutcome::First);

        let replay = store.complete_sprint(&sprint.id, "u1", 999).await.unwrap();
        assert_eq!(replay, CompletionOutcome::Replay { xp_earned: 82 });
    }

    #[tokio::test]
    async fn completion_checks_the_owner() {
        let store = MemorySprintStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let sprint = sample_sprint("u1", date);
        store.insert_sprint(&sprint).await.unwrap();

        let err = store
            .complete_sprint(&sprint.id, "someone-else", 82)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn reopened_sprint_completes_as_first_again() {
        let store = MemorySprintStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let sprint = sample_sprint("u1", date);
        store.insert_sprint(&sprint).await.unwrap();

        store.complete_sprint(&sprint.id, "u1", 82).await.unwrap();
        store.reopen_sprint(&sprint.id, "u1").await.unwrap();

        let row = store.sprint(&sprint.id).await.unwrap().unwrap();
        assert!(!row.is_completed);
        assert_eq!(row.xp_earned, 0);

        // Only completed rows can be reopened.
        let err = store.reopen_sprint(&sprint.id, "u1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let again = store.complete_sprint(&sprint.id, "u1", 82).await.unwrap();
        assert_eq!(again, CompletionOutcome::First);
    }

    #[tokio::test]
    async fn failing_store_reports_partial_synthesis() {
        let store = MemorySprintStore::failing_after(1);
        let err = store.insert_track(&sample_draft(3)).await.unwrap_err();

        match err {
            StoreError::PartialSynthesis { track_id, .. } => {
                // The partial track row is still readable for inspection.
                let bundle = store.track_bundle(&track_id).await.unwrap();
                assert!(bundle.is_some());
                assert_eq!(bundle.unwrap().lessons.len(), 1);
            }
            other => panic!("expected PartialSynthesis, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn track_bundle_keeps_lesson_order() {
        let store = MemorySprintStore::new();
        let track = store.insert_track(&sample_draft(3)).await.unwrap();

        let bundle = store
            .track_bundle(&track.id.to_hex())
            .await
            .unwrap()
            .unwrap();
        let positions: Vec<i32> = bundle
            .lessons
            .iter()
            .map(|pair| pair.lesson.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
