use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::metrics::track_db_operation;
use crate::models::sprint::{DailySprintRecord, SprintTaskRecord};
use crate::models::stats::UserStatsRecord;
use crate::models::track::{
    LessonRecord, LessonWithQuestion, QuestionRecord, TrackBundle, TrackDraft, TrackRecord,
};
use crate::services::progression;
use crate::utils::time::date_to_str;

use super::{CompletionOutcome, SprintStore, StoreError};

const SPRINTS: &str = "daily_sprints";
const TASKS: &str = "sprint_tasks";
const TRACKS: &str = "tracks";
const LESSONS: &str = "lessons";
const QUESTIONS: &str = "questions";
const USER_STATS: &str = "user_stats";

const REWARD_RETRY_LIMIT: usize = 5;

pub struct MongoSprintStore {
    mongo: Database,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

impl MongoSprintStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Creates the indexes the store's contracts rely on. Must run before
    /// serving traffic: without the unique (user_id, date) index, per-day
    /// sprint uniqueness degrades into a read-then-insert race.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let sprints: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);
        let unique_day = IndexModel::builder()
            .keys(doc! { "user_id": 1, "date": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        sprints
            .create_index(unique_day)
            .await
            .context("Failed to create sprint uniqueness index")?;

        let lessons: Collection<LessonRecord> = self.mongo.collection(LESSONS);
        let lessons_by_track = IndexModel::builder()
            .keys(doc! { "track_id": 1, "position": 1 })
            .build();
        lessons
            .create_index(lessons_by_track)
            .await
            .context("Failed to create lesson index")?;

        let questions: Collection<QuestionRecord> = self.mongo.collection(QUESTIONS);
        let questions_by_lesson = IndexModel::builder()
            .keys(doc! { "lesson_id": 1 })
            .build();
        questions
            .create_index(questions_by_lesson)
            .await
            .context("Failed to create question index")?;

        Ok(())
    }
}

#[async_trait]
impl SprintStore for MongoSprintStore {
    async fn cached_sprint(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySprintRecord>, StoreError> {
        let collection: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);
        let filter = doc! { "user_id": user_id, "date": date_to_str(date) };

        let row = track_db_operation("find_one", SPRINTS, async {
            collection
                .find_one(filter)
                .await
                .context("Failed to query daily sprint cache")
        })
        .await?;

        Ok(row)
    }

    async fn insert_sprint(&self, record: &DailySprintRecord) -> Result<(), StoreError> {
        let collection: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);

        match collection.insert_one(record).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::AlreadyExists),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("Failed to insert daily sprint"),
            )),
        }
    }

    async fn sprint(&self, sprint_id: &str) -> Result<Option<DailySprintRecord>, StoreError> {
        let collection: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);

        let row = track_db_operation("find_one", SPRINTS, async {
            collection
                .find_one(doc! { "_id": sprint_id })
                .await
                .context("Failed to query daily sprint")
        })
        .await?;

        Ok(row)
    }

    async fn complete_sprint(
        &self,
        sprint_id: &str,
        user_id: &str,
        xp_earned: i64,
    ) -> Result<CompletionOutcome, StoreError> {
        let collection: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);

        let filter = doc! {
            "_id": sprint_id,
            "user_id": user_id,
            "is_completed": false,
        };
        let update = doc! {
            "$set": {
                "is_completed": true,
                "xp_earned": xp_earned,
                "completed_at": BsonDateTime::now(),
            }
        };

        let result = collection
            .update_one(filter, update)
            .await
            .context("Failed to complete daily sprint")?;

        if result.modified_count == 1 {
            return Ok(CompletionOutcome::First);
        }

        // The conditional update matched nothing: the row is either already
        // completed or missing for this user.
        let row = collection
            .find_one(doc! { "_id": sprint_id, "user_id": user_id })
            .await
            .context("Failed to read back daily sprint")?;

        match row {
            Some(row) if row.is_completed => Ok(CompletionOutcome::Replay {
                xp_earned: row.xp_earned,
            }),
            Some(_) => Err(StoreError::Backend(anyhow!(
                "sprint {} update matched nothing but the row is still open",
                sprint_id
            ))),
            None => Err(StoreError::NotFound),
        }
    }

    async fn reopen_sprint(&self, sprint_id: &str, user_id: &str) -> Result<(), StoreError> {
        let collection: Collection<DailySprintRecord> = self.mongo.collection(SPRINTS);

        let filter = doc! {
            "_id": sprint_id,
            "user_id": user_id,
            "is_completed": true,
        };
        let update = doc! {
            "$set": { "is_completed": false, "xp_earned": 0i64 },
            "$unset": { "completed_at": "" },
        };

        let result = collection
            .update_one(filter, update)
            .await
            .context("Failed to reopen daily sprint")?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_task(&self, record: &SprintTaskRecord) -> Result<(), StoreError> {
        let collection: Collection<SprintTaskRecord> = self.mongo.collection(TASKS);

        match collection.insert_one(record).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::AlreadyExists),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("Failed to insert sprint task"),
            )),
        }
    }

    async fn task(&self, task_id: &str) -> Result<Option<SprintTaskRecord>, StoreError> {
        let collection: Collection<SprintTaskRecord> = self.mongo.collection(TASKS);

        let row = track_db_operation("find_one", TASKS, async {
            collection
                .find_one(doc! { "_id": task_id })
                .await
                .context("Failed to query sprint task")
        })
        .await?;

        Ok(row)
    }

    async fn complete_task(
        &self,
        task_id: &str,
        user_id: &str,
    ) -> Result<CompletionOutcome, StoreError> {
        let collection: Collection<SprintTaskRecord> = self.mongo.collection(TASKS);

        let filter = doc! {
            "_id": task_id,
            "user_id": user_id,
            "is_completed": false,
        };
        let update = doc! {
            "$set": {
                "is_completed": true,
                "completed_at": BsonDateTime::now(),
            }
        };

        let result = collection
            .update_one(filter, update)
            .await
            .context("Failed to complete sprint task")?;

        if result.modified_count == 1 {
            return Ok(CompletionOutcome::First);
        }

        let row = collection
            .find_one(doc! { "_id": task_id, "user_id": user_id })
            .await
            .context("Failed to read back sprint task")?;

        match row {
            Some(row) if row.is_completed => Ok(CompletionOutcome::Replay {
                xp_earned: progression::TASK_XP,
            }),
            Some(_) => Err(StoreError::Backend(anyhow!(
                "task {} update matched nothing but the row is still open",
                task_id
            ))),
            None => Err(StoreError::NotFound),
        }
    }

    async fn reopen_task(&self, task_id: &str, user_id: &str) -> Result<(), StoreError> {
        let collection: Collection<SprintTaskRecord> = self.mongo.collection(TASKS);

        let filter = doc! {
            "_id": task_id,
            "user_id": user_id,
            "is_completed": true,
        };
        let update = doc! {
            "$set": { "is_completed": false },
            "$unset": { "completed_at": "" },
        };

        let result = collection
            .update_one(filter, update)
            .await
            .context("Failed to reopen sprint task")?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_track(&self, draft: &TrackDraft) -> Result<TrackRecord, StoreError> {
        let tracks: Collection<TrackRecord> = self.mongo.collection(TRACKS);
        let lessons: Collection<LessonRecord> = self.mongo.collection(LESSONS);
        let questions: Collection<QuestionRecord> = self.mongo.collection(QUESTIONS);

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

        tracks
            .insert_one(&track)
            .await
            .context("Failed to insert track")?;

        // From here on the track row exists. Failures leave a partial draft
        // behind on purpose; the caller surfaces the id instead of us trying
        // to compensate.
        for (position, lesson) in draft.lessons.iter().enumerate() {
            let lesson_record = LessonRecord {
                id: ObjectId::new(),
                track_id: track.id,
                position: position as i32,
                title: lesson.title.clone(),
                content: lesson.content.clone(),
            };
            if let Err(err) = lessons.insert_one(&lesson_record).await {
                return Err(StoreError::PartialSynthesis {
                    track_id: track.id.to_hex(),
                    detail: format!("lesson {} failed to persist: {}", position, err),
                });
            }

            let question_record = QuestionRecord {
                id: ObjectId::new(),
                lesson_id: lesson_record.id,
                prompt: lesson.question.prompt.clone(),
                options: lesson.question.options.clone(),
                correct_answer: lesson.question.correct_answer,
                explanation: lesson.question.explanation.clone(),
            };
            if let Err(err) = questions.insert_one(&question_record).await {
                return Err(StoreError::PartialSynthesis {
                    track_id: track.id.to_hex(),
                    detail: format!("question for lesson {} failed to persist: {}", position, err),
                });
            }
        }

        Ok(track)
    }

    async fn track_bundle(&self, track_id: &str) -> Result<Option<TrackBundle>, StoreError> {
        let oid = match ObjectId::parse_str(track_id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        let tracks: Collection<TrackRecord> = self.mongo.collection(TRACKS);
        let track = track_db_operation("find_one", TRACKS, async {
            tracks
                .find_one(doc! { "_id": oid })
                .await
                .context("Failed to load track")
        })
        .await?;

        let track = match track {
            Some(track) => track,
            None => return Ok(None),
        };

        let lessons_collection: Collection<LessonRecord> = self.mongo.collection(LESSONS);
        let lessons: Vec<LessonRecord> = lessons_collection
            .find(doc! { "track_id": oid })
            .sort(doc! { "position": 1 })
            .await
            .context("Failed to query lessons")?
            .try_collect()
            .await
            .context("Failed to collect lessons")?;

        let lesson_ids: Vec<ObjectId> = lessons.iter().map(|lesson| lesson.id).collect();
        let questions_collection: Collection<QuestionRecord> = self.mongo.collection(QUESTIONS);
        let questions: Vec<QuestionRecord> = questions_collection
            .find(doc! { "lesson_id": { "$in": lesson_ids } })
            .await
            .context("Failed to query questions")?
            .try_collect()
            .await
            .context("Failed to collect questions")?;

        let mut by_lesson: HashMap<ObjectId, QuestionRecord> = questions
            .into_iter()
            .map(|question| (question.lesson_id, question))
            .collect();

        let mut pairs = Vec::with_capacity(lessons.len());
        for lesson in lessons {
            match by_lesson.remove(&lesson.id) {
                Some(question) => pairs.push(LessonWithQuestion { lesson, question }),
                None => {
                    // Partial drafts can hold a lesson whose question never landed.
                    tracing::warn!(
                        "lesson {} of track {} has no question",
                        lesson.id.to_hex(),
                        track_id
                    );
                }
            }
        }

        Ok(Some(TrackBundle {
            track,
            lessons: pairs,
        }))
    }

    async fn user_stats(&self, user_id: &str) -> Result<Option<UserStatsRecord>, StoreError> {
        let collection: Collection<UserStatsRecord> = self.mongo.collection(USER_STATS);

        let row = track_db_operation("find_one", USER_STATS, async {
            collection
                .find_one(doc! { "_id": user_id })
                .await
                .context("Failed to query user stats")
        })
        .await?;

        Ok(row)
    }

    async fn apply_reward(
        &self,
        user_id: &str,
        xp_delta: i64,
        combo_max: u32,
        today: NaiveDate,
    ) -> Result<UserStatsRecord, StoreError> {
        let collection: Collection<UserStatsRecord> = self.mongo.collection(USER_STATS);

        for _ in 0..REWARD_RETRY_LIMIT {
            let prev = collection
                .find_one(doc! { "_id": user_id })
                .await
                .context("Failed to read user stats")?;

            match prev {
                None => {
                    let fresh = UserStatsRecord::fresh(user_id);
                    let next = progression::advance(&fresh, xp_delta, combo_max, today);
                    match collection.insert_one(&next).await {
                        Ok(_) => return Ok(next),
                        // Lost the first-writer race; reread and go again.
                        Err(err) if is_duplicate_key(&err) => continue,
                        Err(err) => {
                            return Err(StoreError::Backend(
                                anyhow::Error::new(err).context("Failed to create user stats"),
                            ))
                        }
                    }
                }
                Some(prev) => {
                    let next = progression::advance(&prev, xp_delta, combo_max, today);
                    let guard = doc! {
                        "_id": user_id,
                        "xp": prev.xp,
                        "updated_at": prev.updated_at,
                    };
                    let result = collection
                        .replace_one(guard, &next)
                        .await
                        .context("Failed to write user stats")?;
                    if result.matched_count == 1 {
                        return Ok(next);
                    }
                    // Lost the compare-and-swap; reread and go again.
                }
            }
        }

        Err(StoreError::Backend(anyhow!(
            "reward write for user {} kept losing races after {} attempts",
            user_id,
            REWARD_RETRY_LIMIT
        )))
    }
}
