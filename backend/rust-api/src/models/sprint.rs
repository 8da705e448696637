use chrono::NaiveDate;
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::card::SprintCard;
use crate::models::session::SprintSession;
use crate::models::track::Difficulty;
use crate::utils::time::{bson_to_iso, date_to_str};

/// One generated sprint per user per UTC calendar day. The unique index on
/// (user_id, date) is what enforces that, not application-level checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySprintRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub cards: Vec<SprintCard>,
    /// True when the sprint was built from the fallback card after the
    /// provider failed twice.
    pub degraded: bool,
    pub is_completed: bool,
    pub xp_earned: i64,
    pub created_at: BsonDateTime,
    #[serde(default)]
    pub completed_at: Option<BsonDateTime>,
}

impl DailySprintRecord {
    pub fn new(
        user_id: &str,
        date: NaiveDate,
        topic: &str,
        difficulty: Difficulty,
        cards: Vec<SprintCard>,
        degraded: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date: date_to_str(date),
            topic: topic.to_string(),
            difficulty,
            cards,
            degraded,
            is_completed: false,
            xp_earned: 0,
            created_at: BsonDateTime::now(),
            completed_at: None,
        }
    }

    pub fn total_questions(&self) -> u32 {
        self.cards.iter().filter(|c| c.is_answerable()).count() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintTaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub is_completed: bool,
    pub created_at: BsonDateTime,
    #[serde(default)]
    pub completed_at: Option<BsonDateTime>,
}

impl SprintTaskRecord {
    pub fn new(user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            is_completed: false,
            created_at: BsonDateTime::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartSprintRequest {
    #[validate(length(min = 1, max = 64, message = "user_id must be 1-64 characters"))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(max = 120, message = "topic is too long"))]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteSprintRequest {
    #[validate(length(min = 1, max = 64, message = "user_id must be 1-64 characters"))]
    pub user_id: String,
    #[validate(range(max = 10000, message = "questions_correct must be 0-10000"))]
    pub questions_correct: u32,
    #[validate(range(min = 1, max = 10000, message = "total_questions must be 1-10000"))]
    pub total_questions: u32,
    #[validate(range(max = 10000, message = "combo_max must be 0-10000"))]
    pub combo_max: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 64, message = "user_id must be 1-64 characters"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteTaskRequest {
    #[validate(length(min = 1, max = 64, message = "user_id must be 1-64 characters"))]
    pub user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SynthesizeTrackRequest {
    #[validate(length(min = 1, max = 120, message = "topic must be 1-120 characters"))]
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct SprintView {
    pub sprint_id: String,
    pub date: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub cards: Vec<SprintCard>,
    pub degraded: bool,
    pub is_completed: bool,
    pub total_questions: u32,
}

impl SprintView {
    pub fn from_session(session: &SprintSession) -> Self {
        Self {
            sprint_id: session.sprint_id().to_string(),
            date: session.date().to_string(),
            topic: session.topic().to_string(),
            difficulty: session.difficulty(),
            cards: session.cards().to_vec(),
            degraded: session.degraded(),
            is_completed: session.already_completed(),
            total_questions: session.cards().iter().filter(|c| c.is_answerable()).count()
                as u32,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub content: String,
    pub is_completed: bool,
    pub created_at: String,
}

impl TaskView {
    pub fn from_record(record: &SprintTaskRecord) -> Self {
        Self {
            task_id: record.id.clone(),
            content: record.content.clone(),
            is_completed: record.is_completed,
            created_at: bson_to_iso(&record.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::card::{CardKind, SprintCard};

    fn cards() -> Vec<SprintCard> {
        vec![
            SprintCard {
                title: "Intro".to_string(),
                content: "Read this first".to_string(),
                kind: CardKind::Info,
                options: None,
                correct_answer: None,
                explanation: None,
                code_snippet: None,
            },
            SprintCard {
                title: "Check".to_string(),
                content: "Pick the right answer".to_string(),
                kind: CardKind::Quiz,
                options: Some(vec!["yes".to_string(), "no".to_string()]),
                correct_answer: Some(0),
                explanation: None,
                code_snippet: None,
            },
        ]
    }

    #[test]
    fn total_questions_counts_only_quiz_cards() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let sprint =
            DailySprintRecord::new("user-1", date, "rust", Difficulty::Beginner, cards(), false);
        assert_eq!(sprint.total_questions(), 1);
        assert_eq!(sprint.date, "2025-06-01");
        assert!(!sprint.is_completed);
    }

    #[test]
    fn sprint_record_round_trips_through_bson() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let sprint =
            DailySprintRecord::new("user-1", date, "rust", Difficulty::Beginner, cards(), true);

        let doc = mongodb::bson::to_document(&sprint).expect("sprint should serialize");
        assert_eq!(doc.get_str("_id").unwrap(), sprint.id);
        assert_eq!(doc.get_str("date").unwrap(), "2025-06-01");

        let parsed: DailySprintRecord =
            mongodb::bson::from_document(doc).expect("sprint should deserialize");
        assert_eq!(parsed.id, sprint.id);
        assert!(parsed.degraded);
        assert_eq!(parsed.cards.len(), 2);
    }

    #[test]
    fn task_record_defaults_to_incomplete() {
        let task = SprintTaskRecord::new("user-1", "Review yesterday's notes");
        assert!(!task.is_completed);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn complete_request_rejects_runaway_counters() {
        let absurd = CompleteSprintRequest {
            user_id: "user-1".to_string(),
            questions_correct: u32::MAX,
            total_questions: u32::MAX,
            combo_max: u32::MAX,
        };
        assert!(absurd.validate().is_err());

        let plausible = CompleteSprintRequest {
            user_id: "user-1".to_string(),
            questions_correct: 5,
            total_questions: 5,
            combo_max: 5,
        };
        assert!(plausible.validate().is_ok());
    }
}
