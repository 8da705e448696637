use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::utils::time::bson_to_iso;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            _ => Err(format!("Invalid difficulty: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub lessons_count: i32,
    /// Synthesized tracks start unpublished; the admin review surface flips
    /// this, never the engine.
    pub is_published: bool,
    pub created_at: mongodb::bson::DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub track_id: ObjectId,
    pub position: i32,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub lesson_id: ObjectId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: u32,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Normalized provider output for a full track, not yet persisted.
#[derive(Debug, Clone)]
pub struct TrackDraft {
    pub title: String,
    pub description: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub lessons: Vec<LessonDraft>,
}

#[derive(Debug, Clone)]
pub struct LessonDraft {
    pub title: String,
    pub content: String,
    pub question: QuestionDraft,
}

#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: u32,
    pub explanation: Option<String>,
}

impl QuestionDraft {
    pub fn is_well_formed(&self) -> bool {
        !self.prompt.trim().is_empty()
            && !self.options.is_empty()
            && (self.correct_answer as usize) < self.options.len()
    }
}

/// A track with its lessons and their questions, as read back from storage.
#[derive(Debug, Clone)]
pub struct TrackBundle {
    pub track: TrackRecord,
    pub lessons: Vec<LessonWithQuestion>,
}

#[derive(Debug, Clone)]
pub struct LessonWithQuestion {
    pub lesson: LessonRecord,
    pub question: QuestionRecord,
}

#[derive(Debug, Serialize)]
pub struct TrackView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub is_published: bool,
    pub lessons: Vec<LessonView>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct LessonView {
    pub id: String,
    pub position: i32,
    pub title: String,
    pub content: String,
    pub question: QuestionView,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: u32,
    pub explanation: Option<String>,
}

impl TrackView {
    pub fn from_bundle(bundle: &TrackBundle) -> Self {
        Self {
            id: bundle.track.id.to_hex(),
            title: bundle.track.title.clone(),
            description: bundle.track.description.clone(),
            topic: bundle.track.topic.clone(),
            difficulty: bundle.track.difficulty,
            is_published: bundle.track.is_published,
            lessons: bundle.lessons.iter().map(LessonView::from_pair).collect(),
            created_at: bson_to_iso(&bundle.track.created_at),
        }
    }
}

impl LessonView {
    pub fn from_pair(pair: &LessonWithQuestion) -> Self {
        Self {
            id: pair.lesson.id.to_hex(),
            position: pair.lesson.position,
            title: pair.lesson.title.clone(),
            content: pair.lesson.content.clone(),
            question: QuestionView {
                id: pair.question.id.to_hex(),
                prompt: pair.question.prompt.clone(),
                options: pair.question.options.clone(),
                correct_answer: pair.question.correct_answer,
                explanation: pair.question.explanation.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrackCreatedResponse {
    pub track_id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub lessons_count: i32,
    pub is_published: bool,
}

impl TrackCreatedResponse {
    pub fn from_record(track: &TrackRecord) -> Self {
        Self {
            track_id: track.id.to_hex(),
            title: track.title.clone(),
            difficulty: track.difficulty,
            lessons_count: track.lessons_count,
            is_published: track.is_published,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime as BsonDateTime};

    #[test]
    fn difficulty_parses_any_case() {
        assert_eq!("BEGINNER".parse::<Difficulty>(), Ok(Difficulty::Beginner));
        assert_eq!(
            "Intermediate".parse::<Difficulty>(),
            Ok(Difficulty::Intermediate)
        );
        assert_eq!(" advanced ".parse::<Difficulty>(), Ok(Difficulty::Advanced));
        assert!("expert".parse::<Difficulty>().is_err());
    }

    #[test]
    fn track_record_deserializes_from_document() {
        let track_id = ObjectId::new();
        let now = BsonDateTime::now();
        let doc = doc! {
            "_id": track_id,
            "title": "Rust Basics",
            "description": "Start here",
            "topic": "rust",
            "difficulty": "beginner",
            "lessons_count": 3,
            "is_published": false,
            "created_at": now,
        };

        let parsed: TrackRecord =
            mongodb::bson::from_document(doc).expect("track should deserialize");
        assert_eq!(parsed.id, track_id);
        assert_eq!(parsed.difficulty, Difficulty::Beginner);
        assert!(!parsed.is_published);
        assert_eq!(parsed.created_at, now);
    }

    #[test]
    fn question_draft_validates_answer_index() {
        let draft = QuestionDraft {
            prompt: "Pick one".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_answer: 1,
            explanation: None,
        };
        assert!(draft.is_well_formed());

        let out_of_range = QuestionDraft {
            correct_answer: 2,
            ..draft.clone()
        };
        assert!(!out_of_range.is_well_formed());

        let no_options = QuestionDraft {
            options: vec![],
            correct_answer: 0,
            ..draft
        };
        assert!(!no_options.is_well_formed());
    }
}
