use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::models::card::{CardKind, SprintCard};
use crate::models::track::{Difficulty, LessonDraft, QuestionDraft, TrackDraft};

use super::SprintError;

const BLACKLISTED_TERMS: &[&str] = &["xxx", "nsfw", "escort"];

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"\b\d{10,}\b").unwrap();
}

/// Strips one leading/trailing markdown fence pair if the provider wrapped
/// its JSON in one despite instructions.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let rest = match trimmed.strip_prefix("```") {
        Some(rest) => rest,
        None => return trimmed,
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.trim_start();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim_end()
}

/// Pulls the candidate card entries out of whatever top-level shape the
/// provider produced. Shapes are tried in a fixed order so the same response
/// always decodes the same way: a bare array, then a `content` array, then a
/// `tasks` array, then the object-typed values of a keyed map. The first
/// three preserve provider order; the map fallback cannot promise one.
fn candidate_entries(root: &Value) -> Option<(Vec<Value>, &'static str)> {
    if let Value::Array(items) = root {
        return Some((items.clone(), "array"));
    }
    let map = root.as_object()?;
    if let Some(Value::Array(items)) = map.get("content") {
        return Some((items.clone(), "content"));
    }
    if let Some(Value::Array(items)) = map.get("tasks") {
        return Some((items.clone(), "tasks"));
    }
    let values: Vec<Value> = map
        .values()
        .filter(|value| value.is_object())
        .cloned()
        .collect();
    if values.is_empty() {
        None
    } else {
        Some((values, "object_map"))
    }
}

/// First non-blank string under any of the given keys.
fn field_str(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

/// Answer indexes arrive as numbers, integral floats or numeric strings
/// depending on provider mood.
fn field_index(entry: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| {
        let value = entry.get(key)?;
        if let Some(number) = value.as_u64() {
            return u32::try_from(number).ok();
        }
        if let Some(float) = value.as_f64() {
            if float >= 0.0 && float.fract() == 0.0 && float <= u32::MAX as f64 {
                return Some(float as u32);
            }
            return None;
        }
        value.as_str()?.trim().parse::<u32>().ok()
    })
}

fn field_str_list(entry: &Value, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|key| {
        let items = entry.get(key)?.as_array()?;
        let strings: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        if strings.is_empty() {
            None
        } else {
            Some(strings)
        }
    })
}

fn detect_blacklist(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    BLACKLISTED_TERMS
        .iter()
        .filter_map(|word| {
            if lowered.contains(word) {
                Some(word.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn hygiene_findings(content: &str) -> Vec<String> {
    let mut findings = detect_blacklist(content);
    if EMAIL_REGEX.is_match(content) {
        findings.push("email".to_string());
    }
    if PHONE_REGEX.is_match(content) {
        findings.push("phone".to_string());
    }
    findings
}

fn card_text(card: &SprintCard) -> String {
    let mut text = format!("{} {}", card.title, card.content);
    if let Some(options) = &card.options {
        text.push(' ');
        text.push_str(&options.join(" "));
    }
    if let Some(explanation) = &card.explanation {
        text.push(' ');
        text.push_str(explanation);
    }
    text
}

fn decode_card(entry: &Value) -> Option<SprintCard> {
    let title = field_str(entry, &["title", "name", "heading"])?;
    let content = field_str(entry, &["content", "body", "text", "description"])?;

    let kind = match field_str(entry, &["kind", "type", "card_type", "cardType"]) {
        // An explicit but unrecognized kind is a card we cannot render.
        Some(raw) => raw.parse::<CardKind>().ok()?,
        None => {
            if entry.get("options").is_some() {
                CardKind::Quiz
            } else {
                CardKind::Info
            }
        }
    };

    let card = SprintCard {
        title,
        content,
        kind,
        options: field_str_list(entry, &["options", "choices", "answers"]),
        correct_answer: field_index(
            entry,
            &["correct_answer", "correctAnswer", "answer_index", "answerIndex"],
        ),
        explanation: field_str(entry, &["explanation", "rationale"]),
        code_snippet: field_str(entry, &["code_snippet", "codeSnippet", "code", "snippet"]),
    };

    if !card.is_well_formed() {
        return None;
    }

    let findings = hygiene_findings(&card_text(&card));
    if !findings.is_empty() {
        tracing::warn!(
            "dropping card '{}' after hygiene scan: {:?}",
            card.title,
            findings
        );
        return None;
    }

    Some(card)
}

/// Turns a raw provider completion into a validated card list. Individual
/// bad cards are dropped; an unusable response as a whole is an error.
pub fn normalize_cards(raw: &str) -> Result<Vec<SprintCard>, SprintError> {
    let body = strip_fences(raw);
    let root: Value = serde_json::from_str(body).map_err(|e| {
        SprintError::MalformedContent(format!("provider response is not JSON: {}", e))
    })?;

    let (entries, shape) = candidate_entries(&root).ok_or_else(|| {
        SprintError::MalformedContent("no card list found in provider response".to_string())
    })?;

    let total = entries.len();
    let cards: Vec<SprintCard> = entries.iter().filter_map(decode_card).collect();

    if cards.len() < total {
        tracing::warn!(
            "dropped {} of {} cards from {} response",
            total - cards.len(),
            total,
            shape
        );
    }
    if cards.is_empty() {
        return Err(SprintError::EmptyContent);
    }

    Ok(cards)
}

fn decode_question(entry: &Value) -> Option<QuestionDraft> {
    let question = QuestionDraft {
        prompt: field_str(entry, &["prompt", "question", "text"])?,
        options: field_str_list(entry, &["options", "choices", "answers"])?,
        correct_answer: field_index(
            entry,
            &["correct_answer", "correctAnswer", "answer_index", "answerIndex"],
        )?,
        explanation: field_str(entry, &["explanation", "rationale"]),
    };
    if question.is_well_formed() {
        Some(question)
    } else {
        None
    }
}

fn decode_lesson(entry: &Value) -> Option<LessonDraft> {
    let title = field_str(entry, &["title", "name", "heading"])?;
    let content = field_str(entry, &["content", "body", "text"])?;

    let question_value = entry.get("question").or_else(|| entry.get("quiz"))?;
    let question = decode_question(question_value)?;

    let lesson_text = format!(
        "{} {} {} {}",
        title,
        content,
        question.prompt,
        question.options.join(" ")
    );
    let findings = hygiene_findings(&lesson_text);
    if !findings.is_empty() {
        tracing::warn!(
            "dropping lesson '{}' after hygiene scan: {:?}",
            title,
            findings
        );
        return None;
    }

    Some(LessonDraft {
        title,
        content,
        question,
    })
}

/// Turns a raw provider completion into a validated track draft. Track-level
/// fields are mandatory; individual bad lessons are dropped.
pub fn normalize_track(raw: &str, topic: &str) -> Result<TrackDraft, SprintError> {
    let body = strip_fences(raw);
    let root: Value = serde_json::from_str(body).map_err(|e| {
        SprintError::MalformedContent(format!("provider response is not JSON: {}", e))
    })?;

    let map = root.as_object().ok_or_else(|| {
        SprintError::MalformedContent("track response must be a JSON object".to_string())
    })?;

    let title = field_str(&root, &["title", "name"])
        .ok_or_else(|| SprintError::MalformedContent("track is missing a title".to_string()))?;
    let description = field_str(&root, &["description", "summary"]).unwrap_or_default();

    let difficulty_raw = field_str(&root, &["difficulty", "level"]).ok_or_else(|| {
        SprintError::MalformedContent("track is missing a difficulty".to_string())
    })?;
    let difficulty = difficulty_raw.parse::<Difficulty>().map_err(|_| {
        SprintError::MalformedContent(format!("unknown track difficulty '{}'", difficulty_raw))
    })?;

    let lesson_entries = ["lessons", "content", "tasks"]
        .iter()
        .find_map(|key| map.get(*key))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SprintError::MalformedContent("track has no lesson list".to_string())
        })?;

    let total = lesson_entries.len();
    let lessons: Vec<LessonDraft> = lesson_entries.iter().filter_map(decode_lesson).collect();

    if lessons.len() < total {
        tracing::warn!(
            "dropped {} of {} lessons while normalizing track for '{}'",
            total - lessons.len(),
            total,
            topic
        );
    }
    if lessons.is_empty() {
        return Err(SprintError::EmptyContent);
    }

    Ok(TrackDraft {
        title,
        description,
        topic: topic.to_string(),
        difficulty,
        lessons,
    })
}
