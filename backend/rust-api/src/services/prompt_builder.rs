use crate::models::track::Difficulty;

use super::SprintError;

pub const CARDS_PER_SPRINT: usize = 5;
pub const LESSONS_PER_TRACK: usize = 5;

/// Content hints for topics that mention a known language. Free text only:
/// the provider reads them, nothing downstream parses them.
const LANGUAGE_HINTS: &[(&str, &str)] = &[
    (
        "rust",
        "Prefer code cards that exercise ownership, borrowing and Result handling; snippets must be idiomatic Rust.",
    ),
    (
        "python",
        "Prefer short, runnable snippets; quiz on comprehensions, iterators and common standard library pitfalls.",
    ),
    (
        "javascript",
        "Quiz on closures, async/await and equality semantics; snippets should be modern ES module style.",
    ),
    (
        "typescript",
        "Focus on the type system: narrowing, generics and structural typing; snippets must type-check.",
    ),
    (
        "go",
        "Prefer snippets with goroutines, channels and error returns; keep them gofmt-clean.",
    ),
    (
        "sql",
        "Quiz on joins, aggregation and indexes; every snippet must be a complete runnable statement.",
    ),
    (
        "kotlin",
        "Focus on null safety, data classes and coroutines; snippets should be concise and idiomatic.",
    ),
    (
        "swift",
        "Quiz on optionals, value semantics and protocol conformance; snippets must compile as-is.",
    ),
];

const CARD_SCHEMA: &str = r#"Respond with a JSON array only. Each element is a card object:
{
  "title": string,
  "content": string,
  "kind": "quiz" | "code" | "info",
  "options": [string, ...],      // quiz cards only, 2-4 entries
  "correct_answer": integer,     // quiz cards only, zero-based index into options
  "explanation": string,         // optional, shown after answering
  "code_snippet": string         // code cards only
}
Do not wrap the JSON in markdown fences. Do not add commentary before or after it."#;

const TRACK_SCHEMA: &str = r#"Respond with a single JSON object only:
{
  "title": string,
  "description": string,
  "difficulty": "BEGINNER" | "INTERMEDIATE" | "ADVANCED",
  "lessons": [
    {
      "title": string,
      "content": string,          // 2-4 paragraphs of lesson text
      "question": {
        "prompt": string,
        "options": [string, ...], // 2-4 entries
        "correct_answer": integer, // zero-based index into options
        "explanation": string
      }
    }
  ]
}
Every lesson carries exactly one question. Do not wrap the JSON in markdown
fences. Do not add commentary before or after it."#;

pub fn language_hint(topic: &str) -> Option<&'static str> {
    let lowered = topic.to_lowercase();
    LANGUAGE_HINTS
        .iter()
        .find(|(language, _)| lowered.contains(language))
        .map(|(_, hint)| *hint)
}

fn validated_topic(topic: &str) -> Result<&str, SprintError> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(SprintError::InvalidInput(
            "topic must not be blank".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Instruction string for one daily sprint. Deterministic for a given
/// (topic, difficulty) pair.
pub fn sprint_prompt(topic: &str, difficulty: Difficulty) -> Result<String, SprintError> {
    let topic = validated_topic(topic)?;

    let mut prompt = format!(
        "You are generating a daily learning sprint for a mobile app.\n\
         Topic: {topic}\n\
         Audience level: {level}\n\
         Produce exactly {count} cards: a mix of quiz, code and info cards, \
         at least {quizzes} of them quiz cards.\n",
        topic = topic,
        level = difficulty.as_str(),
        count = CARDS_PER_SPRINT,
        quizzes = CARDS_PER_SPRINT - 2,
    );
    if let Some(hint) = language_hint(topic) {
        prompt.push_str(hint);
        prompt.push('\n');
    }
    prompt.push_str(CARD_SCHEMA);

    Ok(prompt)
}

/// Instruction string for a full course track on the given topic.
pub fn track_prompt(topic: &str) -> Result<String, SprintError> {
    let topic = validated_topic(topic)?;

    let mut prompt = format!(
        "You are designing a short learning track for a mobile app.\n\
         Topic: {topic}\n\
         Produce a track of {count} lessons that build on each other, \
         ordered from fundamentals to application.\n\
         Pick the difficulty that fits the topic as stated.\n",
        topic = topic,
        count = LESSONS_PER_TRACK,
    );
    if let Some(hint) = language_hint(topic) {
        prompt.push_str(hint);
        prompt.push('\n');
    }
    prompt.push_str(TRACK_SCHEMA);

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_prompt_embeds_topic_and_level() {
        let prompt = sprint_prompt("Rust ownership", Difficulty::Intermediate).unwrap();
        assert!(prompt.contains("Rust ownership"));
        assert!(prompt.contains("intermediate"));
        assert!(prompt.contains("JSON array"));
        assert!(prompt.contains("correct_answer"));
    }

    #[test]
    fn sprint_prompt_includes_language_hint_when_topic_names_one() {
        let with_hint = sprint_prompt("rust lifetimes", Difficulty::Beginner).unwrap();
        assert!(with_hint.contains("ownership, borrowing"));

        let without_hint = sprint_prompt("project management", Difficulty::Beginner).unwrap();
        assert!(!without_hint.contains("ownership, borrowing"));
    }

    #[test]
    fn blank_topic_is_rejected() {
        assert!(matches!(
            sprint_prompt("   ", Difficulty::Beginner),
            Err(SprintError::InvalidInput(_))
        ));
        assert!(matches!(
            track_prompt(""),
            Err(SprintError::InvalidInput(_))
        ));
    }

    #[test]
    fn topic_is_trimmed_before_embedding() {
        let prompt = sprint_prompt("  sql joins  ", Difficulty::Beginner).unwrap();
        assert!(prompt.contains("Topic: sql joins\n"));
    }

    #[test]
    fn track_prompt_demands_one_question_per_lesson() {
        let prompt = track_prompt("http caching").unwrap();
        assert!(prompt.contains("http caching"));
        assert!(prompt.contains("exactly one question"));
        assert!(prompt.contains("BEGINNER"));
    }

    #[test]
    fn language_hint_matches_case_insensitively() {
        assert!(language_hint("Advanced TypeScript generics").is_some());
        assert!(language_hint("gardening").is_none());
    }
}
