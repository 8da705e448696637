use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Quiz,
    Code,
    Info,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Quiz => "quiz",
            CardKind::Code => "code",
            CardKind::Info => "info",
        }
    }
}

impl FromStr for CardKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "quiz" => Ok(CardKind::Quiz),
            "code" => Ok(CardKind::Code),
            "info" => Ok(CardKind::Info),
            _ => Err(format!("Invalid card kind: {}", value)),
        }
    }
}

/// A single learning unit inside a daily sprint. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintCard {
    pub title: String,
    pub content: String,
    pub kind: CardKind,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_answer: Option<u32>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

impl SprintCard {
    /// Quiz cards must carry a non-empty option list and an in-range answer
    /// index; other kinds only need title and content.
    pub fn is_well_formed(&self) -> bool {
        if self.title.trim().is_empty() || self.content.trim().is_empty() {
            return false;
        }
        match self.kind {
            CardKind::Quiz => match (&self.options, self.correct_answer) {
                (Some(options), Some(answer)) => {
                    !options.is_empty() && (answer as usize) < options.len()
                }
                _ => false,
            },
            CardKind::Code | CardKind::Info => true,
        }
    }

    pub fn is_answerable(&self) -> bool {
        self.kind == CardKind::Quiz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_card(answer: u32) -> SprintCard {
        SprintCard {
            title: "Ownership".to_string(),
            content: "Which statement about moves is true?".to_string(),
            kind: CardKind::Quiz,
            options: Some(vec![
                "Moves copy the heap".to_string(),
                "Moves transfer ownership".to_string(),
            ]),
            correct_answer: Some(answer),
            explanation: None,
            code_snippet: None,
        }
    }

    #[test]
    fn card_kind_parses_case_insensitively() {
        assert_eq!("QUIZ".parse::<CardKind>(), Ok(CardKind::Quiz));
        assert_eq!(" code ".parse::<CardKind>(), Ok(CardKind::Code));
        assert!("lesson".parse::<CardKind>().is_err());
    }

    #[test]
    fn quiz_card_requires_valid_answer_index() {
        assert!(quiz_card(1).is_well_formed());
        assert!(!quiz_card(2).is_well_formed());
    }

    #[test]
    fn quiz_card_requires_options() {
        let mut card = quiz_card(0);
        card.options = None;
        assert!(!card.is_well_formed());

        let mut card = quiz_card(0);
        card.options = Some(vec![]);
        assert!(!card.is_well_formed());
    }

    #[test]
    fn info_card_needs_only_title_and_content() {
        let card = SprintCard {
            title: "Borrowing".to_string(),
            content: "Shared references are read-only.".to_string(),
            kind: CardKind::Info,
            options: None,
            correct_answer: None,
            explanation: None,
            code_snippet: None,
        };
        assert!(card.is_well_formed());
        assert!(!card.is_answerable());
    }

    #[test]
    fn blank_title_rejected() {
        let mut card = quiz_card(0);
        card.title = "   ".to_string();
        assert!(!card.is_well_formed());
    }
}
