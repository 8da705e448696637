use serde::{Deserialize, Serialize};

use crate::models::card::SprintCard;
use crate::models::sprint::DailySprintRecord;
use crate::models::track::Difficulty;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintPhase {
    Initializing,
    Active,
    Summary,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("sprint session is not active")]
    NotActive,
    #[error("current card does not take an answer")]
    NotAnswerable,
    #[error("no card at the current position")]
    OutOfCards,
}

/// Combo counter for the in-progress sprint. `current` resets on a wrong
/// answer, `max` never decreases, and only `max` reaches the XP formula.
#[derive(Debug, Clone, Serialize)]
pub struct ComboState {
    pub current: u32,
    pub max: u32,
    pub multiplier: f64,
}

impl ComboState {
    pub fn new() -> Self {
        Self {
            current: 0,
            max: 0,
            multiplier: 1.0,
        }
    }

    /// Multiplier in tenths: 10 means x1.0, 13 means x1.3. Integer form so
    /// XP flooring never depends on float rounding.
    pub fn multiplier_tenths(combo: u32) -> u32 {
        10 + combo / 3
    }

    pub fn multiplier_for(combo: u32) -> f64 {
        Self::multiplier_tenths(combo) as f64 / 10.0
    }

    pub fn record_correct(&mut self) {
        self.current += 1;
        self.max = self.max.max(self.current);
        self.multiplier = Self::multiplier_for(self.current);
    }

    pub fn record_wrong(&mut self) {
        self.current = 0;
        self.multiplier = 1.0;
    }
}

impl Default for ComboState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub combo: ComboState,
}

/// Counters the client reports back on completion; also what a finished
/// session produces when the caller drives it server-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SprintOutcome {
    pub questions_correct: u32,
    pub total_questions: u32,
    pub combo_max: u32,
}

/// Explicit sprint lifecycle: INITIALIZING until content is attached,
/// ACTIVE while cards are being answered, SUMMARY once the run is over.
#[derive(Debug, Clone)]
pub struct SprintSession {
    phase: SprintPhase,
    user_id: String,
    sprint_id: String,
    date: String,
    topic: String,
    difficulty: Difficulty,
    cards: Vec<SprintCard>,
    degraded: bool,
    already_completed: bool,
    position: usize,
    questions_correct: u32,
    combo: ComboState,
}

impl SprintSession {
    pub fn begin(user_id: &str) -> Self {
        Self {
            phase: SprintPhase::Initializing,
            user_id: user_id.to_string(),
            sprint_id: String::new(),
            date: String::new(),
            topic: String::new(),
            difficulty: Difficulty::Beginner,
            cards: Vec::new(),
            degraded: false,
            already_completed: false,
            position: 0,
            questions_correct: 0,
            combo: ComboState::new(),
        }
    }

    /// Attach synthesized content and move to ACTIVE. Valid only once,
    /// from INITIALIZING.
    pub fn activate(&mut self, record: &DailySprintRecord) -> Result<(), SessionError> {
        if self.phase != SprintPhase::Initializing {
            return Err(SessionError::NotActive);
        }
        self.sprint_id = record.id.clone();
        self.date = record.date.clone();
        self.topic = record.topic.clone();
        self.difficulty = record.difficulty;
        self.cards = record.cards.clone();
        self.degraded = record.degraded;
        self.already_completed = record.is_completed;
        self.phase = SprintPhase::Active;
        Ok(())
    }

    pub fn phase(&self) -> SprintPhase {
        self.phase
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sprint_id(&self) -> &str {
        &self.sprint_id
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn cards(&self) -> &[SprintCard] {
        &self.cards
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// True when the attached sprint was already completed on a previous
    /// request today. The client can jump straight to the summary screen.
    pub fn already_completed(&self) -> bool {
        self.already_completed
    }

    pub fn combo(&self) -> &ComboState {
        &self.combo
    }

    pub fn current_card(&self) -> Option<&SprintCard> {
        self.cards.get(self.position)
    }

    /// Grade the current quiz card and advance. The last card moves the
    /// session to SUMMARY.
    pub fn submit_answer(&mut self, correct: bool) -> Result<AnswerFeedback, SessionError> {
        if self.phase != SprintPhase::Active {
            return Err(SessionError::NotActive);
        }
        let card = self.current_card().ok_or(SessionError::OutOfCards)?;
        if !card.is_answerable() {
            return Err(SessionError::NotAnswerable);
        }

        if correct {
            self.questions_correct += 1;
            self.combo.record_correct();
        } else {
            self.combo.record_wrong();
        }
        self.advance();

        Ok(AnswerFeedback {
            correct,
            combo: self.combo.clone(),
        })
    }

    /// Move past an info or code card without grading.
    pub fn skip_card(&mut self) -> Result<(), SessionError> {
        if self.phase != SprintPhase::Active {
            return Err(SessionError::NotActive);
        }
        let card = self.current_card().ok_or(SessionError::OutOfCards)?;
        if card.is_answerable() {
            return Err(SessionError::NotAnswerable);
        }
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        self.position += 1;
        if self.position >= self.cards.len() {
            self.phase = SprintPhase::Summary;
        }
    }

    /// Close the run and report its counters. Allowed from ACTIVE (early
    /// exit) or SUMMARY; repeated calls return the same outcome.
    pub fn finish(&mut self) -> Result<SprintOutcome, SessionError> {
        match self.phase {
            SprintPhase::Initializing => Err(SessionError::NotActive),
            SprintPhase::Active | SprintPhase::Summary => {
                self.phase = SprintPhase::Summary;
                Ok(SprintOutcome {
                    questions_correct: self.questions_correct,
                    total_questions: self.cards.iter().filter(|c| c.is_answerable()).count()
                        as u32,
                    combo_max: self.combo.max,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::card::CardKind;
    use crate::models::track::Difficulty;
    use chrono::NaiveDate;

    fn quiz(title: &str) -> SprintCard {
        SprintCard {
            title: title.to_string(),
            content: "?".to_string(),
            kind: CardKind::Quiz,
            options: Some(vec!["a".to_string(), "b".to_string()]),
            correct_answer: Some(0),
            explanation: None,
            code_snippet: None,
        }
    }

    fn info(title: &str) -> SprintCard {
        SprintCard {
            title: title.to_string(),
            content: "read".to_string(),
            kind: CardKind::Info,
            options: None,
            correct_answer: None,
            explanation: None,
            code_snippet: None,
        }
    }

    fn active_session(cards: Vec<SprintCard>) -> SprintSession {
        let record = DailySprintRecord::new(
            "user-1",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            "rust",
            Difficulty::Beginner,
            cards,
            false,
        );
        let mut session = SprintSession::begin("user-1");
        assert_eq!(session.phase(), SprintPhase::Initializing);
        session.activate(&record).unwrap();
        session
    }

    #[test]
    fn multiplier_steps_every_three_combo() {
        assert_eq!(ComboState::multiplier_for(0), 1.0);
        assert_eq!(ComboState::multiplier_for(2), 1.0);
        assert_eq!(ComboState::multiplier_for(3), 1.1);
        assert_eq!(ComboState::multiplier_for(5), 1.1);
        assert_eq!(ComboState::multiplier_for(6), 1.2);
        assert_eq!(ComboState::multiplier_for(9), 1.3);
    }

    #[test]
    fn wrong_answer_resets_current_but_not_max() {
        let mut combo = ComboState::new();
        for _ in 0..4 {
            combo.record_correct();
        }
        assert_eq!(combo.current, 4);
        assert_eq!(combo.max, 4);

        combo.record_wrong();
        assert_eq!(combo.current, 0);
        assert_eq!(combo.max, 4);
        assert_eq!(combo.multiplier, 1.0);

        combo.record_correct();
        assert_eq!(combo.current, 1);
        assert_eq!(combo.max, 4);
    }

    #[test]
    fn session_walks_to_summary() {
        let mut session = active_session(vec![info("intro"), quiz("q1"), quiz("q2")]);
        assert_eq!(session.phase(), SprintPhase::Active);

        session.skip_card().unwrap();
        let feedback = session.submit_answer(true).unwrap();
        assert!(feedback.correct);
        assert_eq!(feedback.combo.current, 1);

        session.submit_answer(false).unwrap();
        assert_eq!(session.phase(), SprintPhase::Summary);

        let outcome = session.finish().unwrap();
        assert_eq!(outcome.questions_correct, 1);
        assert_eq!(outcome.total_questions, 2);
        assert_eq!(outcome.combo_max, 1);
    }

    #[test]
    fn combo_max_survives_a_miss() {
        let mut session = active_session(vec![
            quiz("q1"),
            quiz("q2"),
            quiz("q3"),
            quiz("q4"),
            quiz("q5"),
        ]);

        for _ in 0..3 {
            session.submit_answer(true).unwrap();
        }
        session.submit_answer(false).unwrap();
        session.submit_answer(true).unwrap();

        let outcome = session.finish().unwrap();
        assert_eq!(outcome.questions_correct, 4);
        assert_eq!(outcome.combo_max, 3);
    }

    #[test]
    fn answering_an_info_card_is_rejected() {
        let mut session = active_session(vec![info("intro"), quiz("q1")]);
        assert_eq!(
            session.submit_answer(true).unwrap_err(),
            SessionError::NotAnswerable
        );
        assert_eq!(session.skip_card(), Ok(()));
    }

    #[test]
    fn no_answers_before_activation_or_after_summary() {
        let mut fresh = SprintSession::begin("user-1");
        assert_eq!(
            fresh.submit_answer(true).unwrap_err(),
            SessionError::NotActive
        );
        assert!(fresh.finish().is_err());

        let mut session = active_session(vec![quiz("q1")]);
        session.submit_answer(true).unwrap();
        assert_eq!(
            session.submit_answer(true).unwrap_err(),
            SessionError::NotActive
        );

        let first = session.finish().unwrap();
        let second = session.finish().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn early_finish_reports_partial_counters() {
        let mut session = active_session(vec![quiz("q1"), quiz("q2"), quiz("q3")]);
        session.submit_answer(true).unwrap();

        let outcome = session.finish().unwrap();
        assert_eq!(outcome.questions_correct, 1);
        assert_eq!(outcome.total_questions, 3);
        assert_eq!(session.phase(), SprintPhase::Summary);
    }
}
