//! Challenges that must be answered to dismiss a firing alarm.
//!
//! Two kinds exist: a stored multiple-choice [`Question`] and a generated
//! [`ComputedChallenge`] (three operands, two operators). Both are immutable
//! once handed to a session.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which kind of challenge a session issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMode {
    #[default]
    MultipleChoice,
    Computed,
}

impl std::str::FromStr for ChallengeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multiple_choice" | "abcd" | "choice" => Ok(ChallengeMode::MultipleChoice),
            "computed" | "math" | "input" => Ok(ChallengeMode::Computed),
            other => Err(ValidationError::InvalidValue {
                field: "challenge_mode".into(),
                message: format!("expected multiple_choice or computed, got '{other}'"),
            }),
        }
    }
}

/// Answer label of a multiple-choice option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerLabel {
    A,
    B,
    C,
    D,
}

impl AnswerLabel {
    pub const ALL: [AnswerLabel; 4] = [AnswerLabel::A, AnswerLabel::B, AnswerLabel::C, AnswerLabel::D];

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLabel::A => "A",
            AnswerLabel::B => "B",
            AnswerLabel::C => "C",
            AnswerLabel::D => "D",
        }
    }

    /// Case-insensitive parse of `a`..`d`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "A" => Some(AnswerLabel::A),
            "B" => Some(AnswerLabel::B),
            "C" => Some(AnswerLabel::C),
            "D" => Some(AnswerLabel::D),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            AnswerLabel::A => 0,
            AnswerLabel::B => 1,
            AnswerLabel::C => 2,
            AnswerLabel::D => 3,
        }
    }
}

/// A stored multiple-choice question with four options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    pub options: [String; 4],
    pub correct: AnswerLabel,
}

impl Question {
    /// Build a not-yet-stored question (id 0).
    ///
    /// # Errors
    /// Returns an error if the prompt or any option is blank, or if any field
    /// contains the wire delimiters `|` or a newline.
    pub fn new(
        prompt: impl Into<String>,
        options: [String; 4],
        correct: AnswerLabel,
    ) -> Result<Self, ValidationError> {
        let question = Self {
            id: 0,
            prompt: prompt.into(),
            options,
            correct,
        };
        question.validate()?;
        Ok(question)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_field("prompt", &self.prompt)?;
        for (label, option) in AnswerLabel::ALL.iter().zip(self.options.iter()) {
            check_field(&format!("option_{}", label.as_str().to_lowercase()), option)?;
        }
        Ok(())
    }

    pub fn option(&self, label: AnswerLabel) -> &str {
        &self.options[label.index()]
    }
}

fn check_field(name: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(name.to_string()));
    }
    if value.contains('|') || value.contains('\n') {
        return Err(ValidationError::InvalidValue {
            field: name.to_string(),
            message: "must not contain '|' or a line break".into(),
        });
    }
    Ok(())
}

/// Arithmetic operator used by computed challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
}

impl Operator {
    const ALL: [Operator; 3] = [Operator::Add, Operator::Sub, Operator::Mul];

    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
        }
    }

    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Sub => lhs - rhs,
            Operator::Mul => lhs * rhs,
        }
    }
}

/// `a op1 b op2 c` with operands drawn from 1..=10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedChallenge {
    pub operands: [i64; 3],
    pub operators: [Operator; 2],
}

impl ComputedChallenge {
    pub fn new(operands: [i64; 3], operators: [Operator; 2]) -> Self {
        Self { operands, operators }
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let operands = [
            rng.gen_range(1..=10),
            rng.gen_range(1..=10),
            rng.gen_range(1..=10),
        ];
        let operators = [
            Operator::ALL[rng.gen_range(0..Operator::ALL.len())],
            Operator::ALL[rng.gen_range(0..Operator::ALL.len())],
        ];
        Self { operands, operators }
    }

    /// Left to right, except that a trailing `*` binds first when the leading
    /// operator is `+` or `-`.
    pub fn result(&self) -> i64 {
        let [a, b, c] = self.operands;
        let [first, second] = self.operators;
        if second == Operator::Mul && first != Operator::Mul {
            first.apply(a, Operator::Mul.apply(b, c))
        } else {
            second.apply(first.apply(a, b), c)
        }
    }

    pub fn expression(&self) -> String {
        let [a, b, c] = self.operands;
        let [first, second] = self.operators;
        format!("{a} {} {b} {} {c}", first.symbol(), second.symbol())
    }
}

/// A challenge issued to a dismissal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Challenge {
    MultipleChoice(Question),
    Computed(ComputedChallenge),
}

impl Challenge {
    pub fn mode(&self) -> ChallengeMode {
        match self {
            Challenge::MultipleChoice(_) => ChallengeMode::MultipleChoice,
            Challenge::Computed(_) => ChallengeMode::Computed,
        }
    }

    /// Stored question id, if this challenge came from the question store.
    pub fn question_id(&self) -> Option<i64> {
        match self {
            Challenge::MultipleChoice(q) => Some(q.id),
            Challenge::Computed(_) => None,
        }
    }

    /// Labels compare case-insensitively; computed results by exact integer value.
    pub fn accepts(&self, answer: &str) -> bool {
        match self {
            Challenge::MultipleChoice(q) => AnswerLabel::parse(answer) == Some(q.correct),
            Challenge::Computed(c) => answer.trim().parse::<i64>().ok() == Some(c.result()),
        }
    }

    /// Text shown to the operator.
    pub fn prompt(&self) -> String {
        match self {
            Challenge::MultipleChoice(q) => {
                let mut text = q.prompt.clone();
                for label in AnswerLabel::ALL {
                    text.push_str(&format!("\n  {}) {}", label.as_str(), q.option(label)));
                }
                text
            }
            Challenge::Computed(c) => format!("{} = ?", c.expression()),
        }
    }
}

/// Starter question set inserted into an empty question store.
pub fn starter_questions() -> Vec<Question> {
    fn q(prompt: &str, options: [&str; 4], correct: AnswerLabel) -> Question {
        Question {
            id: 0,
            prompt: prompt.to_string(),
            options: options.map(str::to_string),
            correct,
        }
    }
    vec![
        q("What is 15 * 4?", ["50", "60", "70", "65"], AnswerLabel::B),
        q("Which element has the symbol Fe?", ["Gold", "Silver", "Iron", "Copper"], AnswerLabel::C),
        q("What is the capital of Poland?", ["Krakow", "Gdansk", "Warsaw", "Wroclaw"], AnswerLabel::C),
        q("How many minutes are in 2.5 hours?", ["120", "150", "180", "140"], AnswerLabel::B),
        q("Which board drives the robot?", ["Arduino", "ESP32", "Raspberry Pi", "STM32"], AnswerLabel::B),
    ]
}
