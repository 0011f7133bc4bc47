//! Question records extracted from parsed documents.

use serde::{Deserialize, Serialize};

/// Question type as stored in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillBlank,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillBlank => "fill_blank",
        }
    }

    /// Guess the type from options and answer text.
    ///
    /// Two options reading true/false (or 对/错) make a true/false question; an answer naming
    /// more than one option letter makes a multiple choice one; no options means fill-in.
    pub fn infer(options: &[String], answer: Option<&str>) -> Self {
        if options.is_empty() {
            return match answer.map(|a| a.trim().to_ascii_lowercase()) {
                Some(a) if matches!(a.as_str(), "true" | "false" | "t" | "f" | "对" | "错") => {
                    QuestionType::TrueFalse
                }
                _ => QuestionType::FillBlank,
            };
        }
        if options.len() == 2 {
            let lowered: Vec<String> = options.iter().map(|o| o.trim().to_lowercase()).collect();
            if lowered.iter().all(|o| {
                matches!(o.as_str(), "true" | "false" | "对" | "错" | "正确" | "错误")
            }) {
                return QuestionType::TrueFalse;
            }
        }
        let letters = answer
            .map(|a| a.chars().filter(|c| c.is_ascii_alphabetic()).count())
            .unwrap_or(0);
        if letters > 1 {
            QuestionType::MultipleChoice
        } else {
            QuestionType::SingleChoice
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowest and highest difficulty level.
pub const DIFFICULTY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// One question produced by a successful parse job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedQuestion {
    pub id: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Level 1-5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
}

impl ExtractedQuestion {
    pub fn new(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            options: None,
            answer: None,
            explanation: None,
            difficulty: None,
            question_type: None,
            category_id: None,
        }
    }

    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }
}
