//! Canned document parser for tests: fixed questions or a fixed error, no text parsing.

use async_trait::async_trait;
use qbank_types::{DocumentParser, ExtractedQuestion, ParseInput, ParserError};

pub struct StaticParser {
    outcome: Result<Vec<ExtractedQuestion>, String>,
}

impl StaticParser {
    pub fn returning(questions: Vec<ExtractedQuestion>) -> Self {
        Self {
            outcome: Ok(questions),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
        }
    }
}

#[async_trait]
impl DocumentParser for StaticParser {
    async fn parse(&self, _input: &ParseInput) -> Result<Vec<ExtractedQuestion>, ParserError> {
        match &self.outcome {
            Ok(questions) => Ok(questions.clone()),
            Err(message) => Err(ParserError::Other(message.clone())),
        }
    }
}
