//! Plain-text question parser.
//!
//! Recognised layout, one item per line:
//!
//! ```text
//! 1. Which planet is closest to the sun?
//! A. Venus
//! B. Mercury
//! Answer: B
//! Explanation: Mercury orbits at about 0.39 AU.
//! Difficulty: 2
//! ```
//!
//! Numbering may use `.`, `)`, `、` or `．`; labels also accept their Chinese forms (`答案`, `解析`,
//! `难度`) and a full-width colon. Lines that match nothing continue the previous field.

use async_trait::async_trait;
use qbank_types::{
    DocumentParser, ExtractedQuestion, ParseInput, ParserError, QuestionType, DIFFICULTY_RANGE,
};

const ANSWER_LABELS: &[&str] = &["correct answer", "answer", "答案"];
const EXPLANATION_LABELS: &[&str] = &["explanation", "analysis", "解析"];
const DIFFICULTY_LABELS: &[&str] = &["difficulty", "难度"];
const SEPARATORS: &[char] = &['.', ')', '、', '．', '）'];

const DEFAULT_ALLOWED_TYPES: &[&str] = &["txt", "md", "markdown", "pdf", "doc", "docx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Content,
    Options,
    Answer,
    Explanation,
}

struct Draft {
    content: String,
    options: Vec<String>,
    answer: Option<String>,
    explanation: Option<String>,
    difficulty: Option<u8>,
    field: Field,
}

impl Draft {
    fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            options: Vec::new(),
            answer: None,
            explanation: None,
            difficulty: None,
            field: Field::Content,
        }
    }

    fn continue_with(&mut self, line: &str) {
        let target = match self.field {
            Field::Content => Some(&mut self.content),
            Field::Options => self.options.last_mut(),
            Field::Answer => self.answer.as_mut(),
            Field::Explanation => self.explanation.as_mut(),
        };
        if let Some(s) = target {
            s.push(' ');
            s.push_str(line);
        }
    }

    fn finish(self, id: u64, category_id: Option<u64>) -> ExtractedQuestion {
        let question_type = QuestionType::infer(&self.options, self.answer.as_deref());
        ExtractedQuestion {
            id,
            content: self.content,
            options: if self.options.is_empty() {
                None
            } else {
                Some(self.options)
            },
            answer: self.answer,
            explanation: self.explanation,
            difficulty: self.difficulty,
            question_type: Some(question_type),
            category_id,
        }
    }
}

/// `"12. text"` -> `"text"`. A `.` followed by a digit is a decimal, not numbering.
fn strip_question_number(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let sep = rest.chars().next().filter(|c| SEPARATORS.contains(c))?;
    let after = &rest[sep.len_utf8()..];
    if sep == '.' && after.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let text = after.trim();
    (!text.is_empty()).then_some(text)
}

/// `"B. text"` -> `"text"` when `B` is the next expected option letter.
fn strip_option(line: &str, expected: char) -> Option<&str> {
    let mut chars = line.chars();
    let letter = chars.next()?;
    if letter.to_ascii_uppercase() != expected {
        return None;
    }
    let sep = chars.next()?;
    if !(SEPARATORS.contains(&sep) || sep == ':' || sep == '：') {
        return None;
    }
    let text = chars.as_str().trim();
    (!text.is_empty()).then_some(text)
}

/// `"Answer: B"` -> `"B"`. The colon is required so prose starting with the label is not taken.
fn strip_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    for label in labels {
        let Some(head) = line.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = line[label.len()..].trim_start();
        if let Some(value) = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))
        {
            return Some(value.trim());
        }
    }
    None
}

/// Line-oriented parser for numbered question lists.
pub struct TextQuestionParser {
    allowed_types: Vec<String>,
}

impl TextQuestionParser {
    pub fn new() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Restrict accepted `file_type` values (compared case-insensitively, leading dot ignored).
    pub fn with_allowed_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_types: types
                .into_iter()
                .map(|t| t.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn check_type(&self, file_type: Option<&str>) -> Result<(), ParserError> {
        let Some(t) = file_type else {
            return Ok(());
        };
        let t = t.trim_start_matches('.').to_ascii_lowercase();
        let t = t.rsplit('/').next().unwrap_or(&t).to_string();
        let accepted = self
            .allowed_types
            .iter()
            .any(|a| *a == t || (t == "plain" && a == "txt"));
        if accepted {
            Ok(())
        } else {
            Err(ParserError::UnsupportedType(t))
        }
    }

    /// Parse `content` into questions numbered from 1.
    pub fn parse_text(&self, content: &str, category_id: Option<u64>) -> Vec<ExtractedQuestion> {
        let mut out = Vec::new();
        let mut current: Option<Draft> = None;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(text) = strip_question_number(line) {
                if let Some(d) = current.take() {
                    out.push(d.finish(out.len() as u64 + 1, category_id));
                }
                current = Some(Draft::new(text));
                continue;
            }
            // Text before the first numbered question is a preamble.
            let Some(draft) = current.as_mut() else {
                continue;
            };
            if let Some(v) = strip_label(line, ANSWER_LABELS) {
                draft.answer = Some(v.to_string());
                draft.field = Field::Answer;
            } else if let Some(v) = strip_label(line, EXPLANATION_LABELS) {
                draft.explanation = Some(v.to_string());
                draft.field = Field::Explanation;
            } else if let Some(v) = strip_label(line, DIFFICULTY_LABELS) {
                draft.difficulty = v.parse::<u8>().ok().filter(|d| DIFFICULTY_RANGE.contains(d));
            } else if let Some(v) = strip_option(line, (b'A' + draft.options.len() as u8) as char)
                .filter(|_| draft.options.len() < 26)
            {
                draft.options.push(v.to_string());
                draft.field = Field::Options;
            } else {
                draft.continue_with(line);
            }
        }
        if let Some(d) = current.take() {
            out.push(d.finish(out.len() as u64 + 1, category_id));
        }
        out
    }
}

impl Default for TextQuestionParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentParser for TextQuestionParser {
    async fn parse(&self, input: &ParseInput) -> Result<Vec<ExtractedQuestion>, ParserError> {
        self.check_type(input.file.file_type.as_deref())?;
        if input.content.trim().is_empty() {
            return Err(ParserError::Empty);
        }
        let questions = self.parse_text(&input.content, input.category_id);
        if questions.is_empty() {
            return Err(ParserError::NoQuestions(input.file.original_filename.clone()));
        }
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbank_types::FileRef;

    const SAMPLE: &str = "\
Chapter 1 review

1. Which planet is closest to the sun?
A. Venus
B. Mercury
C. Earth
Answer: B
Explanation: Mercury orbits at about
0.39 AU.
Difficulty: 2

2、Water boils at 100 degrees Celsius at sea level.
答案：true

3) The value of pi rounded to two decimals is ____.
Answer: 3.14
";

    fn input(content: &str, file_type: Option<&str>) -> ParseInput {
        ParseInput {
            file: FileRef {
                file_id: "f-1".to_string(),
                original_filename: "review.txt".to_string(),
                file_size: None,
                file_type: file_type.map(str::to_string),
            },
            content: content.to_string(),
            category_id: Some(4),
        }
    }

    #[test]
    fn parses_numbered_questions() {
        let qs = TextQuestionParser::new().parse_text(SAMPLE, Some(4));
        assert_eq!(qs.len(), 3);

        assert_eq!(qs[0].id, 1);
        assert_eq!(qs[0].content, "Which planet is closest to the sun?");
        assert_eq!(qs[0].options().len(), 3);
        assert_eq!(qs[0].options()[1], "Mercury");
        assert_eq!(qs[0].answer.as_deref(), Some("B"));
        assert_eq!(
            qs[0].explanation.as_deref(),
            Some("Mercury orbits at about 0.39 AU.")
        );
        assert_eq!(qs[0].difficulty, Some(2));
        assert_eq!(qs[0].question_type, Some(QuestionType::SingleChoice));
        assert_eq!(qs[0].category_id, Some(4));

        assert_eq!(qs[1].question_type, Some(QuestionType::TrueFalse));
        assert_eq!(qs[1].answer.as_deref(), Some("true"));

        assert_eq!(qs[2].question_type, Some(QuestionType::FillBlank));
        assert_eq!(qs[2].answer.as_deref(), Some("3.14"));
    }

    #[test]
    fn decimals_are_not_numbering() {
        assert_eq!(strip_question_number("3.14 is pi"), None);
        assert_eq!(strip_question_number("12. Twelve"), Some("Twelve"));
        assert_eq!(strip_question_number("7、七"), Some("七"));
        assert_eq!(strip_question_number("Answer: 1"), None);
    }

    #[test]
    fn option_letters_must_be_in_sequence() {
        assert_eq!(strip_option("A. first", 'A'), Some("first"));
        assert_eq!(strip_option("C. third", 'B'), None);
        assert_eq!(strip_option("Apples are red", 'A'), None);
    }

    #[test]
    fn labels_need_a_colon() {
        assert_eq!(strip_label("Answer: B", ANSWER_LABELS), Some("B"));
        assert_eq!(strip_label("答案：A", ANSWER_LABELS), Some("A"));
        assert_eq!(strip_label("Answer the question", ANSWER_LABELS), None);
    }

    #[tokio::test]
    async fn rejects_empty_unsupported_and_questionless_input() {
        let parser = TextQuestionParser::new();
        assert!(matches!(
            parser.parse(&input("   ", Some("txt"))).await,
            Err(ParserError::Empty)
        ));
        assert!(matches!(
            parser.parse(&input(SAMPLE, Some("exe"))).await,
            Err(ParserError::UnsupportedType(_))
        ));
        assert!(matches!(
            parser.parse(&input("just prose", Some("text/plain"))).await,
            Err(ParserError::NoQuestions(_))
        ));
        assert_eq!(parser.parse(&input(SAMPLE, None)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn allowed_types_can_be_narrowed() {
        let parser = TextQuestionParser::with_allowed_types([".md"]);
        assert!(parser.parse(&input(SAMPLE, Some("md"))).await.is_ok());
        assert!(matches!(
            parser.parse(&input(SAMPLE, Some("pdf"))).await,
            Err(ParserError::UnsupportedType(_))
        ));
    }
}
