//! Question records in four kinds.
//!
//! Each kind has its own table. Answer lists are stored as JSON text, so the
//! kinds implement [`Persistable`] by hand rather than through the
//! `persistable!` macro.

use super::user::validate_id;
use crate::storage::sqlite::{Field, Persistable, Row, Value};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// One correct answer among several.
    SingleChoice,
    /// Several correct answers among several.
    MultipleChoice,
    /// True or false.
    Judgement,
    /// Free text.
    Essay,
}

impl QuestionKind {
    /// All kinds, in route order.
    pub const ALL: [Self; 4] = [
        Self::SingleChoice,
        Self::MultipleChoice,
        Self::Judgement,
        Self::Essay,
    ];

    /// Route segment, e.g. `single-choice`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single-choice",
            Self::MultipleChoice => "multiple-choice",
            Self::Judgement => "judgement",
            Self::Essay => "essay",
        }
    }

    /// Backing table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultipleChoice => "multiple_choice",
            Self::Judgement => "judgement",
            Self::Essay => "essay",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown question kind: {s}")))
    }
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    /// Label such as `A`.
    pub answer_mark: String,
    /// Answer text.
    pub answer_text: String,
}

/// Behavior shared by every question kind.
pub trait QuestionRecord:
    Persistable + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// The kind this record type stores.
    const KIND: QuestionKind;

    /// Column list in insert order; the first column is the id.
    const COLUMNS: &'static [&'static str];

    /// The question id.
    fn id(&self) -> &str;

    /// Replaces the question id.
    fn set_id(&mut self, id: String);

    /// Checks fields beyond the id and title.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] or [`Error::ExpectationFailed`].
    fn validate_answers(&self) -> Result<()> {
        Ok(())
    }

    /// The title.
    fn title(&self) -> &str;

    /// Reads one record from a row selected with [`Self::COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the conversion error for a malformed column.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Full validation: UUID id, non-empty title, kind-specific rules.
    ///
    /// # Errors
    ///
    /// Returns the first failed rule.
    fn validate(&self) -> Result<()> {
        validate_id(self.id())?;
        if self.title().trim().is_empty() {
            return Err(Error::InvalidInput("title is required".to_string()));
        }
        self.validate_answers()
    }

    /// Returns the record with its id lower-cased.
    #[must_use]
    fn normalized(mut self) -> Self {
        let id = self.id().to_lowercase();
        self.set_id(id);
        self
    }
}

/// Single-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSingleChoice {
    /// UUID.
    pub id: String,
    /// Question text.
    pub title: String,
    /// Offered answers.
    pub answers: Vec<QuestionAnswer>,
    /// The correct answer.
    pub standard_answer: QuestionAnswer,
}

/// Multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionMultipleChoice {
    /// UUID.
    pub id: String,
    /// Question text.
    pub title: String,
    /// Offered answers.
    pub answers: Vec<QuestionAnswer>,
    /// The correct answers.
    pub standard_answers: Vec<QuestionAnswer>,
}

/// True-or-false question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionJudgement {
    /// UUID.
    pub id: String,
    /// Question text.
    pub title: String,
    /// Submitted answer.
    #[serde(default)]
    pub answer: bool,
    /// The correct answer.
    #[serde(default)]
    pub standard_answer: bool,
}

/// Free-text question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEssay {
    /// UUID.
    pub id: String,
    /// Question text.
    pub title: String,
    /// Submitted answer.
    pub answer: String,
    /// Reference answer.
    pub standard_answer: String,
}

fn field(name: &'static str, value: Value) -> Field {
    Field {
        name,
        tag: Some(name),
        value,
    }
}

fn json_value<T: Serialize>(value: &T) -> Value {
    Value::Text(serde_json::to_string(value).unwrap_or_default())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn check_answers(answers: &[QuestionAnswer]) -> Result<()> {
    if answers.is_empty() {
        return Err(Error::InvalidInput("answers are required".to_string()));
    }
    if answers.iter().any(|a| a.answer_mark.trim().is_empty()) {
        return Err(Error::InvalidInput("answerMark is required".to_string()));
    }
    Ok(())
}

fn check_offered(answers: &[QuestionAnswer], standard: &QuestionAnswer) -> Result<()> {
    if answers.contains(standard) {
        Ok(())
    } else {
        Err(Error::ExpectationFailed(format!(
            "standard answer {} is not among the answers",
            standard.answer_mark
        )))
    }
}

impl Persistable for QuestionSingleChoice {
    fn fields(&self) -> Vec<Field> {
        vec![
            field("id", Value::Text(self.id.clone())),
            field("title", Value::Text(self.title.clone())),
            field("answers", json_value(&self.answers)),
            field("standard_answer", json_value(&self.standard_answer)),
        ]
    }
}

impl QuestionRecord for QuestionSingleChoice {
    const KIND: QuestionKind = QuestionKind::SingleChoice;
    const COLUMNS: &'static [&'static str] = &["id", "title", "answers", "standard_answer"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn validate_answers(&self) -> Result<()> {
        check_answers(&self.answers)?;
        check_offered(&self.answers, &self.standard_answer)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            answers: json_column(row, 2)?,
            standard_answer: json_column(row, 3)?,
        })
    }
}

impl Persistable for QuestionMultipleChoice {
    fn fields(&self) -> Vec<Field> {
        vec![
            field("id", Value::Text(self.id.clone())),
            field("title", Value::Text(self.title.clone())),
            field("answers", json_value(&self.answers)),
            field("standard_answers", json_value(&self.standard_answers)),
        ]
    }
}

impl QuestionRecord for QuestionMultipleChoice {
    const KIND: QuestionKind = QuestionKind::MultipleChoice;
    const COLUMNS: &'static [&'static str] = &["id", "title", "answers", "standard_answers"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn validate_answers(&self) -> Result<()> {
        check_answers(&self.answers)?;
        if self.standard_answers.is_empty() {
            return Err(Error::InvalidInput(
                "standard_answers are required".to_string(),
            ));
        }
        self.standard_answers
            .iter()
            .try_for_each(|standard| check_offered(&self.answers, standard))
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            answers: json_column(row, 2)?,
            standard_answers: json_column(row, 3)?,
        })
    }
}

impl Persistable for QuestionJudgement {
    fn fields(&self) -> Vec<Field> {
        vec![
            field("id", Value::Text(self.id.clone())),
            field("title", Value::Text(self.title.clone())),
            field("answer", Value::from(self.answer)),
            field("standard_answer", Value::from(self.standard_answer)),
        ]
    }
}

impl QuestionRecord for QuestionJudgement {
    const KIND: QuestionKind = QuestionKind::Judgement;
    const COLUMNS: &'static [&'static str] = &["id", "title", "answer", "standard_answer"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            answer: row.get(2)?,
            standard_answer: row.get(3)?,
        })
    }
}

impl Persistable for QuestionEssay {
    fn fields(&self) -> Vec<Field> {
        vec![
            field("id", Value::Text(self.id.clone())),
            field("title", Value::Text(self.title.clone())),
            field("answer", Value::Text(self.answer.clone())),
            field("standard_answer", Value::Text(self.standard_answer.clone())),
        ]
    }
}

impl QuestionRecord for QuestionEssay {
    const KIND: QuestionKind = QuestionKind::Essay;
    const COLUMNS: &'static [&'static str] = &["id", "title", "answer", "standard_answer"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn validate_answers(&self) -> Result<()> {
        if self.standard_answer.trim().is_empty() {
            return Err(Error::InvalidInput(
                "standard_answer is required".to_string(),
            ));
        }
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            answer: row.get(2)?,
            standard_answer: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::build_insert;
    use test_case::test_case;

    const ID: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    fn answer(mark: &str, text: &str) -> QuestionAnswer {
        QuestionAnswer {
            answer_mark: mark.to_string(),
            answer_text: text.to_string(),
        }
    }

    fn single() -> QuestionSingleChoice {
        QuestionSingleChoice {
            id: ID.to_string(),
            title: "2 + 2?".to_string(),
            answers: vec![answer("A", "3"), answer("B", "4")],
            standard_answer: answer("B", "4"),
        }
    }

    #[test_case("single-choice", QuestionKind::SingleChoice ; "single")]
    #[test_case("multiple-choice", QuestionKind::MultipleChoice ; "multiple")]
    #[test_case("judgement", QuestionKind::Judgement ; "judgement")]
    #[test_case("essay", QuestionKind::Essay ; "essay")]
    fn test_kind_from_route(segment: &str, kind: QuestionKind) {
        assert_eq!(segment.parse::<QuestionKind>().unwrap(), kind);
        assert_eq!(kind.to_string(), segment);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            "quiz".parse::<QuestionKind>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_answer_json_is_camel_case() {
        let json = serde_json::to_string(&answer("A", "yes")).unwrap();
        assert_eq!(json, r#"{"answerMark":"A","answerText":"yes"}"#);
    }

    #[test]
    fn test_single_choice_validation() {
        assert!(single().validate().is_ok());

        let mut q = single();
        q.standard_answer = answer("C", "5");
        assert!(matches!(q.validate(), Err(Error::ExpectationFailed(_))));

        let mut q = single();
        q.answers.clear();
        assert!(matches!(q.validate(), Err(Error::InvalidInput(_))));

        let mut q = single();
        q.title = String::new();
        assert!(matches!(q.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_multiple_choice_requires_standard_answers() {
        let q = QuestionMultipleChoice {
            id: ID.to_string(),
            title: "Primes?".to_string(),
            answers: vec![answer("A", "2"), answer("B", "4")],
            standard_answers: vec![],
        };
        assert!(matches!(q.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_json_columns_in_insert() {
        let insert = build_insert(QuestionSingleChoice::KIND.table(), &single()).unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO single_choice (id,title,answers,standard_answer) VALUES (?,?,?,?)"
        );
        assert_eq!(
            insert.params[3],
            Value::Text(r#"{"answerMark":"B","answerText":"4"}"#.to_string())
        );
    }

    #[test]
    fn test_normalized_lowercases_id() {
        let mut q = single();
        q.id = ID.to_uppercase();
        assert_eq!(q.normalized().id, ID);
    }
}
