//! CRUD operations for [`Question`] records.

use brainbrawl_shared::constants::MAX_QUESTION_POINTS;
use brainbrawl_shared::{Entity, MediaFile, Question, QuestionId, QuestionType, Stored};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Transaction};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::games;

const COLLECTION: &str = Question::COLLECTION;

const SELECT: &str = "SELECT id, name, type, points, penalty, game_master_info, player_info,
                             file, file_ref, text, hints
                      FROM questions";

impl Database {
    /// Insert a new question and return the id the store assigned.
    pub fn add_question(&self, question: &Question) -> Result<QuestionId> {
        check_scoring(question)?;
        let hints = serde_json::to_string(&question.hints)?;
        let (file, file_ref) = split_media(question.file.as_ref());

        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO questions
                     (name, type, points, penalty, game_master_info, player_info,
                      file, file_ref, text, hints)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    question.name,
                    question.kind.as_str(),
                    question.points,
                    question.penalty,
                    question.game_master_info,
                    question.player_info,
                    file,
                    file_ref,
                    question.text,
                    hints,
                ],
            )?;
            Ok(QuestionId(tx.last_insert_rowid()))
        })?;

        tracing::debug!(question_id = %id, name = %question.name, kind = %question.kind, "question added");
        Ok(id)
    }

    pub fn get_question(&self, id: QuestionId) -> Result<Stored<Question>> {
        self.conn()
            .query_row(
                &format!("{SELECT} WHERE id = ?1"),
                params![id.0],
                row_to_question,
            )
            .map_err(StoreError::lookup(COLLECTION, id.0))
    }

    pub fn list_questions(&self) -> Result<Vec<Stored<Question>>> {
        let mut stmt = self.conn().prepare(&format!("{SELECT} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_question)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn find_questions_by_name(&self, name: &str) -> Result<Vec<Stored<Question>>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT} WHERE name = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![name], row_to_question)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Replace the whole record. Fails with `NotFound` if the id is unknown.
    pub fn update_question(&self, question: &Stored<Question>) -> Result<()> {
        let record = &question.record;
        check_scoring(record)?;
        let hints = serde_json::to_string(&record.hints)?;
        let (file, file_ref) = split_media(record.file.as_ref());

        self.write(|tx| {
            let affected = tx.execute(
                "UPDATE questions
                 SET name = ?2, type = ?3, points = ?4, penalty = ?5,
                     game_master_info = ?6, player_info = ?7,
                     file = ?8, file_ref = ?9, text = ?10, hints = ?11
                 WHERE id = ?1",
                params![
                    question.id.0,
                    record.name,
                    record.kind.as_str(),
                    record.points,
                    record.penalty,
                    record.game_master_info,
                    record.player_info,
                    file,
                    file_ref,
                    record.text,
                    hints,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::not_found(COLLECTION, question.id));
            }
            Ok(())
        })
    }

    /// Delete a question. Returns `true` if a row was deleted. A question
    /// that is still part of a game's layout cannot be deleted.
    pub fn remove_question(&self, id: QuestionId) -> Result<bool> {
        self.write(|tx| {
            if let Some(game_id) = games::game_with_question(tx, id)? {
                return Err(StoreError::Constraint(format!(
                    "question {id} is still used by game {game_id}"
                )));
            }
            let affected = tx.execute("DELETE FROM questions WHERE id = ?1", params![id.0])?;
            Ok(affected > 0)
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_scoring(question: &Question) -> Result<()> {
    for (field, value) in [("points", question.points), ("penalty", question.penalty)] {
        if value.checked_abs().map_or(true, |v| v > MAX_QUESTION_POINTS) {
            return Err(StoreError::Constraint(format!(
                "question {field} {value} is outside +/-{MAX_QUESTION_POINTS}"
            )));
        }
    }
    Ok(())
}

fn split_media(file: Option<&MediaFile>) -> (Option<&[u8]>, Option<&str>) {
    match file {
        Some(MediaFile::Inline(bytes)) => (Some(bytes.as_slice()), None),
        Some(MediaFile::Reference(path)) => (None, Some(path.as_str())),
        None => (None, None),
    }
}

pub(crate) fn question_exists(tx: &Transaction<'_>, id: QuestionId) -> Result<bool> {
    Ok(tx
        .query_row("SELECT 1 FROM questions WHERE id = ?1", params![id.0], |_| Ok(()))
        .optional()?
        .is_some())
}

fn row_to_question(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stored<Question>> {
    let kind_str: String = row.get(2)?;
    let file: Option<Vec<u8>> = row.get(7)?;
    let file_ref: Option<String> = row.get(8)?;
    let hints_json: String = row.get(10)?;

    let kind = QuestionType::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown question type {kind_str:?}").into(),
        )
    })?;

    let hints: Vec<String> = serde_json::from_str(&hints_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    // a reference written after v2 wins over legacy inline bytes
    let file = match (file_ref, file) {
        (Some(path), _) => Some(MediaFile::Reference(path)),
        (None, Some(bytes)) => Some(MediaFile::Inline(bytes)),
        (None, None) => None,
    };

    Ok(Stored::new(
        QuestionId(row.get(0)?),
        Question {
            name: row.get(1)?,
            kind,
            points: row.get(3)?,
            penalty: row.get(4)?,
            game_master_info: row.get(5)?,
            player_info: row.get(6)?,
            file,
            text: row.get(9)?,
            hints,
        },
    ))
}
