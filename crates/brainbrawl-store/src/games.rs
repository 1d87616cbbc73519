//! CRUD operations for [`Game`] records.
//!
//! A game row keeps its layout and per-player / per-question state as JSON
//! columns. Every write checks the aggregate's references inside the same
//! transaction: enrolled players and laid-out questions must exist.

use std::collections::BTreeMap;

use brainbrawl_shared::schema::index_by_key;
use brainbrawl_shared::{
    Entity, Game, GameId, GameLayout, PlayerData, PlayerId, QuestionData, QuestionId, Stored,
};
use rusqlite::types::Type;
use rusqlite::{params, Transaction};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::players::player_exists;
use crate::questions::question_exists;

const COLLECTION: &str = Game::COLLECTION;

const UPDATE_SQL: &str = "UPDATE games
                          SET name = ?2, kind = ?3, multiplier = ?4, layout = ?5,
                              player_data = ?6, question_data = ?7, current_question = ?8,
                              revision = ?9
                          WHERE id = ?1";

const SELECT: &str = "SELECT id, name, multiplier, layout, player_data, question_data,
                             current_question, revision
                      FROM games";

/// A game flattened into its column values.
struct GameColumns<'a> {
    name: &'a str,
    kind: &'static str,
    multiplier: f64,
    layout: String,
    player_data: String,
    question_data: String,
    current_question: Option<i64>,
    revision: i64,
}

impl<'a> GameColumns<'a> {
    fn encode(game: &'a Game) -> Result<Self> {
        Ok(Self {
            name: &game.name,
            kind: game.layout.kind(),
            multiplier: game.multiplier,
            layout: serde_json::to_string(&game.layout)?,
            player_data: serde_json::to_string(&game.player_data.values().collect::<Vec<_>>())?,
            question_data: serde_json::to_string(
                &game.question_data.values().collect::<Vec<_>>(),
            )?,
            current_question: game.current_question.map(i64::from),
            revision: i64::try_from(game.revision).unwrap_or(i64::MAX),
        })
    }
}

impl Database {
    /// Insert a new game and return the id the store assigned.
    pub fn add_game(&self, game: &Game) -> Result<GameId> {
        let cols = GameColumns::encode(game)?;

        let id = self.write(|tx| {
            check_references(tx, game)?;
            tx.execute(
                "INSERT INTO games
                     (name, kind, multiplier, layout, player_data, question_data,
                      current_question, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    cols.name,
                    cols.kind,
                    cols.multiplier,
                    cols.layout,
                    cols.player_data,
                    cols.question_data,
                    cols.current_question,
                    cols.revision,
                ],
            )?;
            Ok(GameId(tx.last_insert_rowid()))
        })?;

        tracing::debug!(game_id = %id, name = %game.name, kind = cols.kind, "game added");
        Ok(id)
    }

    pub fn get_game(&self, id: GameId) -> Result<Stored<Game>> {
        self.conn()
            .query_row(&format!("{SELECT} WHERE id = ?1"), params![id.0], row_to_game)
            .map_err(StoreError::lookup(COLLECTION, id.0))
    }

    pub fn list_games(&self) -> Result<Vec<Stored<Game>>> {
        let mut stmt = self.conn().prepare(&format!("{SELECT} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_game)?;

        let mut games = Vec::new();
        for row in rows {
            games.push(row?);
        }
        Ok(games)
    }

    pub fn find_games_by_name(&self, name: &str) -> Result<Vec<Stored<Game>>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT} WHERE name = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![name], row_to_game)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Replace the whole record. Fails with `NotFound` if the id is unknown.
    ///
    /// Concurrent updates of the same game are serialized by SQLite's write
    /// lock; each one replaces the full record, so the last writer wins.
    pub fn update_game(&self, game: &Stored<Game>) -> Result<()> {
        let cols = GameColumns::encode(&game.record)?;

        self.write(|tx| {
            check_references(tx, &game.record)?;
            let affected = tx.execute(
                UPDATE_SQL,
                params![
                    game.id.0,
                    cols.name,
                    cols.kind,
                    cols.multiplier,
                    cols.layout,
                    cols.player_data,
                    cols.question_data,
                    cols.current_question,
                    cols.revision,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::not_found(COLLECTION, game.id));
            }
            Ok(())
        })?;

        tracing::debug!(game_id = %game.id, "game updated");
        Ok(())
    }

    /// Replace the record only if `game` carries a higher revision than the
    /// stored one. Returns whether the row was written; `NotFound` if the id
    /// is unknown.
    pub fn update_game_if_newer(&self, game: &Stored<Game>) -> Result<bool> {
        let cols = GameColumns::encode(&game.record)?;

        let written = self.write(|tx| {
            check_references(tx, &game.record)?;
            let affected = tx.execute(
                &format!("{UPDATE_SQL} AND revision < ?9"),
                params![
                    game.id.0,
                    cols.name,
                    cols.kind,
                    cols.multiplier,
                    cols.layout,
                    cols.player_data,
                    cols.question_data,
                    cols.current_question,
                    cols.revision,
                ],
            )?;
            if affected > 0 {
                return Ok(true);
            }
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM games WHERE id = ?1)",
                params![game.id.0],
                |row| row.get(0),
            )?;
            if exists {
                Ok(false)
            } else {
                Err(StoreError::not_found(COLLECTION, game.id))
            }
        })?;

        tracing::debug!(game_id = %game.id, revision = game.record.revision, written, "conditional game update");
        Ok(written)
    }

    /// Delete a game. Returns `true` if a row was deleted.
    pub fn remove_game(&self, id: GameId) -> Result<bool> {
        self.write(|tx| {
            let affected = tx.execute("DELETE FROM games WHERE id = ?1", params![id.0])?;
            Ok(affected > 0)
        })
    }
}

// ---------------------------------------------------------------------------
// Reference checks
// ---------------------------------------------------------------------------

fn check_references(tx: &Transaction<'_>, game: &Game) -> Result<()> {
    game.validate_shape()
        .map_err(|e| StoreError::Constraint(e.to_string()))?;

    for player_id in game.player_ids() {
        if !player_exists(tx, player_id)? {
            return Err(StoreError::Constraint(format!(
                "game references unknown player {player_id}"
            )));
        }
    }
    for question_id in game.question_ids() {
        if !question_exists(tx, question_id)? {
            return Err(StoreError::Constraint(format!(
                "game references unknown question {question_id}"
            )));
        }
    }
    Ok(())
}

fn all_games(tx: &Transaction<'_>) -> Result<Vec<Stored<Game>>> {
    let mut stmt = tx.prepare(SELECT)?;
    let rows = stmt.query_map([], row_to_game)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

/// First game that has `player_id` enrolled, if any.
pub(crate) fn game_with_player(tx: &Transaction<'_>, player_id: PlayerId) -> Result<Option<GameId>> {
    Ok(all_games(tx)?
        .into_iter()
        .find(|g| g.record.player_data.contains_key(&player_id))
        .map(|g| g.id))
}

/// First game whose layout contains `question_id`, if any.
pub(crate) fn game_with_question(
    tx: &Transaction<'_>,
    question_id: QuestionId,
) -> Result<Option<GameId>> {
    Ok(all_games(tx)?
        .into_iter()
        .find(|g| g.record.contains(question_id))
        .map(|g| g.id))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn keyed_column<V>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<BTreeMap<V::Key, V>>
where
    V: brainbrawl_shared::schema::Keyed + serde::de::DeserializeOwned,
{
    let entries: Vec<V> = json_column(row, idx)?;
    index_by_key(entries).map_err(|key| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("duplicate entry for id {key:?}").into(),
        )
    })
}

fn row_to_game(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stored<Game>> {
    let layout: GameLayout = json_column(row, 3)?;
    let player_data: BTreeMap<PlayerId, PlayerData> = keyed_column(row, 4)?;
    let question_data: BTreeMap<QuestionId, QuestionData> = keyed_column(row, 5)?;
    let current_question: Option<i64> = row.get(6)?;
    let revision: i64 = row.get(7)?;

    Ok(Stored::new(
        GameId(row.get(0)?),
        Game {
            name: row.get(1)?,
            multiplier: row.get(2)?,
            layout,
            player_data,
            question_data,
            current_question: current_question.map(QuestionId),
            revision: u64::try_from(revision).unwrap_or_default(),
        },
    ))
}
