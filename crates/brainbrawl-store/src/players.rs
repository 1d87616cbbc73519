//! CRUD operations for [`Player`] records.

use brainbrawl_shared::{Entity, Player, PlayerId, Stored};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::games;

const COLLECTION: &str = Player::COLLECTION;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new player and return the id the store assigned.
    pub fn add_player(&self, player: &Player) -> Result<PlayerId> {
        check_name(player)?;
        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO players (name, profile_picture) VALUES (?1, ?2)",
                params![player.name, player.profile_picture],
            )?;
            Ok(PlayerId(tx.last_insert_rowid()))
        })?;

        tracing::debug!(player_id = %id, name = %player.name, "player added");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single player by id.
    pub fn get_player(&self, id: PlayerId) -> Result<Stored<Player>> {
        self.conn()
            .query_row(
                "SELECT id, name, profile_picture FROM players WHERE id = ?1",
                params![id.0],
                row_to_player,
            )
            .map_err(StoreError::lookup(COLLECTION, id.0))
    }

    /// List all players in id order.
    pub fn list_players(&self) -> Result<Vec<Stored<Player>>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, profile_picture FROM players ORDER BY id ASC")?;

        let rows = stmt.query_map([], row_to_player)?;

        let mut players = Vec::new();
        for row in rows {
            players.push(row?);
        }
        Ok(players)
    }

    /// Look players up through the `name` index.
    pub fn find_players_by_name(&self, name: &str) -> Result<Vec<Stored<Player>>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, profile_picture FROM players WHERE name = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![name], row_to_player)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the whole record. Fails with `NotFound` if the id is unknown.
    pub fn update_player(&self, player: &Stored<Player>) -> Result<()> {
        check_name(&player.record)?;
        self.write(|tx| {
            let affected = tx.execute(
                "UPDATE players SET name = ?2, profile_picture = ?3 WHERE id = ?1",
                params![player.id.0, player.record.name, player.record.profile_picture],
            )?;
            if affected == 0 {
                return Err(StoreError::not_found(COLLECTION, player.id));
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a player. Returns `true` if a row was deleted; deleting an
    /// unknown id is not an error. A player still enrolled in a game cannot
    /// be deleted.
    pub fn remove_player(&self, id: PlayerId) -> Result<bool> {
        self.write(|tx| {
            if let Some(game_id) = games::game_with_player(tx, id)? {
                return Err(StoreError::Constraint(format!(
                    "player {id} is still enrolled in game {game_id}"
                )));
            }
            let affected = tx.execute("DELETE FROM players WHERE id = ?1", params![id.0])?;
            Ok(affected > 0)
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_name(player: &Player) -> Result<()> {
    if player.name.trim().is_empty() {
        return Err(StoreError::Constraint("player name must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn player_exists(tx: &Transaction<'_>, id: PlayerId) -> Result<bool> {
    Ok(tx
        .query_row("SELECT 1 FROM players WHERE id = ?1", params![id.0], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Map a `rusqlite::Row` to a stored [`Player`].
fn row_to_player(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stored<Player>> {
    Ok(Stored::new(
        PlayerId(row.get(0)?),
        Player {
            name: row.get(1)?,
            profile_picture: row.get(2)?,
        },
    ))
}
