//! Collection-generic access to the typed CRUD helpers.
//!
//! [`Collection`] lets callers (and [`StoreHandle`](crate::StoreHandle))
//! address any of the three collections with the same six operations instead
//! of picking the per-entity method by hand.

use brainbrawl_shared::{Entity, Game, Player, Question, Stored};

use crate::database::Database;
use crate::error::Result;

pub trait Collection: Entity {
    fn get_all(db: &Database) -> Result<Vec<Stored<Self>>>;
    fn get_by_id(db: &Database, id: Self::Id) -> Result<Stored<Self>>;
    fn find_by_name(db: &Database, name: &str) -> Result<Vec<Stored<Self>>>;
    fn add(db: &Database, record: &Self) -> Result<Self::Id>;
    fn update(db: &Database, record: &Stored<Self>) -> Result<()>;
    /// Idempotent; returns whether a row was actually deleted.
    fn remove(db: &Database, id: Self::Id) -> Result<bool>;
}

macro_rules! collection {
    ($entity:ty, $all:ident, $get:ident, $find:ident, $add:ident, $update:ident, $remove:ident) => {
        impl Collection for $entity {
            fn get_all(db: &Database) -> Result<Vec<Stored<Self>>> {
                db.$all()
            }

            fn get_by_id(db: &Database, id: Self::Id) -> Result<Stored<Self>> {
                db.$get(id)
            }

            fn find_by_name(db: &Database, name: &str) -> Result<Vec<Stored<Self>>> {
                db.$find(name)
            }

            fn add(db: &Database, record: &Self) -> Result<Self::Id> {
                db.$add(record)
            }

            fn update(db: &Database, record: &Stored<Self>) -> Result<()> {
                db.$update(record)
            }

            fn remove(db: &Database, id: Self::Id) -> Result<bool> {
                db.$remove(id)
            }
        }
    };
}

collection!(
    Player,
    list_players,
    get_player,
    find_players_by_name,
    add_player,
    update_player,
    remove_player
);
collection!(
    Question,
    list_questions,
    get_question,
    find_questions_by_name,
    add_question,
    update_question,
    remove_question
);
collection!(
    Game,
    list_games,
    get_game,
    find_games_by_name,
    add_game,
    update_game,
    remove_game
);
