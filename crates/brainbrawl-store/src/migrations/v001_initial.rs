//! v001 -- Initial schema creation.
//!
//! Creates the three collections `players`, `questions` and `games`, each
//! keyed by an auto-increment id with a non-unique `name` index. Every
//! statement is `IF NOT EXISTS` so a version-0 database that already holds
//! some of these collections keeps its rows.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Players
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS players (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    profile_picture BLOB
);

CREATE INDEX IF NOT EXISTS idx_players_name ON players(name);

-- ----------------------------------------------------------------
-- Questions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS questions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL,
    type             TEXT NOT NULL
                     CHECK (type IN ('video', 'audio', 'text', 'zoom', 'image')),
    points           INTEGER NOT NULL,
    penalty          INTEGER NOT NULL DEFAULT 0,
    game_master_info TEXT,
    player_info      TEXT,
    file             BLOB,                      -- inline media bytes
    text             TEXT
);

CREATE INDEX IF NOT EXISTS idx_questions_name ON questions(name);

-- ----------------------------------------------------------------
-- Games
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS games (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL,
    kind             TEXT NOT NULL CHECK (kind IN ('basic', 'jeopardy')),
    multiplier       REAL NOT NULL DEFAULT 1.0,
    layout           TEXT NOT NULL,             -- JSON GameLayout
    player_data      TEXT NOT NULL DEFAULT '[]',-- JSON [PlayerData]
    question_data    TEXT NOT NULL DEFAULT '[]',-- JSON [QuestionData]
    current_question INTEGER                    -- question id, nullable
);

CREATE INDEX IF NOT EXISTS idx_games_name ON games(name);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
