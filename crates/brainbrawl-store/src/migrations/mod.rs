//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::open_at`] call.
//! The applied version lives in the `user_version` pragma. Each step runs in
//! its own IMMEDIATE transaction and re-reads the version once it holds the
//! write lock, so two processes opening the same file at the same time apply
//! every step exactly once.
//!
//! [`Database::open_at`]: crate::Database::open_at

pub mod v001_initial;
pub mod v002_question_media_hints;
pub mod v003_game_revision;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 3;

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

const STEPS: &[(u32, &str, Step)] = &[
    (1, "v001_initial", v001_initial::up),
    (2, "v002_question_media_hints", v002_question_media_hints::up),
    (3, "v003_game_revision", v003_game_revision::up),
];

/// Read the schema version recorded in the database file.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than the supported v{CURRENT_VERSION}"
        )));
    }
    if current == CURRENT_VERSION {
        return Ok(());
    }

    for &(version, name, up) in STEPS {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // another process may have upgraded while we waited for the lock
        let applied = schema_version(&tx)?;
        if applied >= version {
            continue;
        }

        tracing::info!(migration = name, version, "applying migration");
        up(&tx).map_err(|e| step_failed(name, e))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}

// Lock contention stays a storage error so the caller can retry the open.
fn step_failed(name: &str, err: rusqlite::Error) -> StoreError {
    let err = StoreError::from(err);
    if err.is_busy() {
        err
    } else {
        StoreError::Migration(format!("{name}: {err}"))
    }
}
