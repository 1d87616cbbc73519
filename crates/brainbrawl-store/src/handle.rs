//! Async store handle.
//!
//! [`StoreHandle`] is the explicitly constructed entry point the rest of the
//! application receives; there is no ambient global connection. Every
//! operation runs on tokio's blocking pool, so awaiting it never blocks the
//! caller's executor. Dropping the returned future does not cancel a write
//! that has already been dispatched.
//!
//! All clones share one connection behind a mutex, which serializes writers.
//! `update` is a whole-record replace: when two updates of the same id race,
//! the one that runs last wins.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brainbrawl_shared::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_OPEN_RETRIES, DEFAULT_OPEN_RETRY_MS,
};
use brainbrawl_shared::{Game, Stored};
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::database::{self, Database};
use crate::error::{Result, StoreError};

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// `brainbrawl.db` in the platform data directory.
    DataDir,
    Path(PathBuf),
    /// Private, non-persistent database.
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub location: StoreLocation,
    /// How long a single attempt waits on another connection's lock.
    pub busy_timeout: Duration,
    /// Extra attempts made while the database stays locked.
    pub open_retries: u32,
    pub retry_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            location: StoreLocation::DataDir,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            open_retries: DEFAULT_OPEN_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_OPEN_RETRY_MS),
        }
    }
}

impl StoreOptions {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::Path(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            ..Self::default()
        }
    }

    fn open_database(&self) -> Result<Database> {
        match &self.location {
            StoreLocation::DataDir => {
                let path = database::default_path()?;
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                Database::open_with(&path, self.busy_timeout)
            }
            StoreLocation::Path(path) => Database::open_with(path, self.busy_timeout),
            StoreLocation::Memory => Database::open_in_memory(),
        }
    }
}

/// Cloneable async handle to the local database.
#[derive(Clone)]
pub struct StoreHandle {
    db: Arc<Mutex<Database>>,
}

impl StoreHandle {
    /// Open (and upgrade if needed) the database.
    ///
    /// While another connection holds the lock, for instance a second process
    /// running the same upgrade, the open is retried up to
    /// `options.open_retries` times before failing with
    /// [`StoreError::Connection`]. Migration failures are returned as they are.
    pub async fn open(options: StoreOptions) -> Result<Self> {
        let mut attempt = 0;
        loop {
            let opts = options.clone();
            let result = tokio::task::spawn_blocking(move || opts.open_database()).await?;

            match result {
                Ok(db) => {
                    info!(location = ?options.location, "store opened");
                    return Ok(Self::from_database(db));
                }
                Err(e) if e.is_busy() && attempt < options.open_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "database locked, retrying open");
                    tokio::time::sleep(options.retry_delay).await;
                }
                Err(e) if e.is_busy() => {
                    return Err(StoreError::Connection(format!(
                        "database still locked after {} attempts: {e}",
                        attempt + 1
                    )));
                }
                Err(StoreError::Storage(e)) => return Err(StoreError::Connection(e.to_string())),
                Err(e) => return Err(e),
            }
        }
    }

    /// Wrap an already opened database.
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            op(&guard)
        })
        .await?
    }

    /// Every record of the collection, in id order.
    pub async fn get_all<T: Collection>(&self) -> Result<Vec<Stored<T>>> {
        self.run(T::get_all).await
    }

    pub async fn get_by_id<T: Collection>(&self, id: T::Id) -> Result<Stored<T>> {
        self.run(move |db| T::get_by_id(db, id)).await
    }

    pub async fn find_by_name<T: Collection>(&self, name: impl Into<String>) -> Result<Vec<Stored<T>>> {
        let name = name.into();
        self.run(move |db| T::find_by_name(db, &name)).await
    }

    /// Insert a record and return its new id.
    pub async fn add<T: Collection>(&self, record: T) -> Result<T::Id> {
        self.run(move |db| T::add(db, &record)).await
    }

    /// Replace a record; `NotFound` if its id does not exist.
    pub async fn update<T: Collection>(&self, record: Stored<T>) -> Result<()> {
        self.run(move |db| T::update(db, &record)).await
    }

    /// Write `game` unless the store already holds the same or a later
    /// revision of it. Returns whether it was written.
    pub async fn update_game_if_newer(&self, game: Stored<Game>) -> Result<bool> {
        self.run(move |db| db.update_game_if_newer(&game)).await
    }

    /// Delete a record. Removing an unknown id succeeds without effect.
    pub async fn remove<T: Collection>(&self, id: T::Id) -> Result<()> {
        let removed = self.run(move |db| T::remove(db, id)).await?;
        debug!(collection = T::COLLECTION, %id, removed, "remove");
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<u32> {
        self.run(Database::schema_version).await
    }

    /// Close the connection. If other clones of the handle are still alive the
    /// connection stays open until the last one is dropped.
    pub async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.db) {
            Ok(mutex) => {
                let db = mutex.into_inner().map_err(|_| StoreError::Poisoned)?;
                tokio::task::spawn_blocking(move || db.close()).await??;
                info!("store closed");
                Ok(())
            }
            Err(_) => {
                debug!("store handle still shared, leaving connection open");
                Ok(())
            }
        }
    }
}
