//! # brainbrawl-store
//!
//! Local persistence for BrainBrawl, backed by SQLite.
//!
//! Three collections (`players`, `questions`, `games`) live in one database
//! file whose schema is upgraded in place by [`migrations`]. The crate exposes
//! a synchronous [`Database`] with typed CRUD helpers per collection, and the
//! async [`StoreHandle`] that the rest of the application holds.

pub mod collection;
pub mod database;
pub mod games;
pub mod handle;
pub mod migrations;
pub mod players;
pub mod questions;

mod error;

pub use collection::Collection;
pub use database::Database;
pub use error::{Result, StoreError};
pub use handle::{StoreHandle, StoreLocation, StoreOptions};
