//! # brainbrawl-shared
//!
//! Types shared by every BrainBrawl role: the persisted entity records, the
//! game-state transitions applied to a [`Game`](schema::Game), and the sync
//! messages the master broadcasts to observers.

pub mod constants;
pub mod error;
pub mod game;
pub mod protocol;
pub mod schema;
pub mod types;

pub use error::{InvalidState, ProtocolError, ShapeError};
pub use game::{Outcome, Scoring};
pub use protocol::{ResyncReason, ResyncRequest, SyncCommand, SyncMessage};
pub use schema::*;
pub use types::{GameId, PlayerId, QuestionId, Role};
