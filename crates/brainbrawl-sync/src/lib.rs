//! # brainbrawl-sync
//!
//! Live game-state synchronization. One [`GameMaster`] holds the
//! authoritative game and broadcasts every change over a [`SyncBus`];
//! any number of [`Observer`]s follow along and ask for a full snapshot
//! whenever they lose track.

pub mod bus;
pub mod config;
pub mod error;
pub mod master;
pub mod observer;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use bus::{resync_channel, ResyncSender, SyncBus};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use master::GameMaster;
pub use observer::{ApplyOutcome, Observer, SyncState};
pub use session::MasterSession;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `filter`.
/// Calling it again after a subscriber is installed does nothing.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
