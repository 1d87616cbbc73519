/// Application name
pub const APP_NAME: &str = "BrainBrawl";

/// File name of the local database inside the platform data directory
pub const DB_FILE_NAME: &str = "brainbrawl.db";

/// Sequence number of the first message a sender emits
pub const FIRST_SEQ: u64 = 1;

/// Default capacity of the master -> observer broadcast channel
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Default interval between unsolicited `updateGame` snapshots
pub const DEFAULT_RESYNC_SECS: u64 = 10;

/// How many times opening the store is retried while another process holds
/// the write lock (e.g. during an upgrade)
pub const DEFAULT_OPEN_RETRIES: u32 = 5;

/// Delay between open attempts in milliseconds
pub const DEFAULT_OPEN_RETRY_MS: u64 = 200;

/// SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2_000;

/// Largest absolute `points` or `penalty` a question may carry
pub const MAX_QUESTION_POINTS: i64 = 1_000_000_000;
