//! In-process transport for sync messages.
//!
//! Master -> observers is a tokio `broadcast` channel, which hands every
//! subscriber the messages in send order. Observers -> master is an `mpsc`
//! channel of [`ResyncRequest`]s, created separately by [`resync_channel`]:
//! the master only ever holds the receiving end, so the channel closes once
//! the last observer-side [`ResyncSender`] is gone. Both directions are
//! fire-and-forget: there is no acknowledgment, and a subscriber that lags
//! behind the channel capacity loses messages.

use brainbrawl_shared::{ResyncRequest, SyncMessage};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SyncBus {
    updates: broadcast::Sender<SyncMessage>,
}

impl SyncBus {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self { updates }
    }

    /// Attach a new observer. It only sees messages sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.updates.subscribe()
    }

    /// Send a message to every current subscriber and return how many there
    /// were. Having none is not an error.
    pub fn publish(&self, message: SyncMessage) -> usize {
        let command = message.command.name();
        let seq = message.seq;
        match self.updates.send(message) {
            Ok(receivers) => {
                debug!(command, seq, receivers, "sync message published");
                receivers
            }
            Err(_) => {
                debug!(command, seq, "no observers subscribed");
                0
            }
        }
    }
}

/// Create the observers -> master resync channel. The receiver goes to
/// [`GameMaster::spawn_resync_loop`](crate::GameMaster::spawn_resync_loop).
pub fn resync_channel(capacity: usize) -> (ResyncSender, mpsc::Receiver<ResyncRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ResyncSender(tx), rx)
}

/// Observer end of the resync channel.
#[derive(Debug, Clone)]
pub struct ResyncSender(mpsc::Sender<ResyncRequest>);

impl ResyncSender {
    /// Queue a request without waiting. A full queue drops it: the master
    /// already owes a snapshot and also re-broadcasts periodically.
    pub fn request(&self, request: ResyncRequest) -> bool {
        match self.0.try_send(request) {
            Ok(()) => true,
            Err(e) => {
                warn!(reason = ?request.reason, error = %e, "resync request dropped");
                false
            }
        }
    }
}
