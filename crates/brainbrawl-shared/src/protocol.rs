use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::game::{Outcome, Scoring};
use crate::schema::{Game, Stored};
use crate::types::{QuestionId, Role};

/// Game-state mutation carried by a [`SyncMessage`]. Serialized adjacently
/// tagged, so the wire shape is `"command": "...", "data": {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "camelCase")]
pub enum SyncCommand {
    /// Full snapshot; replaces the receiver's copy.
    UpdateGame(Stored<Game>),

    #[serde(rename_all = "camelCase")]
    SelectQuestion { question_id: QuestionId },

    #[serde(rename_all = "camelCase")]
    CloseQuestion {
        question_id: QuestionId,
        outcome: Outcome,
        /// Points and penalty the master scored with. Absent from older
        /// senders, in which case receivers score from their own record.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scoring: Option<Scoring>,
    },
}

impl SyncCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SyncCommand::UpdateGame(_) => "updateGame",
            SyncCommand::SelectQuestion { .. } => "selectQuestion",
            SyncCommand::CloseQuestion { .. } => "closeQuestion",
        }
    }
}

/// Envelope exchanged between the master and observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub sender: Role,
    /// Per-sender send counter, starting at 1. Messages from before
    /// sequencing existed decode as 0.
    #[serde(default)]
    pub seq: u64,
    #[serde(flatten)]
    pub command: SyncCommand,
}

impl SyncMessage {
    pub fn new(sender: Role, seq: u64, command: SyncCommand) -> Self {
        Self {
            sender,
            seq,
            command,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Every command mutates the game, so only the master may send one.
    pub fn ensure_authoritative(&self) -> Result<(), ProtocolError> {
        if self.sender.is_authoritative() {
            Ok(())
        } else {
            Err(ProtocolError::NotAuthoritative {
                sender: self.sender,
                command: self.command.name(),
            })
        }
    }
}

/// Why an observer asked the master for a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResyncReason {
    /// No snapshot received yet.
    Startup,
    /// A sequence number was skipped or messages were dropped.
    MessageLoss,
    /// A message could not be applied to the local copy.
    InvalidState,
    /// A message could not be decoded.
    Malformed,
}

/// Observer to master: please broadcast `updateGame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    pub reason: ResyncReason,
    pub last_seq: Option<u64>,
}
