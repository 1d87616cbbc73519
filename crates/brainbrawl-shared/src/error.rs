use thiserror::Error;

use crate::types::{PlayerId, QuestionId, Role};

/// An illegal game-state transition. The game it was attempted on is left
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidState {
    #[error("Question {0} is not part of this game")]
    QuestionNotInGame(QuestionId),

    #[error("Question {0} is already closed")]
    QuestionClosed(QuestionId),

    #[error("Question {0} has not been selected")]
    NotSelected(QuestionId),

    #[error("Question {0} is missing its media or text and cannot be played")]
    NotPlayable(QuestionId),

    #[error("Player {0} is not part of this game")]
    UnknownPlayer(PlayerId),

    #[error("Player {0} is already part of this game")]
    PlayerAlreadyJoined(PlayerId),

    #[error("Player {player} has no joker named {joker:?}")]
    UnknownJoker { player: PlayerId, joker: String },

    #[error("Player {player} already used joker {joker:?}")]
    JokerAlreadyUsed { player: PlayerId, joker: String },

    #[error("Score of player {0} would overflow")]
    ScoreOverflow(PlayerId),
}

/// A game record that breaks one of the aggregate's structural invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Multiplier must be a positive finite number, got {0}")]
    InvalidMultiplier(f64),

    #[error("Question {0} appears more than once in the layout")]
    DuplicateQuestion(QuestionId),

    #[error("Question data for {0} refers to a question outside the layout")]
    UnreachableQuestionData(QuestionId),

    #[error("Current question {0} is not part of the layout")]
    DanglingCurrentQuestion(QuestionId),

    #[error("Current question {0} is already closed")]
    ClosedCurrentQuestion(QuestionId),

    #[error("Entry stored under id {0} carries a different id")]
    MismatchedKey(i64),
}

/// A sync message that was rejected at the protocol boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed sync message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Sender {sender} may not issue {command}")]
    NotAuthoritative { sender: Role, command: &'static str },
}
