//! Live play-state transitions on a [`Game`].
//!
//! Every transition takes the game by reference and returns a new value, so
//! a rejected transition can never leave a half-updated aggregate behind.
//! Basic and jeopardy games share the same rules; question lookups go
//! through [`Game::locate`], which walks the category grid for jeopardy.

use serde::{Deserialize, Serialize};

use crate::error::InvalidState;
use crate::schema::{Game, Joker, PlayerData, Question, QuestionData, Stored};
use crate::types::{PlayerId, QuestionId};

/// How a question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Outcome {
    #[serde(rename_all = "camelCase")]
    Correct { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    Incorrect { player_id: PlayerId },
    /// Nobody answered; the question is closed without scoring.
    Skipped,
}

impl Outcome {
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            Outcome::Correct { player_id } | Outcome::Incorrect { player_id } => Some(*player_id),
            Outcome::Skipped => None,
        }
    }
}

/// Points and penalty a question is scored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoring {
    pub points: i64,
    pub penalty: i64,
}

impl Scoring {
    pub fn of(question: &Question) -> Self {
        Self {
            points: question.points,
            penalty: question.penalty,
        }
    }
}

impl Game {
    /// Make `question_id` the active question.
    pub fn open_question(&self, question_id: QuestionId) -> Result<Game, InvalidState> {
        if !self.contains(question_id) {
            return Err(InvalidState::QuestionNotInGame(question_id));
        }
        if self.is_closed(question_id) {
            return Err(InvalidState::QuestionClosed(question_id));
        }

        let mut next = self.next_revision();
        next.current_question = Some(question_id);
        Ok(next)
    }

    /// Close the active question and score `outcome` with the question's
    /// current points and penalty.
    pub fn close_question(
        &self,
        question: &Stored<Question>,
        outcome: Outcome,
    ) -> Result<Game, InvalidState> {
        self.close_scored(question.id, Scoring::of(&question.record), outcome)
    }

    /// Close the active question and score `outcome` with `scoring`.
    ///
    /// Closing a question that is already closed returns the game unchanged.
    /// A correct answer adds `points * multiplier`, an incorrect one
    /// subtracts `penalty * multiplier`; both are rounded to whole points.
    /// A score that would leave the `i64` range is rejected. The current
    /// question is cleared.
    pub fn close_scored(
        &self,
        question_id: QuestionId,
        scoring: Scoring,
        outcome: Outcome,
    ) -> Result<Game, InvalidState> {
        if !self.contains(question_id) {
            return Err(InvalidState::QuestionNotInGame(question_id));
        }
        if self.is_closed(question_id) {
            return Ok(self.clone());
        }
        if self.current_question != Some(question_id) {
            return Err(InvalidState::NotSelected(question_id));
        }

        let mut next = self.next_revision();
        if let Some(player_id) = outcome.player() {
            let data = next
                .player_data
                .get_mut(&player_id)
                .ok_or(InvalidState::UnknownPlayer(player_id))?;

            let delta = match outcome {
                Outcome::Correct { .. } => scaled(scoring.points, self.multiplier),
                Outcome::Incorrect { .. } => {
                    scaled(scoring.penalty, self.multiplier).and_then(i64::checked_neg)
                }
                Outcome::Skipped => Some(0),
            };
            let current = data.score;
            data.score = delta
                .and_then(|d| current.checked_add(d))
                .ok_or(InvalidState::ScoreOverflow(player_id))?;
        }

        next.question_data.insert(
            question_id,
            QuestionData {
                question_id,
                is_closed: true,
            },
        );
        next.current_question = None;
        Ok(next)
    }

    /// Spend one of a player's jokers. Has no effect on the score.
    pub fn use_joker(&self, player_id: PlayerId, joker_name: &str) -> Result<Game, InvalidState> {
        let data = self
            .player_data
            .get(&player_id)
            .ok_or(InvalidState::UnknownPlayer(player_id))?;

        let index = data
            .jokers
            .iter()
            .position(|j| j.name == joker_name)
            .ok_or_else(|| InvalidState::UnknownJoker {
                player: player_id,
                joker: joker_name.to_string(),
            })?;

        if data.jokers[index].is_used {
            return Err(InvalidState::JokerAlreadyUsed {
                player: player_id,
                joker: joker_name.to_string(),
            });
        }

        let mut next = self.next_revision();
        if let Some(data) = next.player_data.get_mut(&player_id) {
            data.jokers[index].is_used = true;
        }
        Ok(next)
    }

    /// Enroll a player with a zero score and a fresh set of jokers.
    pub fn add_player(&self, player_id: PlayerId, jokers: Vec<Joker>) -> Result<Game, InvalidState> {
        if self.player_data.contains_key(&player_id) {
            return Err(InvalidState::PlayerAlreadyJoined(player_id));
        }

        let mut next = self.next_revision();
        next.player_data.insert(
            player_id,
            PlayerData {
                player_id,
                score: 0,
                jokers: jokers
                    .into_iter()
                    .map(|j| Joker { is_used: false, ..j })
                    .collect(),
            },
        );
        Ok(next)
    }

    /// Re-open a closed question (management correction). Scores already
    /// awarded for it are kept. An open question is left as it is.
    pub fn reset_question(&self, question_id: QuestionId) -> Result<Game, InvalidState> {
        if !self.contains(question_id) {
            return Err(InvalidState::QuestionNotInGame(question_id));
        }
        if !self.question_data.contains_key(&question_id) {
            return Ok(self.clone());
        }

        let mut next = self.next_revision();
        next.question_data.remove(&question_id);
        Ok(next)
    }

    pub fn score_of(&self, player_id: PlayerId) -> Option<i64> {
        self.player_data.get(&player_id).map(|d| d.score)
    }

    fn next_revision(&self) -> Game {
        let mut next = self.clone();
        next.revision = self.revision.saturating_add(1);
        next
    }
}

// `None` when the product does not fit in an i64.
fn scaled(value: i64, multiplier: f64) -> Option<i64> {
    let product = (value as f64 * multiplier).round();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if product.is_finite() && product >= i64::MIN as f64 && product < i64::MAX as f64 {
        Some(product as i64)
    } else {
        None
    }
}
