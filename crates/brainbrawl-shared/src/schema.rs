//! Persisted entity records.
//!
//! Every record is stored without its id; the store hands it back wrapped in
//! [`Stored`], which flattens the id next to the record fields so the JSON
//! shape is `{ "id": 1, "name": ..., ... }`.
//!
//! A [`Game`] is an aggregate: it refers to players and questions by id only
//! and never embeds their records.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;
use crate::types::{GameId, PlayerId, QuestionId};

// ---------------------------------------------------------------------------
// Entity plumbing
// ---------------------------------------------------------------------------

/// A record kind that lives in its own collection.
pub trait Entity: Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Typed id assigned by the store.
    type Id: Copy
        + Eq
        + Ord
        + Hash
        + Debug
        + Display
        + Serialize
        + DeserializeOwned
        + From<i64>
        + Into<i64>
        + Send
        + Sync
        + 'static;

    /// Collection (table) name.
    const COLLECTION: &'static str;

    /// Value of the secondary `name` index.
    fn name(&self) -> &str;
}

/// A record together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Stored<T: Entity> {
    pub id: T::Id,
    #[serde(flatten)]
    pub record: T,
}

impl<T: Entity> Stored<T> {
    pub fn new(id: T::Id, record: T) -> Self {
        Self { id, record }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A contestant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<Vec<u8>>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_picture: None,
        }
    }
}

impl Entity for Player {
    type Id = PlayerId;
    const COLLECTION: &'static str = "players";

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    Video,
    Audio,
    Text,
    Zoom,
    Image,
}

impl QuestionType {
    /// Whether a question of this type needs a media file before it can be
    /// played.
    pub fn requires_media(&self) -> bool {
        !matches!(self, QuestionType::Text)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Video => "video",
            QuestionType::Audio => "audio",
            QuestionType::Text => "text",
            QuestionType::Zoom => "zoom",
            QuestionType::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(QuestionType::Video),
            "audio" => Some(QuestionType::Audio),
            "text" => Some(QuestionType::Text),
            "zoom" => Some(QuestionType::Zoom),
            "image" => Some(QuestionType::Image),
            _ => None,
        }
    }
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media attached to a question.
///
/// Schema v1 only knew inline bytes; v2 widened the column to also accept a
/// reference (path or URL) to media stored elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MediaFile {
    Inline(Vec<u8>),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Reward for a correct answer, before the game multiplier.
    pub points: i64,
    /// Deduction for an incorrect answer, before the game multiplier.
    pub penalty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_master_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<MediaFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Revealed one at a time, in order.
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Question {
    pub fn new(name: impl Into<String>, kind: QuestionType, points: i64, penalty: i64) -> Self {
        Self {
            name: name.into(),
            kind,
            points,
            penalty,
            game_master_info: None,
            player_info: None,
            file: None,
            text: None,
            hints: Vec::new(),
        }
    }

    /// A media question needs its file, a text question needs its text.
    pub fn is_playable(&self) -> bool {
        if self.kind.requires_media() {
            self.file.is_some()
        } else {
            self.text.is_some()
        }
    }
}

impl Entity for Question {
    type Id = QuestionId;
    const COLLECTION: &'static str = "questions";

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// A one-shot special ability held by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joker {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_used: bool,
}

impl Joker {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_used: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub player_id: PlayerId,
    pub score: i64,
    // games written before jokers existed have no such field
    #[serde(default)]
    pub jokers: Vec<Joker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionData {
    pub question_id: QuestionId,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub questions: Vec<QuestionId>,
}

/// How the questions of a game are arranged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GameLayout {
    /// One flat, ordered run of questions.
    Basic { questions: Vec<QuestionId> },
    /// A board of categories, each an ordered column of questions.
    Jeopardy { categories: Vec<Category> },
}

impl GameLayout {
    pub fn kind(&self) -> &'static str {
        match self {
            GameLayout::Basic { .. } => "basic",
            GameLayout::Jeopardy { .. } => "jeopardy",
        }
    }
}

/// Where a question sits inside a game's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPosition {
    Basic(usize),
    Grid { category: usize, row: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub name: String,
    /// Applied to both points and penalty when scoring.
    pub multiplier: f64,
    pub layout: GameLayout,
    #[serde(default, with = "keyed_seq")]
    pub player_data: BTreeMap<PlayerId, PlayerData>,
    #[serde(default, with = "keyed_seq")]
    pub question_data: BTreeMap<QuestionId, QuestionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<QuestionId>,
    /// Bumped by every play-state transition that changes the game.
    #[serde(default)]
    pub revision: u64,
}

impl Entity for Game {
    type Id = GameId;
    const COLLECTION: &'static str = "games";

    fn name(&self) -> &str {
        &self.name
    }
}

impl Game {
    pub fn new(name: impl Into<String>, multiplier: f64, layout: GameLayout) -> Self {
        Self {
            name: name.into(),
            multiplier,
            layout,
            player_data: BTreeMap::new(),
            question_data: BTreeMap::new(),
            current_question: None,
            revision: 0,
        }
    }

    pub fn basic(name: impl Into<String>, multiplier: f64, questions: Vec<QuestionId>) -> Self {
        Self::new(name, multiplier, GameLayout::Basic { questions })
    }

    pub fn jeopardy(name: impl Into<String>, multiplier: f64, categories: Vec<Category>) -> Self {
        Self::new(name, multiplier, GameLayout::Jeopardy { categories })
    }

    /// All question ids in layout order (category by category for jeopardy).
    pub fn question_ids(&self) -> Vec<QuestionId> {
        match &self.layout {
            GameLayout::Basic { questions } => questions.clone(),
            GameLayout::Jeopardy { categories } => categories
                .iter()
                .flat_map(|c| c.questions.iter().copied())
                .collect(),
        }
    }

    pub fn locate(&self, question_id: QuestionId) -> Option<QuestionPosition> {
        match &self.layout {
            GameLayout::Basic { questions } => questions
                .iter()
                .position(|q| *q == question_id)
                .map(QuestionPosition::Basic),
            GameLayout::Jeopardy { categories } => {
                categories.iter().enumerate().find_map(|(category, c)| {
                    c.questions
                        .iter()
                        .position(|q| *q == question_id)
                        .map(|row| QuestionPosition::Grid { category, row })
                })
            }
        }
    }

    /// Resolve a position back to the question id it designates.
    pub fn question_at(&self, position: QuestionPosition) -> Option<QuestionId> {
        match (&self.layout, position) {
            (GameLayout::Basic { questions }, QuestionPosition::Basic(index)) => {
                questions.get(index).copied()
            }
            (GameLayout::Jeopardy { categories }, QuestionPosition::Grid { category, row }) => {
                categories.get(category)?.questions.get(row).copied()
            }
            _ => None,
        }
    }

    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.locate(question_id).is_some()
    }

    pub fn is_closed(&self, question_id: QuestionId) -> bool {
        self.question_data
            .get(&question_id)
            .map(|d| d.is_closed)
            .unwrap_or(false)
    }

    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.player_data.keys().copied()
    }

    /// Check the structural invariants that do not need the store: questions
    /// appear once, question data only covers reachable questions and the
    /// current question is reachable and still open.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        if !(self.multiplier.is_finite() && self.multiplier > 0.0) {
            return Err(ShapeError::InvalidMultiplier(self.multiplier));
        }

        let mut seen = std::collections::BTreeSet::new();
        for id in self.question_ids() {
            if !seen.insert(id) {
                return Err(ShapeError::DuplicateQuestion(id));
            }
        }

        for (id, data) in &self.question_data {
            if data.question_id != *id {
                return Err(ShapeError::MismatchedKey(id.0));
            }
            if !seen.contains(id) {
                return Err(ShapeError::UnreachableQuestionData(*id));
            }
        }

        for (id, data) in &self.player_data {
            if data.player_id != *id {
                return Err(ShapeError::MismatchedKey(id.0));
            }
        }

        if let Some(current) = self.current_question {
            if !seen.contains(&current) {
                return Err(ShapeError::DanglingCurrentQuestion(current));
            }
            if self.is_closed(current) {
                return Err(ShapeError::ClosedCurrentQuestion(current));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Entries of an id-keyed map that carry their own key.
pub trait Keyed {
    type Key: Ord + Copy + Debug;
    fn key(&self) -> Self::Key;
}

impl Keyed for PlayerData {
    type Key = PlayerId;
    fn key(&self) -> PlayerId {
        self.player_id
    }
}

impl Keyed for QuestionData {
    type Key = QuestionId;
    fn key(&self) -> QuestionId {
        self.question_id
    }
}

/// Collect keyed entries into a map, rejecting duplicate keys.
pub fn index_by_key<V: Keyed>(entries: Vec<V>) -> Result<BTreeMap<V::Key, V>, V::Key> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let key = entry.key();
        if map.insert(key, entry).is_some() {
            return Err(key);
        }
    }
    Ok(map)
}

/// (De)serialize an id-keyed map as a plain array of its values, so ids stay
/// numbers on the wire instead of becoming JSON object keys.
pub mod keyed_seq {
    use std::collections::BTreeMap;

    use serde::de::{Deserialize, Deserializer, Error};
    use serde::ser::{Serialize, Serializer};

    use super::{index_by_key, Keyed};

    pub fn serialize<V, S>(map: &BTreeMap<V::Key, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Keyed + Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<BTreeMap<V::Key, V>, D::Error>
    where
        V: Keyed + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<V>::deserialize(deserializer)?;
        index_by_key(entries).map_err(|key| D::Error::custom(format!("duplicate entry for id {key:?}")))
    }
}
