//! The authoritative side of a game session.
//!
//! A [`GameMaster`] owns the live copy of one game. Every mutation is
//! applied through the game-state transitions, written to the store, and
//! only then adopted locally and broadcast. All of that happens under one
//! lock, so sequence numbers follow broadcast order and a failed write leaves
//! both the in-memory copy and the observers untouched.

use std::sync::Arc;
use std::time::Duration;

use brainbrawl_shared::constants::FIRST_SEQ;
use brainbrawl_shared::{
    Game, GameId, InvalidState, Joker, Outcome, Player, PlayerId, Question, QuestionId,
    ResyncRequest, Role, Scoring, Stored, SyncCommand, SyncMessage,
};
use brainbrawl_store::StoreHandle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bus::SyncBus;
use crate::error::Result;

struct MasterState {
    game: Stored<Game>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct GameMaster {
    store: StoreHandle,
    bus: SyncBus,
    state: Arc<Mutex<MasterState>>,
}

impl GameMaster {
    /// Load `game_id` from the store and take charge of it.
    pub async fn load(store: StoreHandle, bus: SyncBus, game_id: GameId) -> Result<Self> {
        let game = store.get_by_id::<Game>(game_id).await?;
        info!(game_id = %game.id, name = %game.record.name, "game master ready");

        Ok(Self {
            store,
            bus,
            state: Arc::new(Mutex::new(MasterState {
                game,
                next_seq: FIRST_SEQ,
            })),
        })
    }

    /// Snapshot of the authoritative game.
    pub async fn game(&self) -> Stored<Game> {
        self.state.lock().await.game.clone()
    }

    /// Open a question. Media questions without their file and text
    /// questions without their text are refused.
    pub async fn select_question(&self, question_id: QuestionId) -> Result<()> {
        let question = self.store.get_by_id::<Question>(question_id).await?;
        if !question.record.is_playable() {
            return Err(InvalidState::NotPlayable(question_id).into());
        }

        self.commit(
            |game| game.open_question(question_id),
            Some(SyncCommand::SelectQuestion { question_id }),
        )
        .await
    }

    /// Close the current question and score it with the question's stored
    /// points and penalty, which are sent along so observers score alike.
    pub async fn close_question(&self, question_id: QuestionId, outcome: Outcome) -> Result<()> {
        let question = self.store.get_by_id::<Question>(question_id).await?;
        let scoring = Scoring::of(&question.record);

        self.commit(
            |game| game.close_scored(question_id, scoring, outcome),
            Some(SyncCommand::CloseQuestion {
                question_id,
                outcome,
                scoring: Some(scoring),
            }),
        )
        .await
    }

    /// Spend a player's joker. Observers learn about it from a snapshot.
    pub async fn use_joker(&self, player_id: PlayerId, joker_name: &str) -> Result<()> {
        self.commit(|game| game.use_joker(player_id, joker_name), None)
            .await
    }

    /// Enroll an existing player mid-game.
    pub async fn add_player(&self, player_id: PlayerId, jokers: Vec<Joker>) -> Result<()> {
        self.store.get_by_id::<Player>(player_id).await?;
        self.commit(|game| game.add_player(player_id, jokers), None)
            .await
    }

    /// Re-open a question that was closed by mistake.
    pub async fn reset_question(&self, question_id: QuestionId) -> Result<()> {
        self.commit(|game| game.reset_question(question_id), None)
            .await
    }

    /// Broadcast the full game so observers can (re)synchronize.
    pub async fn publish_snapshot(&self) {
        let mut state = self.state.lock().await;
        let command = SyncCommand::UpdateGame(state.game.clone());
        self.broadcast(&mut state, command);
    }

    /// Re-broadcast the snapshot every `every` and whenever an observer asks
    /// for it. Runs until every [`ResyncSender`](crate::ResyncSender) of
    /// `requests` is dropped or the task is aborted.
    pub fn spawn_resync_loop(
        &self,
        every: Duration,
        mut requests: mpsc::Receiver<ResyncRequest>,
    ) -> JoinHandle<()> {
        let master = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    request = requests.recv() => match request {
                        Some(request) => {
                            debug!(reason = ?request.reason, last_seq = ?request.last_seq, "resync requested");
                        }
                        None => {
                            info!("resync channel closed, stopping resync loop");
                            break;
                        }
                    },
                }
                master.publish_snapshot().await;
            }
        })
    }

    async fn commit<F>(&self, transition: F, command: Option<SyncCommand>) -> Result<()>
    where
        F: FnOnce(&Game) -> std::result::Result<Game, InvalidState>,
    {
        let mut state = self.state.lock().await;

        let next = match transition(&state.game.record) {
            Ok(next) => next,
            Err(e) => {
                warn!(game_id = %state.game.id, error = %e, "transition rejected");
                return Err(e.into());
            }
        };
        if next == state.game.record {
            debug!(game_id = %state.game.id, "transition changed nothing");
            return Ok(());
        }

        let updated = Stored::new(state.game.id, next);
        self.store.update(updated.clone()).await?;
        state.game = updated;

        let command = command.unwrap_or_else(|| SyncCommand::UpdateGame(state.game.clone()));
        self.broadcast(&mut state, command);
        Ok(())
    }

    fn broadcast(&self, state: &mut MasterState, command: SyncCommand) {
        let message = SyncMessage::new(Role::Master, state.next_seq, command);
        state.next_seq += 1;
        self.bus.publish(message);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use brainbrawl_shared::{MediaFile, QuestionType};
    use brainbrawl_store::{StoreError, StoreOptions};
    use tokio::sync::broadcast;

    use super::*;
    use crate::bus::{resync_channel, ResyncSender};
    use crate::error::SyncError;

    pub(crate) struct Session {
        pub store: StoreHandle,
        pub bus: SyncBus,
        pub resync: ResyncSender,
        pub resync_rx: mpsc::Receiver<ResyncRequest>,
        pub master: GameMaster,
        pub player: PlayerId,
        pub question: QuestionId,
        pub media_question: QuestionId,
    }

    pub(crate) async fn session() -> Session {
        let store = StoreHandle::open(StoreOptions::in_memory()).await.unwrap();
        let player = store.add(Player::new("Pat")).await.unwrap();

        let mut text = Question::new("Capital of Chile", QuestionType::Text, 100, 20);
        text.text = Some("Which city?".into());
        let question = store.add(text).await.unwrap();
        let media_question = store
            .add(Question::new("Whose voice?", QuestionType::Audio, 50, 0))
            .await
            .unwrap();

        let game = Game::basic("Friday", 2.0, vec![question, media_question])
            .add_player(player, vec![Joker::new("Skip", "Skip a question")])
            .unwrap();
        let game_id = store.add(game).await.unwrap();

        let bus = SyncBus::new(16);
        let (resync, resync_rx) = resync_channel(16);
        let master = GameMaster::load(store.clone(), bus.clone(), game_id)
            .await
            .unwrap();

        Session {
            store,
            bus,
            resync,
            resync_rx,
            master,
            player,
            question,
            media_question,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<SyncMessage>) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn scoring_scenario_is_persisted_and_broadcast() {
        let s = session().await;
        let mut rx = s.bus.subscribe();

        s.master.select_question(s.question).await.unwrap();
        s.master
            .close_question(s.question, Outcome::Correct { player_id: s.player })
            .await
            .unwrap();

        let live = s.master.game().await;
        assert_eq!(live.record.score_of(s.player), Some(200));
        assert!(live.record.is_closed(s.question));
        assert_eq!(live.record.current_question, None);

        let persisted = s.store.get_by_id::<Game>(live.id).await.unwrap();
        assert_eq!(persisted, live);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].seq, 1);
        assert_eq!(sent[0].command.name(), "selectQuestion");
        assert_eq!(sent[1].seq, 2);
        assert_eq!(sent[1].command.name(), "closeQuestion");
    }

    #[tokio::test]
    async fn rejected_transition_broadcasts_nothing() {
        let s = session().await;
        let mut rx = s.bus.subscribe();
        let before = s.master.game().await;

        let err = s
            .master
            .close_question(s.question, Outcome::Skipped)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(InvalidState::NotSelected(_))));
        assert_eq!(s.master.game().await, before);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn media_question_without_file_is_not_playable() {
        let s = session().await;
        let err = s.master.select_question(s.media_question).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(InvalidState::NotPlayable(_))));

        let mut question = s.store.get_by_id::<Question>(s.media_question).await.unwrap();
        question.record.file = Some(MediaFile::Reference("voices/1.ogg".into()));
        s.store.update(question).await.unwrap();
        s.master.select_question(s.media_question).await.unwrap();
    }

    #[tokio::test]
    async fn repeated_close_is_silent() {
        let s = session().await;
        s.master.select_question(s.question).await.unwrap();
        let outcome = Outcome::Correct { player_id: s.player };
        s.master.close_question(s.question, outcome).await.unwrap();

        let mut rx = s.bus.subscribe();
        s.master.close_question(s.question, outcome).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(s.master.game().await.record.score_of(s.player), Some(200));
    }

    #[tokio::test]
    async fn joker_use_goes_out_as_snapshot() {
        let s = session().await;
        let mut rx = s.bus.subscribe();

        s.master.use_joker(s.player, "Skip").await.unwrap();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        match &sent[0].command {
            SyncCommand::UpdateGame(game) => {
                assert!(game.record.player_data[&s.player].jokers[0].is_used)
            }
            other => panic!("unexpected command {}", other.name()),
        }

        assert!(s.master.use_joker(s.player, "Skip").await.is_err());
    }

    #[tokio::test]
    async fn unknown_player_cannot_be_enrolled() {
        let s = session().await;
        let err = s.master.add_player(PlayerId(999), vec![]).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn close_message_carries_the_scoring_used() {
        let s = session().await;
        let mut rx = s.bus.subscribe();
        s.master.select_question(s.question).await.unwrap();
        s.master
            .close_question(s.question, Outcome::Correct { player_id: s.player })
            .await
            .unwrap();

        let sent = drain(&mut rx);
        match &sent[1].command {
            SyncCommand::CloseQuestion { scoring, .. } => assert_eq!(
                *scoring,
                Some(Scoring {
                    points: 100,
                    penalty: 20
                })
            ),
            other => panic!("unexpected command {}", other.name()),
        }
    }

    #[tokio::test]
    async fn resync_loop_stops_when_observers_are_gone() {
        let s = session().await;
        let handle = s
            .master
            .spawn_resync_loop(Duration::from_secs(3600), s.resync_rx);

        drop(s.resync);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("resync loop kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn resync_loop_answers_requests() {
        let s = session().await;
        let mut rx = s.bus.subscribe();

        let handle = s
            .master
            .spawn_resync_loop(Duration::from_secs(3600), s.resync_rx);
        // the first interval tick fires immediately
        let first = rx.recv().await.unwrap();
        assert_eq!(first.command.name(), "updateGame");

        s.resync.request(ResyncRequest {
            reason: brainbrawl_shared::ResyncReason::MessageLoss,
            last_seq: Some(first.seq),
        });
        let second = rx.recv().await.unwrap();
        assert_eq!(second.command.name(), "updateGame");
        assert_eq!(second.seq, first.seq + 1);

        handle.abort();
    }
}
