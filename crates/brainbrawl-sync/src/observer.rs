//! Non-authoritative replica of a game.
//!
//! An [`Observer`] follows the master's broadcast and keeps its own copy of
//! the game. It never originates changes. Anything it cannot apply cleanly
//! (a gap in the sequence, an unknown question, a transition its copy
//! rejects, undecodable input) is downgraded to a [`ResyncRequest`]; the
//! observer then waits for the next `updateGame` snapshot.
//!
//! Snapshots always apply and restart the sequence check at their own seq,
//! so an observer follows a master that restarted its counter.

use std::collections::HashMap;

use brainbrawl_shared::{
    Game, InvalidState, Outcome, Question, QuestionId, ResyncReason, ResyncRequest, Scoring,
    Stored, SyncCommand, SyncMessage,
};
use brainbrawl_store::StoreHandle;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::bus::ResyncSender;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// In step with the master; incremental commands are applied.
    Idle,
    /// Waiting for a full snapshot; incremental commands are dropped.
    AwaitingUpdate,
    Applying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Ignored,
    ResyncRequested(ResyncReason),
}

pub struct Observer {
    state: SyncState,
    game: Option<Stored<Game>>,
    last_seq: Option<u64>,
    questions: HashMap<QuestionId, Stored<Question>>,
    resync: ResyncSender,
    store: Option<StoreHandle>,
    persist_updates: bool,
}

impl Observer {
    pub fn new(resync: ResyncSender) -> Self {
        Self {
            state: SyncState::AwaitingUpdate,
            game: None,
            last_seq: None,
            questions: HashMap::new(),
            resync,
            store: None,
            persist_updates: false,
        }
    }

    /// Seed the question cache.
    pub fn with_questions(mut self, questions: impl IntoIterator<Item = Stored<Question>>) -> Self {
        self.questions
            .extend(questions.into_iter().map(|q| (q.id, q)));
        self
    }

    /// Read questions missing from the cache from `store`.
    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    /// Management role: like [`with_store`](Self::with_store), and the local
    /// copy is written back to the store after every applied message. A
    /// write never replaces a later revision the master already stored.
    pub fn managing(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self.persist_updates = true;
        self
    }

    /// Fill the question cache with every question in the store.
    pub async fn load_questions(&mut self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let questions = store.get_all::<Question>().await?;
        let count = questions.len();
        self.questions
            .extend(questions.into_iter().map(|q| (q.id, q)));
        debug!(count, "question cache loaded");
        Ok(count)
    }

    /// Ask the master for the initial snapshot.
    pub fn start(&self) {
        self.request_resync(ResyncReason::Startup);
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn game(&self) -> Option<&Stored<Game>> {
        self.game.as_ref()
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Decode and apply a wire message.
    pub async fn handle_raw(&mut self, raw: &str) -> ApplyOutcome {
        match SyncMessage::from_json(raw) {
            Ok(message) => self.apply(message).await,
            Err(e) => {
                warn!(error = %e, "malformed sync message");
                self.state = SyncState::AwaitingUpdate;
                self.request_resync(ResyncReason::Malformed)
            }
        }
    }

    pub async fn apply(&mut self, message: SyncMessage) -> ApplyOutcome {
        if let Err(e) = message.ensure_authoritative() {
            debug!(error = %e, "ignoring message");
            return ApplyOutcome::Ignored;
        }
        let seq = message.seq;
        let result = match message.command {
            SyncCommand::UpdateGame(game) => {
                self.state = SyncState::Applying;
                if self.last_seq.is_some_and(|last| seq <= last) {
                    info!(game_id = %game.id, seq, last = ?self.last_seq, "sequence restarted");
                }
                info!(game_id = %game.id, seq, revision = game.record.revision, "applying snapshot");
                self.game = Some(game);
                self.last_seq = Some(seq);
                self.state = SyncState::Idle;
                self.persist().await;
                return ApplyOutcome::Applied;
            }
            SyncCommand::SelectQuestion { question_id } => {
                let game = match self.next_in_line(seq, "selectQuestion") {
                    Ok(game) => game,
                    Err(outcome) => return outcome,
                };
                game.open_question(question_id)
            }
            SyncCommand::CloseQuestion {
                question_id,
                outcome,
                scoring,
            } => {
                let game = match self.next_in_line(seq, "closeQuestion") {
                    Ok(game) => game,
                    Err(outcome) => return outcome,
                };
                self.close(&game, question_id, outcome, scoring).await
            }
        };
        self.last_seq = Some(seq);

        match result {
            Ok(next) => {
                if let Some(stored) = self.game.as_mut() {
                    stored.record = next;
                }
                self.state = SyncState::Idle;
                self.persist().await;
                ApplyOutcome::Applied
            }
            Err(e) => {
                warn!(seq, error = %e, "cannot apply command, requesting snapshot");
                self.state = SyncState::AwaitingUpdate;
                self.request_resync(ResyncReason::InvalidState)
            }
        }
    }

    /// Consume the broadcast until the master goes away.
    pub async fn run(mut self, mut updates: broadcast::Receiver<SyncMessage>) -> Self {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    self.apply(message).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagged behind the broadcast");
                    self.state = SyncState::AwaitingUpdate;
                    self.request_resync(ResyncReason::MessageLoss);
                }
                Err(RecvError::Closed) => {
                    info!("broadcast closed, observer stopping");
                    break;
                }
            }
        }
        self
    }

    /// The copy an incremental command at `seq` applies to, or what to do
    /// instead when it cannot be applied.
    fn next_in_line(&mut self, seq: u64, command: &'static str) -> std::result::Result<Game, ApplyOutcome> {
        let (Some(game), Some(last)) = (&self.game, self.last_seq) else {
            debug!(seq, command, "no snapshot yet, dropping command");
            return Err(ApplyOutcome::Ignored);
        };
        if self.state != SyncState::Idle {
            debug!(seq, command, "awaiting snapshot, dropping command");
            return Err(ApplyOutcome::Ignored);
        }
        if seq <= last {
            debug!(seq, last, command, "stale message");
            return Err(ApplyOutcome::Ignored);
        }
        if seq != last + 1 {
            warn!(seq, expected = last + 1, command, "sequence gap");
            self.state = SyncState::AwaitingUpdate;
            return Err(self.request_resync(ResyncReason::MessageLoss));
        }

        self.state = SyncState::Applying;
        Ok(game.record.clone())
    }

    async fn close(
        &mut self,
        game: &Game,
        question_id: QuestionId,
        outcome: Outcome,
        scoring: Option<Scoring>,
    ) -> std::result::Result<Game, InvalidState> {
        if let Some(scoring) = scoring {
            return game.close_scored(question_id, scoring, outcome);
        }
        match self.question(question_id).await {
            Some(question) => game.close_question(&question, outcome),
            None => Err(InvalidState::QuestionNotInGame(question_id)),
        }
    }

    async fn question(&mut self, question_id: QuestionId) -> Option<Stored<Question>> {
        if let Some(question) = self.questions.get(&question_id) {
            return Some(question.clone());
        }

        let store = self.store.as_ref()?;
        match store.get_by_id::<Question>(question_id).await {
            Ok(question) => {
                self.questions.insert(question_id, question.clone());
                Some(question)
            }
            Err(e) => {
                warn!(%question_id, error = %e, "question record unavailable");
                None
            }
        }
    }

    async fn persist(&self) {
        let (true, Some(store), Some(game)) = (self.persist_updates, &self.store, &self.game) else {
            return;
        };
        match store.update_game_if_newer(game.clone()).await {
            Ok(true) => debug!(game_id = %game.id, revision = game.record.revision, "game persisted"),
            Ok(false) => debug!(game_id = %game.id, revision = game.record.revision, "store already up to date"),
            Err(e) => warn!(game_id = %game.id, error = %e, "failed to persist game"),
        }
    }

    fn request_resync(&self, reason: ResyncReason) -> ApplyOutcome {
        self.resync.request(ResyncRequest {
            reason,
            last_seq: self.last_seq,
        });
        ApplyOutcome::ResyncRequested(reason)
    }
}

#[cfg(test)]
mod tests {
    use brainbrawl_shared::{GameId, Joker, Player, QuestionType, Role};
    use brainbrawl_store::StoreOptions;
    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::resync_channel;
    use crate::master::tests::session;
    use crate::master::GameMaster;

    fn quiz() -> (Stored<Game>, Stored<Question>) {
        let question = Stored::new(
            QuestionId(1),
            Question::new("Q1", QuestionType::Text, 100, 30),
        );
        let game = Game::basic("Quiz", 2.0, vec![question.id])
            .add_player(brainbrawl_shared::PlayerId(1), vec![])
            .unwrap();
        (Stored::new(GameId(1), game), question)
    }

    fn observer() -> (Observer, mpsc::Receiver<ResyncRequest>) {
        let (resync, resync_rx) = resync_channel(8);
        (Observer::new(resync), resync_rx)
    }

    fn msg(seq: u64, command: SyncCommand) -> SyncMessage {
        SyncMessage::new(Role::Master, seq, command)
    }

    #[tokio::test]
    async fn starts_awaiting_and_ignores_commands_until_snapshot() {
        let (mut obs, mut resync_rx) = observer();
        assert_eq!(obs.state(), SyncState::AwaitingUpdate);

        obs.start();
        assert_eq!(resync_rx.recv().await.unwrap().reason, ResyncReason::Startup);

        let outcome = obs
            .apply(msg(1, SyncCommand::SelectQuestion { question_id: QuestionId(1) }))
            .await;
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert!(obs.game().is_none());
    }

    #[tokio::test]
    async fn applies_snapshot_then_commands_in_order() {
        let (game, question) = quiz();
        let (obs, _resync_rx) = observer();
        let mut obs = obs.with_questions([question.clone()]);

        assert_eq!(obs.apply(msg(1, SyncCommand::UpdateGame(game))).await, ApplyOutcome::Applied);
        assert_eq!(obs.state(), SyncState::Idle);

        let select = SyncCommand::SelectQuestion { question_id: question.id };
        assert_eq!(obs.apply(msg(2, select)).await, ApplyOutcome::Applied);

        let close = SyncCommand::CloseQuestion {
            question_id: question.id,
            outcome: Outcome::Incorrect {
                player_id: brainbrawl_shared::PlayerId(1),
            },
            scoring: None,
        };
        assert_eq!(obs.apply(msg(3, close)).await, ApplyOutcome::Applied);

        let game = &obs.game().unwrap().record;
        assert_eq!(game.score_of(brainbrawl_shared::PlayerId(1)), Some(-60));
        assert!(game.is_closed(question.id));
        assert_eq!(obs.last_seq(), Some(3));
    }

    #[tokio::test]
    async fn player_messages_and_duplicates_are_ignored() {
        let (game, question) = quiz();
        let (mut obs, mut resync_rx) = observer();
        obs.apply(msg(5, SyncCommand::UpdateGame(game.clone()))).await;

        let forged = SyncMessage::new(
            Role::Player,
            6,
            SyncCommand::SelectQuestion { question_id: question.id },
        );
        assert_eq!(obs.apply(forged).await, ApplyOutcome::Ignored);

        let select = SyncCommand::SelectQuestion { question_id: question.id };
        assert_eq!(obs.apply(msg(6, select.clone())).await, ApplyOutcome::Applied);
        assert_eq!(obs.apply(msg(6, select)).await, ApplyOutcome::Ignored);
        assert_eq!(obs.last_seq(), Some(6));
        assert!(resync_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_with_lower_seq_restarts_the_sequence() {
        let (game, question) = quiz();
        let (mut obs, mut resync_rx) = observer();
        obs.apply(msg(9, SyncCommand::UpdateGame(game.clone()))).await;

        let renamed = Stored::new(game.id, Game { name: "Rematch".into(), ..game.record.clone() });
        assert_eq!(obs.apply(msg(1, SyncCommand::UpdateGame(renamed.clone()))).await, ApplyOutcome::Applied);
        assert_eq!(obs.game(), Some(&renamed));
        assert_eq!(obs.last_seq(), Some(1));

        let select = SyncCommand::SelectQuestion { question_id: question.id };
        assert_eq!(obs.apply(msg(2, select)).await, ApplyOutcome::Applied);
        assert!(resync_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gap_requests_resync_and_leaves_copy_unchanged() {
        let (game, _) = quiz();
        let (mut obs, mut resync_rx) = observer();
        obs.apply(msg(1, SyncCommand::UpdateGame(game.clone()))).await;

        let outcome = obs
            .apply(msg(3, SyncCommand::SelectQuestion { question_id: QuestionId(1) }))
            .await;
        assert_eq!(outcome, ApplyOutcome::ResyncRequested(ResyncReason::MessageLoss));
        assert_eq!(obs.state(), SyncState::AwaitingUpdate);
        assert_eq!(obs.game(), Some(&game));

        let request = resync_rx.recv().await.unwrap();
        assert_eq!(request.last_seq, Some(1));

        // a fresh snapshot brings it back
        assert_eq!(obs.apply(msg(4, SyncCommand::UpdateGame(game))).await, ApplyOutcome::Applied);
        assert_eq!(obs.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn rejected_transition_requests_resync() {
        let (game, _) = quiz();
        let (mut obs, mut resync_rx) = observer();
        obs.apply(msg(1, SyncCommand::UpdateGame(game.clone()))).await;

        // closing without a select is not a legal transition
        let close = SyncCommand::CloseQuestion {
            question_id: QuestionId(1),
            outcome: Outcome::Skipped,
            scoring: None,
        };
        assert_eq!(
            obs.apply(msg(2, close)).await,
            ApplyOutcome::ResyncRequested(ResyncReason::InvalidState)
        );
        assert_eq!(obs.game(), Some(&game));
        assert_eq!(resync_rx.recv().await.unwrap().reason, ResyncReason::InvalidState);
    }

    #[tokio::test]
    async fn malformed_input_requests_resync() {
        let (mut obs, mut resync_rx) = observer();
        let outcome = obs.handle_raw("{\"sender\":\"master\",\"command\":").await;
        assert_eq!(outcome, ApplyOutcome::ResyncRequested(ResyncReason::Malformed));
        assert_eq!(resync_rx.recv().await.unwrap().reason, ResyncReason::Malformed);

        let outcome = obs
            .handle_raw(r#"{"sender":"master","seq":1,"command":"teleport","data":{}}"#)
            .await;
        assert_eq!(outcome, ApplyOutcome::ResyncRequested(ResyncReason::Malformed));
    }

    #[tokio::test]
    async fn handle_raw_applies_wire_messages() {
        let (game, _) = quiz();
        let (mut obs, _resync_rx) = observer();
        let raw = msg(1, SyncCommand::UpdateGame(game.clone())).to_json().unwrap();

        assert_eq!(obs.handle_raw(&raw).await, ApplyOutcome::Applied);
        assert_eq!(obs.game(), Some(&game));
    }

    #[tokio::test]
    async fn managing_observer_persists_snapshots() {
        let store = StoreHandle::open(StoreOptions::in_memory()).await.unwrap();
        let player = store.add(Player::new("Sam")).await.unwrap();
        let game_id = store.add(Game::basic("Night", 1.0, vec![])).await.unwrap();

        let (obs, _resync_rx) = observer();
        let mut obs = obs.managing(store.clone());

        let renamed = Game::basic("Night (final)", 1.0, vec![])
            .add_player(player, vec![Joker::new("Double", "Double points")])
            .unwrap();
        let snapshot = Stored::new(game_id, renamed);
        obs.apply(msg(1, SyncCommand::UpdateGame(snapshot.clone()))).await;

        assert_eq!(store.get_by_id::<Game>(game_id).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn observer_matches_master_after_broadcast() {
        let s = session().await;
        let observer = Observer::new(s.resync.clone()).with_store(s.store.clone());
        let rx = s.bus.subscribe();
        let task = tokio::spawn(observer.run(rx));

        s.master.publish_snapshot().await;
        s.master.select_question(s.question).await.unwrap();
        s.master
            .close_question(s.question, Outcome::Correct { player_id: s.player })
            .await
            .unwrap();
        s.master.use_joker(s.player, "Skip").await.unwrap();

        let expected = s.master.game().await;
        drop(s.master);
        drop(s.bus);

        let observer = task.await.unwrap();
        assert_eq!(observer.game(), Some(&expected));
        assert_eq!(observer.state(), SyncState::Idle);
        assert_eq!(expected.record.score_of(s.player), Some(200));
    }

    #[tokio::test]
    async fn observer_follows_a_restarted_master() {
        let s = session().await;
        let (obs, _resync_rx) = observer();
        let mut obs = obs.with_store(s.store.clone());
        let mut rx = s.bus.subscribe();

        for _ in 0..5 {
            s.master.publish_snapshot().await;
        }
        while let Ok(message) = rx.try_recv() {
            obs.apply(message).await;
        }
        assert_eq!(obs.last_seq(), Some(5));

        // a fresh master over the same store counts from the start again
        let game_id = s.master.game().await.id;
        drop(s.master);
        let master = GameMaster::load(s.store.clone(), s.bus.clone(), game_id)
            .await
            .unwrap();

        master.select_question(s.question).await.unwrap();
        master.publish_snapshot().await;
        master
            .close_question(s.question, Outcome::Correct { player_id: s.player })
            .await
            .unwrap();
        master.publish_snapshot().await;

        let mut outcomes = Vec::new();
        while let Ok(message) = rx.try_recv() {
            outcomes.push(obs.apply(message).await);
        }
        assert_eq!(
            outcomes,
            [
                ApplyOutcome::Ignored,
                ApplyOutcome::Applied,
                ApplyOutcome::Applied,
                ApplyOutcome::Applied,
            ]
        );
        assert_eq!(obs.game(), Some(&master.game().await));
        assert_eq!(obs.last_seq(), Some(4));
    }

    #[tokio::test]
    async fn managing_observer_never_rolls_back_master_commits() {
        let s = session().await;
        let (obs, _resync_rx) = observer();
        let mut obs = obs.managing(s.store.clone());
        let mut rx = s.bus.subscribe();

        // the snapshot is queued before the select, but the master commits
        // the select to the store before the observer gets to either
        s.master.publish_snapshot().await;
        s.master.select_question(s.question).await.unwrap();

        while let Ok(message) = rx.try_recv() {
            assert_eq!(obs.apply(message).await, ApplyOutcome::Applied);
        }

        let live = s.master.game().await;
        let stored = s.store.get_by_id::<Game>(live.id).await.unwrap();
        assert_eq!(stored.record.current_question, Some(s.question));
        assert_eq!(stored, live);
        assert_eq!(obs.game(), Some(&live));
    }

    #[tokio::test]
    async fn managing_observer_persists_incremental_commands() {
        let s = session().await;
        let (obs, _resync_rx) = observer();
        let mut obs = obs.managing(s.store.clone());
        let mut rx = s.bus.subscribe();

        s.master.publish_snapshot().await;
        obs.apply(rx.try_recv().unwrap()).await;

        // roll the store back behind the observer, then let a command through
        let before = s.master.game().await;
        s.master.select_question(s.question).await.unwrap();
        s.store.update(before.clone()).await.unwrap();
        assert_eq!(obs.apply(rx.try_recv().unwrap()).await, ApplyOutcome::Applied);

        let stored = s.store.get_by_id::<Game>(before.id).await.unwrap();
        assert_eq!(stored, s.master.game().await);
    }

    #[tokio::test]
    async fn close_uses_the_scoring_of_the_master_after_an_edit() {
        let s = session().await;
        let original = s.store.get_by_id::<Question>(s.question).await.unwrap();
        let (obs, _resync_rx) = observer();
        let mut obs = obs.with_questions([original.clone()]);
        let mut rx = s.bus.subscribe();
        let correct = Outcome::Correct { player_id: s.player };

        s.master.publish_snapshot().await;
        s.master.select_question(s.question).await.unwrap();
        s.master.close_question(s.question, correct).await.unwrap();

        // reworth the question and play it again
        s.master.reset_question(s.question).await.unwrap();
        let mut edited = original.clone();
        edited.record.points = 300;
        s.store.update(edited).await.unwrap();
        s.master.select_question(s.question).await.unwrap();
        s.master.close_question(s.question, correct).await.unwrap();

        while let Ok(message) = rx.try_recv() {
            assert_eq!(obs.apply(message).await, ApplyOutcome::Applied);
        }

        let live = s.master.game().await;
        assert_eq!(obs.game(), Some(&live));
        assert_eq!(live.record.score_of(s.player), Some(200 + 600));
    }
}
