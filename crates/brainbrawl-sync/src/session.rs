//! Wiring for a hosted game: store, bus, master and its resync loop, all
//! built from one [`SyncConfig`].

use brainbrawl_shared::GameId;
use brainbrawl_store::StoreHandle;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::{resync_channel, ResyncSender, SyncBus};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::master::GameMaster;
use crate::observer::Observer;

pub struct MasterSession {
    pub store: StoreHandle,
    pub bus: SyncBus,
    pub master: GameMaster,
    resync: ResyncSender,
    resync_task: JoinHandle<()>,
}

impl MasterSession {
    /// Install logging per `config.log_filter`, open the configured store
    /// and start hosting `game_id`.
    pub async fn open(config: &SyncConfig, game_id: GameId) -> Result<Self> {
        crate::init_tracing(&config.log_filter);
        let store = StoreHandle::open(config.store_options()).await?;
        Self::host(config, store, game_id).await
    }

    /// Start hosting `game_id` from an already opened store.
    pub async fn host(config: &SyncConfig, store: StoreHandle, game_id: GameId) -> Result<Self> {
        let bus = SyncBus::new(config.bus_capacity);
        let (resync, resync_rx) = resync_channel(config.bus_capacity);
        let master = GameMaster::load(store.clone(), bus.clone(), game_id).await?;
        let resync_task = master.spawn_resync_loop(config.resync_interval, resync_rx);

        info!(%game_id, interval = ?config.resync_interval, "hosting game");
        Ok(Self {
            store,
            bus,
            master,
            resync,
            resync_task,
        })
    }

    /// A local observer reading questions from the session's store. Call
    /// [`Observer::run`] with [`SyncBus::subscribe`] to attach it.
    pub fn observer(&self) -> Observer {
        Observer::new(self.resync.clone()).with_store(self.store.clone())
    }

    /// Stop the resync loop. The store stays open for other handles.
    /// Dropping the session does the same.
    pub fn shutdown(self) {
        info!("game session stopped");
    }
}

impl Drop for MasterSession {
    fn drop(&mut self) {
        self.resync_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use brainbrawl_shared::{Game, Outcome, Player, PlayerId, Question, QuestionId, QuestionType};
    use tokio::sync::broadcast;

    use super::*;

    async fn seeded(config: &SyncConfig) -> (GameId, PlayerId, QuestionId) {
        let store = StoreHandle::open(config.store_options()).await.unwrap();
        let player = store.add(Player::new("Kim")).await.unwrap();
        let mut question = Question::new("Largest planet?", QuestionType::Text, 10, 5);
        question.text = Some("Name it".into());
        let question = store.add(question).await.unwrap();
        let game = Game::basic("Solo", 1.5, vec![question])
            .add_player(player, vec![])
            .unwrap();
        let game_id = store.add(game).await.unwrap();
        store.close().await.unwrap();
        (game_id, player, question)
    }

    fn config(dir: &tempfile::TempDir) -> SyncConfig {
        SyncConfig {
            db_path: Some(dir.path().join("session.db")),
            resync_interval: Duration::from_secs(3600),
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn hosted_game_persists_to_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (game_id, player, question) = seeded(&config).await;

        let session = MasterSession::open(&config, game_id).await.unwrap();
        assert!(tracing::dispatcher::has_been_set());
        let mut rx = session.bus.subscribe();
        // the loop's first tick publishes a snapshot right away
        assert_eq!(rx.recv().await.unwrap().command.name(), "updateGame");

        session.master.select_question(question).await.unwrap();
        session
            .master
            .close_question(question, Outcome::Correct { player_id: player })
            .await
            .unwrap();

        let stored = session.store.get_by_id::<Game>(game_id).await.unwrap();
        assert_eq!(stored.record.score_of(player), Some(15));
        session.shutdown();
    }

    #[tokio::test]
    async fn dropping_the_session_stops_the_resync_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (game_id, _, _) = seeded(&config).await;

        let store = StoreHandle::open(config.store_options()).await.unwrap();
        let session = MasterSession::host(&config, store, game_id).await.unwrap();
        let _observer = session.observer();
        let mut rx = session.bus.subscribe();
        drop(session);

        // the loop held the last master, so the broadcast closes once it is gone
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Err(broadcast::error::RecvError::Closed) = rx.recv().await {
                    break;
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
