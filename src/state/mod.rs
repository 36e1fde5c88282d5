mod answer;
mod bingo;
mod buzzer;
mod drawing;
pub mod export;
mod player;
pub mod reveal;
mod score;
mod session;
pub mod store;
mod watchdog;

pub use answer::AnswerReceipt;
pub use bingo::{ClaimOutcome, DrawnBall};
pub use buzzer::{StealOutcome, TeamAnswerOutcome};
pub use drawing::GuessOutcome;
pub use watchdog::WatchdogReport;

use crate::config::AppConfig;
use crate::content::ContentPool;
use crate::error::{SessionError, SessionResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::SessionStore;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Idempotency key for one-shot round actions (reveal, auto-advance)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoundKey {
    pub session_id: SessionId,
    pub game: GameKind,
    pub index: usize,
    /// Distinguishes repeated actions within one round (bingo winners)
    pub step: usize,
}

impl RoundKey {
    pub fn new(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            game: session.game,
            index: session.question_index,
            step: 0,
        }
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }
}

/// Shared application state
pub struct AppState {
    pub store: SessionStore,
    pub content: Arc<dyn ContentPool>,
    pub config: AppConfig,
    pub players: Arc<RwLock<HashMap<PlayerId, Player>>>,
    /// Session the display is currently driving; `None` between games
    pub current_session: Arc<RwLock<Option<SessionId>>>,
    revealed_keys: Mutex<HashSet<RoundKey>>,
    advanced_keys: Mutex<HashSet<RoundKey>>,
    /// Serializes bingo claim settlement; holds outcomes by claim id
    claim_gate: Mutex<HashMap<String, ClaimOutcome>>,
    /// Broadcast channel for messages to all clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for messages to display clients only
    pub display_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(content: Arc<dyn ContentPool>, config: AppConfig) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let (display_tx, _display_rx) = broadcast::channel(100);
        Self {
            store: SessionStore::new(),
            content,
            config,
            players: Arc::new(RwLock::new(HashMap::new())),
            current_session: Arc::new(RwLock::new(None)),
            revealed_keys: Mutex::new(HashSet::new()),
            advanced_keys: Mutex::new(HashSet::new()),
            claim_gate: Mutex::new(HashMap::new()),
            broadcast: tx,
            display_broadcast: display_tx,
        }
    }

    /// Broadcast a message to all connected clients
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        let _ = self.broadcast.send(msg);
    }

    /// Broadcast a message to display clients only
    pub fn broadcast_to_display(&self, msg: ServerMessage) {
        let _ = self.display_broadcast.send(msg);
    }

    pub async fn current_session_id(&self) -> Option<SessionId> {
        self.current_session.read().await.clone()
    }

    pub async fn current_session(&self) -> Option<Session> {
        let id = self.current_session_id().await?;
        self.store.get_session(&id).await.ok()
    }

    /// Record a reveal for `key`; false if it was already claimed
    pub(crate) async fn claim_reveal(&self, key: RoundKey) -> bool {
        self.revealed_keys.lock().await.insert(key)
    }

    /// Undo a reveal claim whose transaction did not commit
    pub(crate) async fn release_reveal(&self, key: &RoundKey) {
        self.revealed_keys.lock().await.remove(key);
    }

    pub(crate) async fn claim_advance(&self, key: RoundKey) -> bool {
        self.advanced_keys.lock().await.insert(key)
    }

    pub(crate) async fn release_advance(&self, key: &RoundKey) {
        self.advanced_keys.lock().await.remove(key);
    }
}

/// Turn a guard rejection into "no change"
pub(crate) fn swallow_invalid<T>(result: SessionResult<T>) -> SessionResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SessionError::InvalidTransition { action, status }) => {
            tracing::debug!("Ignoring {} while {:?}", action, status);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::content::{
        BoardAnswer, BuzzerBoard, ContentItem, DrawingPrompt, PicturePrompt, PollQuestion,
        QuizQuestion, StaticContentPool,
    };

    /// Deterministic catalog with enough items for every game
    pub fn catalog() -> StaticContentPool {
        let mut items = Vec::new();
        for i in 0..4 {
            items.push(ContentItem::Quiz(QuizQuestion {
                id: format!("quiz-{}", i),
                question: format!("Question {}", i),
                choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 1,
            }));
            items.push(ContentItem::Picture(PicturePrompt {
                id: format!("pic-{}", i),
                image_url: format!("/img/{}.jpg", i),
                answer: "Eiffel Tower".into(),
                aliases: vec!["Tour Eiffel".into()],
            }));
            items.push(ContentItem::Poll(PollQuestion {
                id: format!("poll-{}", i),
                question: "Tea or coffee?".into(),
                option_a: "Tea".into(),
                option_b: "Coffee".into(),
            }));
            items.push(ContentItem::Drawing(DrawingPrompt {
                id: format!("draw-{}", i),
                answer: "Snowman".into(),
                aliases: vec!["Schneemann".into()],
            }));
            items.push(ContentItem::Board(BuzzerBoard {
                id: format!("board-{}", i),
                question: "Name something on a tree".into(),
                answers: vec![
                    BoardAnswer {
                        id: format!("board-{}-1", i),
                        text: "Baubles".into(),
                        aliases: vec!["ornaments".into()],
                        points: 10,
                    },
                    BoardAnswer {
                        id: format!("board-{}-2", i),
                        text: "Lights".into(),
                        aliases: vec![],
                        points: 15,
                    },
                    BoardAnswer {
                        id: format!("board-{}-3", i),
                        text: "Star".into(),
                        aliases: vec![],
                        points: 5,
                    },
                ],
            }));
        }
        match StaticContentPool::new(items) {
            Ok(pool) => pool,
            Err(e) => panic!("test catalog is invalid: {}", e),
        }
    }

    pub fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(catalog()), AppConfig::default()))
    }

    /// Join `count` ready players and return their ids in join order
    pub async fn ready_players(state: &AppState, count: usize) -> Vec<PlayerId> {
        let mut ids = Vec::new();
        for i in 0..count {
            let player = state.join_player(Some(format!("Player {}", i + 1))).await;
            state.set_ready(&player.id, true).await.unwrap();
            ids.push(player.id);
        }
        ids
    }
}
