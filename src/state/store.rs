//! In-memory document store for sessions and their sub-records.
//!
//! Each collection sits behind its own lock. Session documents are only
//! mutated through [`SessionStore::update_session`], which runs a closure
//! against a draft copy and commits it (bumping `version`) only when the
//! closure succeeds. Every commit is published on the change stream.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::{SessionError, SessionResult};
use crate::types::*;

/// Change notification pushed to subscribers after a committed write
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Session(Box<Session>),
    Scores { session_id: SessionId },
    Drawing(LiveDrawing),
}

pub struct SessionStore {
    pub(super) sessions: RwLock<HashMap<SessionId, Session>>,
    pub(super) manifests: RwLock<HashMap<SessionId, SelectionManifest>>,
    pub(super) answers: RwLock<HashMap<SessionId, HashMap<(PlayerId, usize), Answer>>>,
    pub(super) scores: RwLock<HashMap<SessionId, HashMap<PlayerId, ScoreEntry>>>,
    /// `session:award:uid` keys of increments already applied
    pub(super) applied_awards: RwLock<HashSet<String>>,
    pub(super) drawings: RwLock<HashMap<SessionId, LiveDrawing>>,
    pub(super) guesses: RwLock<HashMap<SessionId, Vec<Guess>>>,
    /// `(round_index, guess_id)` pairs already handled, per session
    pub(super) processed_guess_ids: RwLock<HashMap<SessionId, HashSet<(usize, GuessId)>>>,
    pub(super) cards: RwLock<HashMap<SessionId, HashMap<PlayerId, BingoCard>>>,
    pub(super) claims: Mutex<HashMap<SessionId, VecDeque<PendingClaim>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(HashMap::new()),
            manifests: RwLock::new(HashMap::new()),
            answers: RwLock::new(HashMap::new()),
            scores: RwLock::new(HashMap::new()),
            applied_awards: RwLock::new(HashSet::new()),
            drawings: RwLock::new(HashMap::new()),
            guesses: RwLock::new(HashMap::new()),
            processed_guess_ids: RwLock::new(HashMap::new()),
            cards: RwLock::new(HashMap::new()),
            claims: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // Sessions

    pub async fn insert_session(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        self.publish(StoreEvent::Session(Box::new(session)));
    }

    pub async fn get_session(&self, id: &str) -> SessionResult<Session> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::session_not_found(id))
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Read-check-write on one session document.
    ///
    /// The closure works on a draft; nothing is committed if it returns
    /// `Err`. Reveal payloads are dropped on commit whenever the resulting
    /// status is not a reveal-class status.
    pub async fn update_session<T, F>(&self, id: &str, apply: F) -> SessionResult<T>
    where
        F: FnOnce(&mut Session) -> SessionResult<T>,
    {
        let committed = {
            let mut sessions = self.sessions.write().await;
            let current = sessions
                .get(id)
                .ok_or_else(|| SessionError::session_not_found(id))?;

            let mut draft = current.clone();
            let out = apply(&mut draft)?;

            if !draft.game.allows(draft.status) {
                return Err(SessionError::InvalidTransition {
                    action: "commit",
                    status: draft.status,
                });
            }
            if !draft.status.is_reveal_class() {
                draft.reveal_data = None;
                draft.reveal_started_at = None;
            }
            draft.version += 1;
            sessions.insert(id.to_string(), draft.clone());
            (draft, out)
        };

        let (session, out) = committed;
        self.publish(StoreEvent::Session(Box::new(session)));
        Ok(out)
    }

    // Selection manifests

    /// Persist the manifest for a session; a second write is rejected
    pub async fn put_manifest_once(&self, manifest: SelectionManifest) -> SessionResult<()> {
        let mut manifests = self.manifests.write().await;
        if manifests.contains_key(&manifest.session_id) {
            return Err(SessionError::InvalidInput(format!(
                "manifest for session {} already exists",
                manifest.session_id
            )));
        }
        manifests.insert(manifest.session_id.clone(), manifest);
        Ok(())
    }

    pub async fn manifest(&self, session_id: &str) -> SessionResult<SelectionManifest> {
        self.manifests
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("manifest for session {}", session_id)))
    }

    // Answers

    /// Write an answer, replacing any earlier answer for the same question
    pub async fn upsert_answer(&self, session_id: &str, answer: Answer) {
        self.answers
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert((answer.uid.clone(), answer.question_index), answer);
    }

    /// Write an answer only if none exists yet; returns whether it was written
    pub async fn insert_answer_if_absent(&self, session_id: &str, answer: Answer) -> bool {
        let mut answers = self.answers.write().await;
        let by_key = answers.entry(session_id.to_string()).or_default();
        let key = (answer.uid.clone(), answer.question_index);
        if by_key.contains_key(&key) {
            return false;
        }
        by_key.insert(key, answer);
        true
    }

    /// All answers for one question, oldest first
    pub async fn answers_for(&self, session_id: &str, question_index: usize) -> Vec<Answer> {
        let answers = self.answers.read().await;
        let mut found: Vec<Answer> = answers
            .get(session_id)
            .map(|by_key| {
                by_key
                    .values()
                    .filter(|a| a.question_index == question_index)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.uid.cmp(&b.uid))
        });
        found
    }

    // Score ledger

    /// Add `delta` to a player's score at most once per `award_key`.
    /// Returns false when this award was already applied.
    pub async fn increment_score(
        &self,
        session_id: &str,
        uid: &str,
        delta: u32,
        award_key: &str,
    ) -> bool {
        let marker = format!("{}:{}:{}", session_id, award_key, uid);
        {
            let mut applied = self.applied_awards.write().await;
            if !applied.insert(marker) {
                return false;
            }

            let now = Utc::now();
            let mut scores = self.scores.write().await;
            let entry = scores
                .entry(session_id.to_string())
                .or_default()
                .entry(uid.to_string())
                .or_insert_with(|| ScoreEntry {
                    uid: uid.to_string(),
                    score: 0,
                    updated_at: now,
                });
            entry.score += delta;
            entry.updated_at = now;
        }

        self.publish(StoreEvent::Scores {
            session_id: session_id.to_string(),
        });
        true
    }

    /// Score entries ordered by score, highest first
    pub async fn leaderboard(&self, session_id: &str) -> Vec<ScoreEntry> {
        let scores = self.scores.read().await;
        let mut entries: Vec<ScoreEntry> = scores
            .get(session_id)
            .map(|by_uid| by_uid.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.uid.cmp(&b.uid)));
        entries
    }

    pub async fn score_of(&self, session_id: &str, uid: &str) -> u32 {
        self.scores
            .read()
            .await
            .get(session_id)
            .and_then(|by_uid| by_uid.get(uid))
            .map(|entry| entry.score)
            .unwrap_or(0)
    }

    // Live drawing

    /// Start an empty canvas for a new round
    pub async fn reset_drawing(&self, session_id: &str, round_index: usize) {
        let drawing = LiveDrawing {
            session_id: session_id.to_string(),
            round_index,
            seq: 0,
            strokes: Vec::new(),
        };
        self.drawings
            .write()
            .await
            .insert(session_id.to_string(), drawing.clone());
        self.publish(StoreEvent::Drawing(drawing));
    }

    /// Replace the snapshot if `drawing.seq` is newer than the stored one
    pub async fn replace_drawing(&self, mut drawing: LiveDrawing) -> bool {
        if drawing.strokes.len() > MAX_LIVE_STROKES {
            let excess = drawing.strokes.len() - MAX_LIVE_STROKES;
            drawing.strokes.drain(..excess);
        }

        {
            let mut drawings = self.drawings.write().await;
            if let Some(current) = drawings.get(&drawing.session_id) {
                if current.round_index == drawing.round_index && drawing.seq <= current.seq {
                    return false;
                }
            }
            drawings.insert(drawing.session_id.clone(), drawing.clone());
        }

        self.publish(StoreEvent::Drawing(drawing));
        true
    }

    pub async fn drawing(&self, session_id: &str) -> Option<LiveDrawing> {
        self.drawings.read().await.get(session_id).cloned()
    }

    // Guesses

    /// Mark a guess id as processed for one round; false if it was already seen
    pub async fn mark_guess_processed(
        &self,
        session_id: &str,
        round_index: usize,
        guess_id: &str,
    ) -> bool {
        self.processed_guess_ids
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert((round_index, guess_id.to_string()))
    }

    pub async fn record_guess(&self, session_id: &str, guess: Guess) {
        self.guesses
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(guess);
    }

    pub async fn guesses_for(&self, session_id: &str, round_index: usize) -> Vec<Guess> {
        self.guesses
            .read()
            .await
            .get(session_id)
            .map(|all| {
                all.iter()
                    .filter(|g| g.round_index == round_index)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // Bingo cards and claims

    pub async fn put_card(&self, session_id: &str, card: BingoCard) {
        self.cards
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(card.uid.clone(), card);
    }

    pub async fn card(&self, session_id: &str, uid: &str) -> Option<BingoCard> {
        self.cards
            .read()
            .await
            .get(session_id)
            .and_then(|by_uid| by_uid.get(uid))
            .cloned()
    }

    pub async fn push_claim(&self, session_id: &str, claim: PendingClaim) {
        self.claims
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push_back(claim);
    }

    pub async fn pop_claim(&self, session_id: &str) -> Option<PendingClaim> {
        self.claims
            .lock()
            .await
            .get_mut(session_id)
            .and_then(|queue| queue.pop_front())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, game: GameKind) -> Session {
        Session {
            id: id.to_string(),
            game,
            status: game.initial_status(),
            version: 0,
            question_index: 0,
            per_round_seconds: 20,
            active_player_uids: vec!["p1".to_string()],
            question_started_at: None,
            question_ends_at: None,
            reveal_started_at: None,
            reveal_data: None,
            created_at: Utc::now(),
            state: GameState::for_game(game, BingoMode::First),
        }
    }

    fn answer(uid: &str, index: usize, value: Option<AnswerValue>, skipped: bool) -> Answer {
        Answer {
            uid: uid.to_string(),
            question_index: index,
            answer: value,
            skipped,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_commits_and_bumps_version() {
        let store = SessionStore::new();
        store.insert_session(session("s1", GameKind::Quiz)).await;

        store
            .update_session("s1", |s| {
                s.status = SessionStatus::InGame;
                Ok(())
            })
            .await
            .unwrap();

        let s = store.get_session("s1").await.unwrap();
        assert_eq!(s.status, SessionStatus::InGame);
        assert_eq!(s.version, 1);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document_untouched() {
        let store = SessionStore::new();
        store.insert_session(session("s1", GameKind::Quiz)).await;

        let result: SessionResult<()> = store
            .update_session("s1", |s| {
                s.question_index = 7;
                Err(SessionError::Forbidden("nope".into()))
            })
            .await;
        assert!(result.is_err());

        let s = store.get_session("s1").await.unwrap();
        assert_eq!(s.question_index, 0);
        assert_eq!(s.version, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_status_foreign_to_game() {
        let store = SessionStore::new();
        store.insert_session(session("s1", GameKind::Quiz)).await;

        let result = store
            .update_session("s1", |s| {
                s.status = SessionStatus::Steal;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_reveal_data_dropped_outside_reveal() {
        let store = SessionStore::new();
        store.insert_session(session("s1", GameKind::PreferencePoll)).await;

        store
            .update_session("s1", |s| {
                s.status = SessionStatus::InGame;
                s.reveal_data = Some(RevealData::Poll {
                    votes_a: 0,
                    votes_b: 0,
                    percent_a: 0,
                    percent_b: 0,
                    commentary: PollCommentary::Mixed,
                });
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.get_session("s1").await.unwrap().reveal_data.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_session() {
        let store = SessionStore::new();
        let result = store.update_session("ghost", |_| Ok(())).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_publishes_event() {
        let store = SessionStore::new();
        store.insert_session(session("s1", GameKind::Quiz)).await;
        let mut rx = store.subscribe();

        store
            .update_session("s1", |s| {
                s.status = SessionStatus::InGame;
                Ok(())
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StoreEvent::Session(s) => assert_eq!(s.version, 1),
            other => panic!("Expected session event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manifest_written_once() {
        let store = SessionStore::new();
        let manifest = SelectionManifest {
            session_id: "s1".to_string(),
            game: GameKind::Quiz,
            content_ids: vec!["q1".to_string()],
            created_at: Utc::now(),
        };

        assert!(store.put_manifest_once(manifest.clone()).await.is_ok());
        assert!(store.put_manifest_once(manifest).await.is_err());
        assert_eq!(store.manifest("s1").await.unwrap().content_ids, vec!["q1"]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_but_backfill_does_not() {
        let store = SessionStore::new();
        store
            .upsert_answer("s1", answer("p1", 0, Some(AnswerValue::Choice(1)), false))
            .await;
        store
            .upsert_answer("s1", answer("p1", 0, Some(AnswerValue::Choice(2)), false))
            .await;

        let written = store
            .insert_answer_if_absent("s1", answer("p1", 0, None, true))
            .await;
        assert!(!written);

        let answers = store.answers_for("s1", 0).await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, Some(AnswerValue::Choice(2)));
        assert!(!answers[0].skipped);
    }

    #[tokio::test]
    async fn test_increment_is_idempotent_per_award() {
        let store = SessionStore::new();

        assert!(store.increment_score("s1", "p1", 10, "quiz:0").await);
        assert!(!store.increment_score("s1", "p1", 10, "quiz:0").await);
        assert!(store.increment_score("s1", "p1", 10, "quiz:1").await);

        assert_eq!(store.score_of("s1", "p1").await, 20);
    }

    #[tokio::test]
    async fn test_leaderboard_order() {
        let store = SessionStore::new();
        store.increment_score("s1", "p1", 10, "a").await;
        store.increment_score("s1", "p2", 25, "a").await;
        store.increment_score("s1", "p3", 15, "a").await;

        let board: Vec<String> = store
            .leaderboard("s1")
            .await
            .into_iter()
            .map(|e| e.uid)
            .collect();
        assert_eq!(board, vec!["p2", "p3", "p1"]);
    }

    #[tokio::test]
    async fn test_drawing_requires_newer_seq() {
        let store = SessionStore::new();
        store.reset_drawing("s1", 0).await;

        let mut drawing = LiveDrawing {
            session_id: "s1".to_string(),
            round_index: 0,
            seq: 2,
            strokes: Vec::new(),
        };
        assert!(store.replace_drawing(drawing.clone()).await);

        drawing.seq = 1;
        assert!(!store.replace_drawing(drawing).await);
        assert_eq!(store.drawing("s1").await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_drawing_keeps_latest_strokes() {
        let store = SessionStore::new();
        let strokes: Vec<Stroke> = (0..MAX_LIVE_STROKES + 10)
            .map(|i| Stroke {
                x0: 0.0,
                y0: 0.0,
                x1: i as f32,
                y1: 0.0,
                width: 1.0,
                color: "#000".to_string(),
            })
            .collect();

        store
            .replace_drawing(LiveDrawing {
                session_id: "s1".to_string(),
                round_index: 0,
                seq: 1,
                strokes,
            })
            .await;

        let stored = store.drawing("s1").await.unwrap();
        assert_eq!(stored.strokes.len(), MAX_LIVE_STROKES);
        assert_eq!(stored.strokes[0].x1, 10.0);
    }

    #[tokio::test]
    async fn test_claims_are_fifo() {
        let store = SessionStore::new();
        for (id, uid) in [("c1", "p1"), ("c2", "p2")] {
            store
                .push_claim(
                    "s1",
                    PendingClaim {
                        id: id.to_string(),
                        uid: uid.to_string(),
                        requested_at: Utc::now(),
                    },
                )
                .await;
        }

        assert_eq!(store.pop_claim("s1").await.unwrap().uid, "p1");
        assert_eq!(store.pop_claim("s1").await.unwrap().uid, "p2");
        assert!(store.pop_claim("s1").await.is_none());
    }
}
