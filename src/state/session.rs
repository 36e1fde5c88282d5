//! Session lifecycle: create, start round, reveal, advance, finish.
//!
//! Every transition is a read-check-write on the session document. A
//! transition requested from the wrong status commits nothing and the
//! operation returns `Ok(None)`.

use super::{swallow_invalid, AppState};
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Create a session, persist its selection manifest and make it current
    pub async fn create_session(
        &self,
        game: GameKind,
        round_count: usize,
        per_round_seconds: u32,
        bingo_mode: BingoMode,
    ) -> SessionResult<SessionId> {
        // Ball-draw has no content rounds
        let round_count = if game == GameKind::BallDraw {
            0
        } else {
            round_count
        };
        if game != GameKind::BallDraw {
            if round_count == 0 {
                return Err(SessionError::InvalidInput(
                    "round count must be at least 1".to_string(),
                ));
            }
            if per_round_seconds == 0 {
                return Err(SessionError::InvalidInput(
                    "rounds need at least one second".to_string(),
                ));
            }
        }

        let content_ids = if round_count > 0 {
            self.content.sample(game, round_count).await?
        } else {
            Vec::new()
        };

        let now = Utc::now();
        let session_id = ulid::Ulid::new().to_string();
        let active_player_uids = self.session_candidates().await;

        self.store
            .put_manifest_once(SelectionManifest {
                session_id: session_id.clone(),
                game,
                content_ids,
                created_at: now,
            })
            .await?;

        if game == GameKind::BallDraw {
            for uid in &active_player_uids {
                self.deal_card(&session_id, uid).await;
            }
        }

        let session = Session {
            id: session_id.clone(),
            game,
            status: game.initial_status(),
            version: 0,
            question_index: 0,
            per_round_seconds,
            active_player_uids,
            question_started_at: None,
            question_ends_at: None,
            reveal_started_at: None,
            reveal_data: None,
            created_at: now,
            state: GameState::for_game(game, bingo_mode),
        };
        let player_count = session.active_player_uids.len();
        self.store.insert_session(session).await;
        *self.current_session.write().await = Some(session_id.clone());

        tracing::info!(
            "Created {} session {} with {} rounds and {} players",
            game.as_str(),
            session_id,
            round_count,
            player_count
        );
        Ok(session_id)
    }

    /// Open round `index` for answers.
    ///
    /// Valid from intro and from a reveal; `index` may not go backwards.
    pub async fn start_round(
        &self,
        session_id: &str,
        index: usize,
        seconds: Option<u32>,
    ) -> SessionResult<Option<Session>> {
        let manifest = self.store.manifest(session_id).await?;
        let round_total = manifest.content_ids.len();
        let now = Utc::now();

        let result = self
            .store
            .update_session(session_id, |session| {
                let status = session.status;
                let from_intro = status == SessionStatus::Intro;
                let from_reveal =
                    matches!(status, SessionStatus::Reveal | SessionStatus::RoundReveal);
                if !(from_intro || from_reveal) || (session.game == GameKind::BallDraw && !from_intro)
                {
                    return Err(SessionError::InvalidTransition {
                        action: "start round",
                        status,
                    });
                }
                if index < session.question_index || (from_reveal && index == session.question_index)
                {
                    return Err(SessionError::InvalidTransition {
                        action: "restart an earlier round",
                        status,
                    });
                }
                if session.game != GameKind::BallDraw && index >= round_total {
                    return Err(SessionError::InvalidInput(format!(
                        "round {} is out of range ({} rounds)",
                        index, round_total
                    )));
                }

                let seconds = seconds.unwrap_or(session.per_round_seconds);
                session.question_index = index;
                session.question_started_at = Some(now);
                session.question_ends_at = match session.game {
                    GameKind::BallDraw => None,
                    _ => Some(now + chrono::Duration::seconds(i64::from(seconds))),
                };
                session.reveal_data = None;
                session.status = session.game.round_status();

                match session.game {
                    GameKind::DrawAndGuess => {
                        let active = session.active_player_uids.clone();
                        let drawing = session.drawing_mut()?;
                        let drawer = next_drawer(&active, index, drawing.drawer_uid.as_deref())
                            .ok_or_else(|| {
                                SessionError::InvalidInput("no active players to draw".to_string())
                            })?;
                        drawing.previous_drawer_uid = drawing.drawer_uid.take();
                        drawing.drawer_uid = Some(drawer);
                    }
                    GameKind::TeamBuzzer => {
                        let buzzer = session.buzzer_mut()?;
                        buzzer.strikes = 0;
                        buzzer.revealed_answer_ids.clear();
                        buzzer.active_team = Some(Team::for_round(index));
                    }
                    _ => {}
                }
                Ok(())
            })
            .await;

        if swallow_invalid(result)?.is_none() {
            return Ok(None);
        }

        let session = self.store.get_session(session_id).await?;
        if session.game == GameKind::DrawAndGuess {
            self.store.reset_drawing(session_id, index).await;
        }

        tracing::info!(
            "Session {} started round {} ({:?})",
            session_id,
            index,
            session.status
        );
        Ok(Some(session))
    }

    /// Close the answer window of round `index` and score it, at most once
    pub async fn reveal(&self, session_id: &str, index: usize) -> SessionResult<Option<Session>> {
        let session = self.store.get_session(session_id).await?;

        if !session.status.is_answer_window() || session.question_index != index {
            tracing::debug!(
                "Ignoring reveal of round {} for session {} while {:?} at round {}",
                index,
                session_id,
                session.status,
                session.question_index
            );
            return Ok(None);
        }

        match session.game {
            GameKind::Quiz | GameKind::PictureGuess | GameKind::PreferencePoll => {
                self.reveal_question_round(&session).await
            }
            GameKind::DrawAndGuess => self.reveal_drawing_timeout(&session).await,
            GameKind::TeamBuzzer => self.settle_buzzer_round(&session).await,
            // Bingo reveals only through validated claims
            GameKind::BallDraw => Ok(None),
        }
    }

    /// Manual "end now"; same path as the round timer
    pub async fn force_reveal(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let session = self.store.get_session(session_id).await?;
        tracing::info!("Force reveal for session {}", session_id);
        self.reveal(session_id, session.question_index).await
    }

    /// Leave the reveal of round `index`: next round, or finish after the last
    pub async fn advance(&self, session_id: &str, index: usize) -> SessionResult<Option<Session>> {
        let session = self.store.get_session(session_id).await?;
        if session.question_index != index || !session.status.is_reveal_class() {
            tracing::debug!(
                "Ignoring advance from round {} for session {} while {:?}",
                index,
                session_id,
                session.status
            );
            return Ok(None);
        }

        match session.game {
            GameKind::BallDraw => self.resume_or_finish_bingo(session_id).await,
            GameKind::TeamBuzzer => self.end_round(session_id, index).await,
            _ => self.next_round_or_finish(session_id, index).await,
        }
    }

    pub(crate) async fn next_round_or_finish(
        &self,
        session_id: &str,
        index: usize,
    ) -> SessionResult<Option<Session>> {
        let manifest = self.store.manifest(session_id).await?;
        if index + 1 >= manifest.content_ids.len() {
            self.finish(session_id).await
        } else {
            self.start_round(session_id, index + 1, None).await
        }
    }

    /// End the session; round fields are frozen afterwards
    pub async fn finish(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let result = self
            .store
            .update_session(session_id, |session| {
                if session.status == SessionStatus::Finished {
                    return Err(SessionError::InvalidTransition {
                        action: "finish",
                        status: session.status,
                    });
                }
                session.status = SessionStatus::Finished;
                session.question_ends_at = None;
                Ok(())
            })
            .await;

        if swallow_invalid(result)?.is_none() {
            return Ok(None);
        }

        tracing::info!("Session {} finished", session_id);
        Ok(Some(self.store.get_session(session_id).await?))
    }
}

/// Rotate through the active players, avoiding the previous drawer when possible
fn next_drawer(active: &[PlayerId], round_index: usize, previous: Option<&str>) -> Option<PlayerId> {
    if active.is_empty() {
        return None;
    }
    let mut pick = round_index % active.len();
    if active.len() > 1 && previous == Some(active[pick].as_str()) {
        pick = (pick + 1) % active.len();
    }
    Some(active[pick].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[test]
    fn test_next_drawer_rotation() {
        let active = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(next_drawer(&active, 0, None).unwrap(), "a");
        assert_eq!(next_drawer(&active, 1, Some("a")).unwrap(), "b");
        assert_eq!(next_drawer(&active, 4, None).unwrap(), "b");
    }

    #[test]
    fn test_next_drawer_skips_previous() {
        // Player "b" was pruned, so round 1 would land on "a" again
        let active = vec!["a".to_string(), "c".to_string()];
        assert_eq!(next_drawer(&active, 2, Some("a")).unwrap(), "c");

        let solo = vec!["a".to_string()];
        assert_eq!(next_drawer(&solo, 1, Some("a")).unwrap(), "a");
        assert!(next_drawer(&[], 0, None).is_none());
    }

    #[tokio::test]
    async fn test_create_session_snapshots_players() {
        let state = test_state();
        let uids = ready_players(&state, 3).await;
        // Not ready, so not included
        state.join_player(Some("Late".to_string())).await;

        let id = state
            .create_session(GameKind::Quiz, 3, 20, BingoMode::First)
            .await
            .unwrap();

        let session = state.store.get_session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Intro);
        assert_eq!(session.active_player_uids, uids);
        assert_eq!(state.store.manifest(&id).await.unwrap().content_ids.len(), 3);
        assert_eq!(state.current_session_id().await, Some(id));
    }

    #[tokio::test]
    async fn test_create_buzzer_session_starts_in_team_setup() {
        let state = test_state();
        let id = state
            .create_session(GameKind::TeamBuzzer, 2, 30, BingoMode::First)
            .await
            .unwrap();
        let session = state.store.get_session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::TeamSetup);
    }

    #[tokio::test]
    async fn test_create_session_insufficient_content() {
        let state = test_state();
        let result = state
            .create_session(GameKind::Quiz, 10, 20, BingoMode::First)
            .await;

        assert_eq!(
            result.unwrap_err(),
            SessionError::InsufficientContent {
                game: GameKind::Quiz,
                requested: 10,
                available: 4,
            }
        );
        assert!(state.current_session_id().await.is_none());
        assert!(state.store.session_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_session_rejects_zero_rounds() {
        let state = test_state();
        let result = state
            .create_session(GameKind::Quiz, 0, 20, BingoMode::First)
            .await;
        assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_start_round_sets_window() {
        let state = test_state();
        ready_players(&state, 2).await;
        let id = state
            .create_session(GameKind::Quiz, 2, 15, BingoMode::First)
            .await
            .unwrap();

        let session = state.start_round(&id, 0, None).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InGame);
        let started = session.question_started_at.unwrap();
        let ends = session.question_ends_at.unwrap();
        assert_eq!((ends - started).num_seconds(), 15);
        assert!(session.reveal_data.is_none());
    }

    #[tokio::test]
    async fn test_start_round_twice_is_noop() {
        let state = test_state();
        ready_players(&state, 2).await;
        let id = state
            .create_session(GameKind::Quiz, 2, 15, BingoMode::First)
            .await
            .unwrap();

        assert!(state.start_round(&id, 0, None).await.unwrap().is_some());
        let version = state.store.get_session(&id).await.unwrap().version;

        assert!(state.start_round(&id, 0, None).await.unwrap().is_none());
        assert_eq!(state.store.get_session(&id).await.unwrap().version, version);
    }

    #[tokio::test]
    async fn test_start_round_out_of_range() {
        let state = test_state();
        let id = state
            .create_session(GameKind::Quiz, 2, 15, BingoMode::First)
            .await
            .unwrap();
        let result = state.start_round(&id, 5, None).await;
        assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_operations_on_missing_session() {
        let state = test_state();
        assert!(matches!(
            state.start_round("ghost", 0, None).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            state.reveal("ghost", 0).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            state.finish("ghost").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reveal_from_intro_is_noop() {
        let state = test_state();
        let id = state
            .create_session(GameKind::Quiz, 2, 15, BingoMode::First)
            .await
            .unwrap();

        assert!(state.reveal(&id, 0).await.unwrap().is_none());
        let session = state.store.get_session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Intro);
        assert_eq!(session.version, 0);
    }

    #[tokio::test]
    async fn test_advance_walks_rounds_then_finishes() {
        let state = test_state();
        ready_players(&state, 1).await;
        let id = state
            .create_session(GameKind::PreferencePoll, 2, 15, BingoMode::First)
            .await
            .unwrap();

        state.start_round(&id, 0, None).await.unwrap();
        state.reveal(&id, 0).await.unwrap().unwrap();

        let session = state.advance(&id, 0).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InGame);
        assert_eq!(session.question_index, 1);

        // Stale advance for the old round does nothing
        assert!(state.advance(&id, 0).await.unwrap().is_none());

        state.reveal(&id, 1).await.unwrap().unwrap();
        let session = state.advance(&id, 1).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
        assert!(session.reveal_data.is_none());
    }

    #[tokio::test]
    async fn test_finish_twice_is_noop() {
        let state = test_state();
        let id = state
            .create_session(GameKind::Quiz, 1, 15, BingoMode::First)
            .await
            .unwrap();

        assert!(state.finish(&id).await.unwrap().is_some());
        assert!(state.finish(&id).await.unwrap().is_none());
        assert!(state.start_round(&id, 0, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drawer_rotates_between_rounds() {
        let state = test_state();
        let uids = ready_players(&state, 3).await;
        let id = state
            .create_session(GameKind::DrawAndGuess, 3, 60, BingoMode::First)
            .await
            .unwrap();

        let first = state.start_round(&id, 0, None).await.unwrap().unwrap();
        assert_eq!(first.drawing().unwrap().drawer_uid.as_deref(), Some(uids[0].as_str()));

        state.force_reveal(&id).await.unwrap().unwrap();
        let second = state.advance(&id, 0).await.unwrap().unwrap();
        let drawing = second.drawing().unwrap();
        assert_eq!(drawing.drawer_uid.as_deref(), Some(uids[1].as_str()));
        assert_eq!(drawing.previous_drawer_uid.as_deref(), Some(uids[0].as_str()));
    }
}
