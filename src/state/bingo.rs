use super::{swallow_invalid, AppState};
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use chrono::Utc;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawnBall {
    pub ball: u8,
    pub drawn_balls: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Accepted { placement: usize },
    Rejected { reason: String },
}

/// Five distinct numbers per column, column `c` drawing from `15c+1..=15c+15`
fn generate_card(uid: &str) -> BingoCard {
    let mut rng = rand::rng();
    let mut cells = [[0u8; 5]; 5];
    for col in 0..5 {
        let picked = index::sample(&mut rng, 15, 5);
        for (row, offset) in picked.into_iter().enumerate() {
            cells[row][col] = (col * 15 + offset + 1) as u8;
        }
    }
    cells[2][2] = 0;
    BingoCard {
        uid: uid.to_string(),
        cells,
    }
}

/// Any full row, column or diagonal; the centre square is free
pub fn has_bingo(card: &BingoCard, drawn: &[u8]) -> bool {
    let marked = |row: usize, col: usize| {
        let cell = card.cells[row][col];
        cell == 0 || drawn.contains(&cell)
    };

    let any_row = (0..5).any(|r| (0..5).all(|c| marked(r, c)));
    let any_col = (0..5).any(|c| (0..5).all(|r| marked(r, c)));
    let diagonal = (0..5).all(|i| marked(i, i));
    let anti_diagonal = (0..5).all(|i| marked(i, 4 - i));

    any_row || any_col || diagonal || anti_diagonal
}

impl AppState {
    /// Draw a ball not drawn before in this session
    pub async fn draw_ball(&self, session_id: &str) -> SessionResult<Option<DrawnBall>> {
        let result = self
            .store
            .update_session(session_id, |s| {
                if s.status != SessionStatus::InGame {
                    return Err(SessionError::InvalidTransition {
                        action: "draw ball",
                        status: s.status,
                    });
                }
                let bingo = s.bingo_mut()?;
                let remaining: Vec<u8> = (1..=BALL_COUNT)
                    .filter(|b| !bingo.drawn_balls.contains(b))
                    .collect();
                if remaining.is_empty() {
                    return Err(SessionError::Exhausted);
                }

                let ball = remaining[rand::rng().random_range(0..remaining.len())];
                bingo.drawn_balls.push(ball);
                Ok(DrawnBall {
                    ball,
                    drawn_balls: bingo.drawn_balls.clone(),
                })
            })
            .await;

        let drawn = swallow_invalid(result)?;
        if let Some(drawn) = &drawn {
            tracing::debug!(
                "Drew ball {} for session {} ({} drawn)",
                drawn.ball,
                session_id,
                drawn.drawn_balls.len()
            );
        }
        Ok(drawn)
    }

    /// Deal and store a fresh card
    pub(crate) async fn deal_card(&self, session_id: &str, uid: &str) -> BingoCard {
        let card = generate_card(uid);
        self.store.put_card(session_id, card.clone()).await;
        card
    }

    /// The player's card, dealt on first request for late joiners
    pub async fn card_for(&self, session_id: &str, uid: &str) -> SessionResult<BingoCard> {
        self.store.get_session(session_id).await?.bingo()?;
        match self.store.card(session_id, uid).await {
            Some(card) => Ok(card),
            None => Ok(self.deal_card(session_id, uid).await),
        }
    }

    /// Queue a bingo claim and settle the queue one claim at a time.
    ///
    /// Every caller pushes before taking the gate, so whoever holds the gate
    /// drains claims in arrival order and placements follow that order.
    pub async fn claim_bingo(&self, session_id: &str, uid: &str) -> SessionResult<ClaimOutcome> {
        self.store.get_session(session_id).await?.bingo()?;
        self.touch_player(uid).await;

        let claim_id = ulid::Ulid::new().to_string();
        self.store
            .push_claim(
                session_id,
                PendingClaim {
                    id: claim_id.clone(),
                    uid: uid.to_string(),
                    requested_at: Utc::now(),
                },
            )
            .await;

        let mut gate = self.claim_gate.lock().await;
        while let Some(claim) = self.store.pop_claim(session_id).await {
            let outcome = self.settle_claim(session_id, &claim).await;
            gate.insert(claim.id, outcome);
        }

        gate.remove(&claim_id).ok_or_else(|| {
            SessionError::NotFound(format!("claim {} in session {}", claim_id, session_id))
        })
    }

    async fn settle_claim(&self, session_id: &str, claim: &PendingClaim) -> ClaimOutcome {
        let card = match self.card_for(session_id, &claim.uid).await {
            Ok(card) => card,
            Err(e) => {
                return ClaimOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };
        let uid = claim.uid.clone();
        let now = Utc::now();

        let result = self
            .store
            .update_session(session_id, |s| {
                if !matches!(s.status, SessionStatus::InGame | SessionStatus::Claiming) {
                    return Err(SessionError::Forbidden("no game in progress".to_string()));
                }
                let bingo = s.bingo_mut()?;
                if bingo.bingo_winners.contains(&uid) {
                    return Err(SessionError::Forbidden("already a winner".to_string()));
                }
                if bingo.bingo_winners.len() >= bingo.bingo_mode.capacity() {
                    return Err(SessionError::Forbidden("all places are taken".to_string()));
                }
                if !has_bingo(&card, &bingo.drawn_balls) {
                    return Err(SessionError::Forbidden("no complete line".to_string()));
                }

                bingo.bingo_winners.push(uid.clone());
                let placement = bingo.bingo_winners.len();
                let winners = bingo.bingo_winners.clone();
                s.enter_reveal(
                    RevealData::Bingo {
                        winner_uid: uid.clone(),
                        placement,
                        winners,
                    },
                    now,
                );
                Ok(placement)
            })
            .await;

        match result {
            Ok(placement) => {
                tracing::info!(
                    "Bingo for {} in session {} (place {})",
                    claim.uid,
                    session_id,
                    placement
                );
                ClaimOutcome::Accepted { placement }
            }
            Err(e) => {
                tracing::debug!("Rejected bingo claim from {}: {}", claim.uid, e);
                ClaimOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// After a first-winner reveal, keep playing for up to three winners
    pub async fn continue_bingo(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let result = self
            .store
            .update_session(session_id, |s| {
                let status = s.status;
                let bingo = s.bingo_mut()?;
                if status != SessionStatus::Claiming || bingo.bingo_mode != BingoMode::First {
                    return Err(SessionError::InvalidTransition {
                        action: "continue bingo",
                        status,
                    });
                }
                bingo.bingo_mode = BingoMode::Top3;
                s.status = SessionStatus::InGame;
                Ok(())
            })
            .await;

        if swallow_invalid(result)?.is_none() {
            return Ok(None);
        }
        tracing::info!("Session {} continues to three winners", session_id);
        Ok(Some(self.store.get_session(session_id).await?))
    }

    /// Leave a winner reveal: finish once every place is taken, otherwise draw on
    pub(crate) async fn resume_or_finish_bingo(
        &self,
        session_id: &str,
    ) -> SessionResult<Option<Session>> {
        let session = self.store.get_session(session_id).await?;
        let bingo = session.bingo()?;
        if session.status != SessionStatus::Claiming {
            return Ok(None);
        }
        if bingo.bingo_winners.len() >= bingo.bingo_mode.capacity() {
            return self.finish(session_id).await;
        }

        let result = self
            .store
            .update_session(session_id, |s| {
                if s.status != SessionStatus::Claiming {
                    return Err(SessionError::InvalidTransition {
                        action: "resume drawing",
                        status: s.status,
                    });
                }
                s.status = SessionStatus::InGame;
                Ok(())
            })
            .await;

        if swallow_invalid(result)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.store.get_session(session_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::collections::HashSet;

    async fn bingo_game(
        state: &AppState,
        players: usize,
        mode: BingoMode,
    ) -> (SessionId, Vec<PlayerId>) {
        let uids = ready_players(state, players).await;
        let id = state
            .create_session(GameKind::BallDraw, 0, 20, mode)
            .await
            .unwrap();
        state.start_round(&id, 0, None).await.unwrap().unwrap();
        (id, uids)
    }

    /// Pretend exactly `balls` have been drawn
    async fn set_drawn(state: &AppState, id: &str, balls: Vec<u8>) {
        state
            .store
            .update_session(id, |s| {
                s.bingo_mut()?.drawn_balls = balls;
                Ok(())
            })
            .await
            .unwrap();
    }

    fn top_row(card: &BingoCard) -> Vec<u8> {
        card.cells[0].to_vec()
    }

    #[test]
    fn test_card_layout() {
        let card = generate_card("p1");
        assert_eq!(card.cells[2][2], 0);
        for col in 0..5 {
            let low = (col * 15 + 1) as u8;
            let high = (col * 15 + 15) as u8;
            let values: HashSet<u8> = (0..5)
                .filter(|&row| !(row == 2 && col == 2))
                .map(|row| card.cells[row][col])
                .collect();
            assert_eq!(values.len(), if col == 2 { 4 } else { 5 });
            assert!(values.iter().all(|v| (low..=high).contains(v)));
        }
    }

    #[test]
    fn test_has_bingo_patterns() {
        let card = generate_card("p1");
        assert!(!has_bingo(&card, &[]));

        let middle_row: Vec<u8> = card.cells[2].to_vec();
        assert!(has_bingo(&card, &middle_row));

        let diagonal: Vec<u8> = (0..5).map(|i| card.cells[i][i]).collect();
        assert!(has_bingo(&card, &diagonal));

        let column: Vec<u8> = (0..5).map(|r| card.cells[r][4]).collect();
        assert!(has_bingo(&card, &column));

        let almost: Vec<u8> = card.cells[0][..4].to_vec();
        assert!(!has_bingo(&card, &almost));
    }

    #[tokio::test]
    async fn test_draws_every_ball_once_then_exhausts() {
        let state = test_state();
        let (id, _) = bingo_game(&state, 1, BingoMode::First).await;

        let mut seen = HashSet::new();
        for _ in 0..BALL_COUNT {
            let drawn = state.draw_ball(&id).await.unwrap().unwrap();
            assert!((1..=BALL_COUNT).contains(&drawn.ball));
            assert!(seen.insert(drawn.ball));
        }
        assert_eq!(seen.len(), 75);

        let result = state.draw_ball(&id).await;
        assert_eq!(result, Err(SessionError::Exhausted));
    }

    #[tokio::test]
    async fn test_draw_before_start_is_noop() {
        let state = test_state();
        ready_players(&state, 1).await;
        let id = state
            .create_session(GameKind::BallDraw, 0, 20, BingoMode::First)
            .await
            .unwrap();
        assert!(state.draw_ball(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_valid_claim_enters_claiming() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 2, BingoMode::First).await;
        let card = state.card_for(&id, &uids[0]).await.unwrap();
        set_drawn(&state, &id, top_row(&card)).await;

        let outcome = state.claim_bingo(&id, &uids[0]).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Accepted { placement: 1 });

        let session = state.store.get_session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Claiming);
        assert_eq!(session.bingo().unwrap().bingo_winners, vec![uids[0].clone()]);
        assert!(matches!(
            session.reveal_data,
            Some(RevealData::Bingo { placement: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_claim_without_line_rejected() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 1, BingoMode::First).await;

        let outcome = state.claim_bingo(&id, &uids[0]).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Rejected { .. }));
        let session = state.store.get_session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::InGame);
    }

    #[tokio::test]
    async fn test_repeat_claim_from_winner_rejected() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 1, BingoMode::Top3).await;
        let card = state.card_for(&id, &uids[0]).await.unwrap();
        set_drawn(&state, &id, top_row(&card)).await;

        state.claim_bingo(&id, &uids[0]).await.unwrap();
        let again = state.claim_bingo(&id, &uids[0]).await.unwrap();
        assert!(matches!(again, ClaimOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_claims_get_distinct_placements() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 2, BingoMode::Top3).await;
        let first = state.card_for(&id, &uids[0]).await.unwrap();
        let second = state.card_for(&id, &uids[1]).await.unwrap();
        let mut drawn = top_row(&first);
        let extra: Vec<u8> = top_row(&second)
            .into_iter()
            .filter(|b| !drawn.contains(b))
            .collect();
        drawn.extend(extra);
        set_drawn(&state, &id, drawn).await;

        let (a, b) = tokio::join!(
            state.claim_bingo(&id, &uids[0]),
            state.claim_bingo(&id, &uids[1]),
        );
        let mut placements: Vec<usize> = [a.unwrap(), b.unwrap()]
            .into_iter()
            .map(|o| match o {
                ClaimOutcome::Accepted { placement } => placement,
                other => panic!("Expected acceptance, got {:?}", other),
            })
            .collect();
        placements.sort();
        assert_eq!(placements, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_first_mode_finishes_or_continues() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 2, BingoMode::First).await;
        let card = state.card_for(&id, &uids[0]).await.unwrap();
        set_drawn(&state, &id, top_row(&card)).await;
        state.claim_bingo(&id, &uids[0]).await.unwrap();

        let session = state.continue_bingo(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InGame);
        assert_eq!(session.bingo().unwrap().bingo_mode, BingoMode::Top3);
        assert!(session.reveal_data.is_none());

        // Only once
        assert!(state.continue_bingo(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_advance_in_first_mode_finishes() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 1, BingoMode::First).await;
        let card = state.card_for(&id, &uids[0]).await.unwrap();
        set_drawn(&state, &id, top_row(&card)).await;
        state.claim_bingo(&id, &uids[0]).await.unwrap();

        let session = state.advance(&id, 0).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
    }

    #[tokio::test]
    async fn test_top3_resumes_until_three_winners() {
        let state = test_state();
        let (id, uids) = bingo_game(&state, 3, BingoMode::Top3).await;
        let mut drawn = Vec::new();
        for uid in &uids {
            let card = state.card_for(&id, uid).await.unwrap();
            let extra: Vec<u8> = top_row(&card)
                .into_iter()
                .filter(|b| !drawn.contains(b))
                .collect();
            drawn.extend(extra);
        }
        set_drawn(&state, &id, drawn).await;

        for (i, uid) in uids.iter().enumerate() {
            let outcome = state.claim_bingo(&id, uid).await.unwrap();
            assert_eq!(outcome, ClaimOutcome::Accepted { placement: i + 1 });
            let session = state.advance(&id, 0).await.unwrap().unwrap();
            let expected = if i < 2 {
                SessionStatus::InGame
            } else {
                SessionStatus::Finished
            };
            assert_eq!(session.status, expected);
        }
    }

    #[tokio::test]
    async fn test_late_player_gets_card_on_demand() {
        let state = test_state();
        let (id, _) = bingo_game(&state, 1, BingoMode::First).await;
        let late = state.join_player(None).await;

        assert!(state.store.card(&id, &late.id).await.is_none());
        let card = state.card_for(&id, &late.id).await.unwrap();
        assert_eq!(state.card_for(&id, &late.id).await.unwrap(), card);
    }
}
