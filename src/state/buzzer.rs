//! Team buzzer: two teams answer against a board of weighted answers.
//!
//! Points found during a round form a pot that is only added to a team's
//! score when the round resolves. Three misses hand the other team a single
//! steal attempt for the whole pot.

use super::{swallow_invalid, AppState};
use crate::content::{BoardAnswer, BuzzerBoard, ContentItem};
use crate::error::{SessionError, SessionResult};
use crate::fuzzy;
use crate::types::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Misses before the other team may steal
pub const MAX_STRIKES: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TeamAnswerOutcome {
    Revealed {
        answer_id: AnswerId,
        text: String,
        points: u32,
        round_complete: bool,
    },
    Strike {
        strikes: u8,
        steal: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StealOutcome {
    pub success: bool,
    pub awarded_team: Team,
    pub points: u32,
}

fn board_matches(answer: &BoardAnswer, text: &str) -> bool {
    fuzzy::matches_any(
        text,
        std::iter::once(answer.text.as_str()).chain(answer.aliases.iter().map(String::as_str)),
    )
}

/// First unrevealed board answer matching `text`, in board order
fn find_unrevealed<'a>(
    board: &'a BuzzerBoard,
    revealed: &[AnswerId],
    text: &str,
) -> Option<&'a BoardAnswer> {
    board
        .answers
        .iter()
        .filter(|a| !revealed.contains(&a.id))
        .find(|a| board_matches(a, text))
}

/// Sum of points of the revealed answers
fn round_pot(board: &BuzzerBoard, revealed: &[AnswerId]) -> u32 {
    board
        .answers
        .iter()
        .filter(|a| revealed.contains(&a.id))
        .map(|a| a.points)
        .sum()
}

fn resolve_round(
    session: &mut Session,
    board: &BuzzerBoard,
    awarded_team: Team,
    stolen: bool,
    now: chrono::DateTime<Utc>,
) -> SessionResult<u32> {
    let buzzer = session.buzzer_mut()?;
    let points = round_pot(board, &buzzer.revealed_answer_ids);
    buzzer.team_scores.add(awarded_team, points);
    session.enter_reveal(
        RevealData::Buzzer {
            awarded_team,
            points,
            stolen,
            board: board.answers.clone(),
        },
        now,
    );
    Ok(points)
}

impl AppState {
    /// Assign players to teams and leave team setup
    pub async fn set_teams(
        &self,
        session_id: &str,
        mapping: HashMap<PlayerId, Team>,
    ) -> SessionResult<Option<Session>> {
        let has_a = mapping.values().any(|t| *t == Team::A);
        let has_b = mapping.values().any(|t| *t == Team::B);
        if !(has_a && has_b) {
            return Err(SessionError::InvalidInput(
                "both teams need at least one player".to_string(),
            ));
        }

        let result = self
            .store
            .update_session(session_id, |session| {
                if session.status != SessionStatus::TeamSetup {
                    return Err(SessionError::InvalidTransition {
                        action: "set teams",
                        status: session.status,
                    });
                }
                session.buzzer_mut()?.team_mapping = mapping;
                session.status = SessionStatus::Intro;
                Ok(())
            })
            .await;

        if swallow_invalid(result)?.is_none() {
            return Ok(None);
        }
        tracing::info!("Teams set for session {}", session_id);
        Ok(Some(self.store.get_session(session_id).await?))
    }

    /// An active-team player answers during the round
    pub async fn submit_team_answer(
        &self,
        session_id: &str,
        uid: &str,
        text: &str,
    ) -> SessionResult<TeamAnswerOutcome> {
        let session = self.store.get_session(session_id).await?;
        let board = self.round_board(&session).await?;
        let index = session.question_index;
        let now = Utc::now();

        let outcome = self
            .store
            .update_session(session_id, |s| {
                if s.status != SessionStatus::InRound || s.question_index != index {
                    return Err(SessionError::Forbidden(
                        "the board is not open for answers".to_string(),
                    ));
                }
                let buzzer = s.buzzer_mut()?;
                let team = *buzzer
                    .team_mapping
                    .get(uid)
                    .ok_or_else(|| SessionError::Forbidden("you are not on a team".to_string()))?;
                if buzzer.active_team != Some(team) {
                    return Err(SessionError::Forbidden(
                        "it is the other team's turn".to_string(),
                    ));
                }

                match find_unrevealed(&board, &buzzer.revealed_answer_ids, text) {
                    Some(hit) => {
                        buzzer.revealed_answer_ids.push(hit.id.clone());
                        let round_complete =
                            buzzer.revealed_answer_ids.len() >= board.answers.len();
                        if round_complete {
                            resolve_round(s, &board, team, false, now)?;
                        }
                        Ok(TeamAnswerOutcome::Revealed {
                            answer_id: hit.id.clone(),
                            text: hit.text.clone(),
                            points: hit.points,
                            round_complete,
                        })
                    }
                    None => {
                        buzzer.strikes += 1;
                        let steal = buzzer.strikes >= MAX_STRIKES;
                        if steal {
                            buzzer.active_team = Some(team.other());
                            s.status = SessionStatus::Steal;
                        }
                        Ok(TeamAnswerOutcome::Strike {
                            strikes: s.buzzer()?.strikes,
                            steal,
                        })
                    }
                }
            })
            .await?;

        self.touch_player(uid).await;
        tracing::info!(
            "Team answer from {} in session {}: {:?}",
            uid,
            session_id,
            outcome
        );
        Ok(outcome)
    }

    /// The stealing team's single attempt at the pot
    pub async fn submit_steal(
        &self,
        session_id: &str,
        uid: &str,
        text: &str,
    ) -> SessionResult<StealOutcome> {
        let session = self.store.get_session(session_id).await?;
        let board = self.round_board(&session).await?;
        let index = session.question_index;
        let now = Utc::now();

        let outcome = self
            .store
            .update_session(session_id, |s| {
                if s.status != SessionStatus::Steal || s.question_index != index {
                    return Err(SessionError::Forbidden("there is nothing to steal".to_string()));
                }
                let buzzer = s.buzzer_mut()?;
                let team = buzzer.team_mapping.get(uid).copied();
                let stealing = buzzer
                    .active_team
                    .ok_or_else(|| SessionError::Forbidden("no team may steal".to_string()))?;
                if team != Some(stealing) {
                    return Err(SessionError::Forbidden(
                        "only the stealing team may answer".to_string(),
                    ));
                }

                let (awarded_team, success) =
                    match find_unrevealed(&board, &buzzer.revealed_answer_ids, text) {
                        Some(hit) => {
                            buzzer.revealed_answer_ids.push(hit.id.clone());
                            (stealing, true)
                        }
                        None => (stealing.other(), false),
                    };
                let points = resolve_round(s, &board, awarded_team, success, now)?;
                Ok(StealOutcome {
                    success,
                    awarded_team,
                    points,
                })
            })
            .await?;

        self.touch_player(uid).await;
        tracing::info!(
            "Steal attempt by {} in session {}: {:?}",
            uid,
            session_id,
            outcome
        );
        Ok(outcome)
    }

    /// Round timer ran out: the pot goes to the team that built it
    pub(crate) async fn settle_buzzer_round(
        &self,
        session: &Session,
    ) -> SessionResult<Option<Session>> {
        let board = self.round_board(session).await?;
        let index = session.question_index;
        let now = Utc::now();

        let result = self
            .store
            .update_session(&session.id, |s| {
                if s.question_index != index || !s.status.is_answer_window() {
                    return Err(SessionError::InvalidTransition {
                        action: "settle round",
                        status: s.status,
                    });
                }
                let active = s
                    .buzzer()?
                    .active_team
                    .unwrap_or_else(|| Team::for_round(index));
                // During a steal the active team is the challenger
                let builder = if s.status == SessionStatus::Steal {
                    active.other()
                } else {
                    active
                };
                resolve_round(s, &board, builder, false, now)
            })
            .await;

        let Some(points) = swallow_invalid(result)? else {
            return Ok(None);
        };
        tracing::info!(
            "Buzzer round {} of session {} timed out, pot {}",
            index,
            session.id,
            points
        );
        Ok(Some(self.store.get_session(&session.id).await?))
    }

    /// Next round, or finish after the last board
    pub async fn end_round(&self, session_id: &str, index: usize) -> SessionResult<Option<Session>> {
        let session = self.store.get_session(session_id).await?;
        if session.status != SessionStatus::RoundReveal || session.question_index != index {
            tracing::debug!(
                "Ignoring end of round {} for session {} while {:?}",
                index,
                session_id,
                session.status
            );
            return Ok(None);
        }
        self.next_round_or_finish(session_id, index).await
    }

    async fn round_board(&self, session: &Session) -> SessionResult<BuzzerBoard> {
        session.buzzer()?;
        match self.round_item(session).await? {
            ContentItem::Board(board) => Ok(board),
            other => Err(SessionError::InvalidInput(format!(
                "{} is not a buzzer board",
                other.id()
            ))),
        }
    }
}
