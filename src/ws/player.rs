//! Player message handlers
//!
//! Handlers for roster messages and for the per-game submissions players make.

use crate::protocol::{PlayerInfo, ServerMessage};
use crate::state::AppState;
use crate::types::*;
use crate::ws::display::broadcast_roster_to_display;
use std::sync::Arc;

fn invalid_token() -> ServerMessage {
    ServerMessage::Error {
        code: "INVALID_PLAYER_TOKEN".to_string(),
        msg: "Unknown player token".to_string(),
    }
}

fn no_session() -> ServerMessage {
    ServerMessage::Error {
        code: "NOT_FOUND".to_string(),
        msg: "No session in progress".to_string(),
    }
}

/// Resolve the player and the session they are playing in
async fn player_and_session(
    state: &Arc<AppState>,
    player_token: &str,
) -> Result<(Player, SessionId), ServerMessage> {
    let player = state
        .get_player_by_token(player_token)
        .await
        .ok_or_else(invalid_token)?;
    let session_id = state.current_session_id().await.ok_or_else(no_session)?;
    Ok((player, session_id))
}

/// Bingo card for the current ball-draw session, if one is running
async fn current_card(state: &Arc<AppState>, uid: &str) -> Option<BingoCard> {
    let session = state.current_session().await?;
    if session.game != GameKind::BallDraw || session.status == SessionStatus::Finished {
        return None;
    }
    state.card_for(&session.id, uid).await.ok()
}

async fn player_state(state: &Arc<AppState>, player: Player) -> ServerMessage {
    let card = current_card(state, &player.id).await;
    ServerMessage::PlayerState { player, card }
}

pub async fn handle_join(
    state: &Arc<AppState>,
    display_name: Option<String>,
) -> Option<ServerMessage> {
    let player = state.join_player(display_name).await;
    state.broadcast_to_all(ServerMessage::PlayerJoined {
        player: PlayerInfo::from(&player),
    });
    broadcast_roster_to_display(state).await;
    Some(player_state(state, player).await)
}

pub async fn handle_rejoin(state: &Arc<AppState>, player_token: String) -> Option<ServerMessage> {
    match state.rejoin_player(&player_token).await {
        Some(player) => {
            tracing::info!("Player {} reconnected", player.id);
            broadcast_roster_to_display(state).await;
            Some(player_state(state, player).await)
        }
        None => Some(invalid_token()),
    }
}

pub async fn handle_set_ready(
    state: &Arc<AppState>,
    player_token: String,
    ready: bool,
) -> Option<ServerMessage> {
    let player = match state.get_player_by_token(&player_token).await {
        Some(p) => p,
        None => return Some(invalid_token()),
    };
    match state.set_ready(&player.id, ready).await {
        Ok(player) => {
            broadcast_roster_to_display(state).await;
            Some(player_state(state, player).await)
        }
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_heartbeat(state: &Arc<AppState>, player_token: String) -> Option<ServerMessage> {
    match state.get_player_by_token(&player_token).await {
        Some(player) => {
            state.touch_player(&player.id).await;
            None
        }
        None => Some(invalid_token()),
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    player_token: String,
    question_index: usize,
    answer: AnswerValue,
) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };

    match state
        .submit_answer(&session_id, &player.id, question_index, answer)
        .await
    {
        Ok(receipt) => Some(ServerMessage::AnswerAccepted {
            question_index: receipt.question_index,
            answered_count: receipt.answered_count,
            active_count: receipt.active_count,
        }),
        Err(e) => {
            tracing::warn!("Answer from {} rejected: {}", player.id, e);
            Some(e.into())
        }
    }
}

pub async fn handle_submit_guess(
    state: &Arc<AppState>,
    player_token: String,
    guess_id: Option<GuessId>,
    text: String,
) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };
    let guess_id = guess_id.unwrap_or_else(|| ulid::Ulid::new().to_string());

    match state
        .submit_guess(&session_id, &player.id, &guess_id, &text)
        .await
    {
        Ok(outcome) => {
            let (correct, won_round, duplicate) = match outcome {
                crate::state::GuessOutcome::Duplicate => (false, false, true),
                crate::state::GuessOutcome::Miss => (false, false, false),
                crate::state::GuessOutcome::Hit { won_round } => (true, won_round, false),
            };
            Some(ServerMessage::GuessResult {
                guess_id,
                correct,
                won_round,
                duplicate,
            })
        }
        Err(e) => {
            tracing::warn!("Guess from {} rejected: {}", player.id, e);
            Some(e.into())
        }
    }
}

pub async fn handle_submit_strokes(
    state: &Arc<AppState>,
    player_token: String,
    seq: u64,
    strokes: Vec<Stroke>,
) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };

    // Accepted snapshots reach clients through the store's change stream
    match state
        .submit_strokes(&session_id, &player.id, seq, strokes)
        .await
    {
        Ok(_) => None,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_submit_team_answer(
    state: &Arc<AppState>,
    player_token: String,
    text: String,
) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };

    match state
        .submit_team_answer(&session_id, &player.id, &text)
        .await
    {
        Ok(outcome) => Some(ServerMessage::TeamAnswerResult { outcome }),
        Err(e) => {
            tracing::warn!("Team answer from {} rejected: {}", player.id, e);
            Some(e.into())
        }
    }
}

pub async fn handle_submit_steal(
    state: &Arc<AppState>,
    player_token: String,
    text: String,
) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };

    match state.submit_steal(&session_id, &player.id, &text).await {
        Ok(outcome) => Some(ServerMessage::StealResult { outcome }),
        Err(e) => {
            tracing::warn!("Steal from {} rejected: {}", player.id, e);
            Some(e.into())
        }
    }
}

pub async fn handle_claim_bingo(state: &Arc<AppState>, player_token: String) -> Option<ServerMessage> {
    let (player, session_id) = match player_and_session(state, &player_token).await {
        Ok(resolved) => resolved,
        Err(msg) => return Some(msg),
    };

    match state.claim_bingo(&session_id, &player.id).await {
        Ok(outcome) => Some(ServerMessage::ClaimResult { outcome }),
        Err(e) => Some(e.into()),
    }
}
