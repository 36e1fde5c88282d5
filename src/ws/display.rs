//! Display-only command handlers
//!
//! All handlers in this module require the Display role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::error::{SessionError, SessionResult};
use crate::protocol::{PlayerInfo, ServerMessage};
use crate::state::AppState;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Broadcast the current roster to display clients
pub async fn broadcast_roster_to_display(state: &Arc<AppState>) {
    let players = state.list_players().await.iter().map(PlayerInfo::from).collect();
    state.broadcast_to_display(ServerMessage::Roster { players });
}

/// Map a controller result to a reply; swallowed transitions send nothing
fn session_reply(result: SessionResult<Option<Session>>) -> Option<ServerMessage> {
    match result {
        Ok(Some(session)) => Some(ServerMessage::SessionState { session }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Display command failed: {}", e);
            Some(e.into())
        }
    }
}

async fn current_session(state: &Arc<AppState>) -> Result<Session, ServerMessage> {
    state
        .current_session()
        .await
        .ok_or_else(|| SessionError::NotFound("no session in progress".to_string()).into())
}

pub async fn handle_create_session(
    state: &Arc<AppState>,
    game: GameKind,
    round_count: Option<usize>,
    per_round_seconds: Option<u32>,
    bingo_mode: Option<BingoMode>,
) -> Option<ServerMessage> {
    let round_count = round_count.unwrap_or(state.config.default_round_count);
    let seconds = per_round_seconds.unwrap_or(state.config.default_round_seconds);
    tracing::info!(
        "Display creating {} session ({} rounds, {}s)",
        game.as_str(),
        round_count,
        seconds
    );

    let result = match state
        .create_session(game, round_count, seconds, bingo_mode.unwrap_or_default())
        .await
    {
        Ok(id) => state.store.get_session(&id).await.map(Some),
        Err(e) => Err(e),
    };
    session_reply(result)
}

pub async fn handle_set_teams(
    state: &Arc<AppState>,
    teams: HashMap<PlayerId, Team>,
) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    session_reply(state.set_teams(&session.id, teams).await)
}

pub async fn handle_start_round(
    state: &Arc<AppState>,
    index: usize,
    seconds: Option<u32>,
) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    tracing::info!("Display starting round {} of {}", index, session.id);
    session_reply(state.start_round(&session.id, index, seconds).await)
}

pub async fn handle_force_reveal(state: &Arc<AppState>) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    session_reply(state.force_reveal(&session.id).await)
}

pub async fn handle_advance(state: &Arc<AppState>) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    tracing::info!("Display advancing {} from round {}", session.id, session.question_index);
    session_reply(state.advance(&session.id, session.question_index).await)
}

pub async fn handle_finish(state: &Arc<AppState>) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    tracing::info!("Display finishing {}", session.id);
    session_reply(state.finish(&session.id).await)
}

pub async fn handle_draw_ball(state: &Arc<AppState>) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    match state.draw_ball(&session.id).await {
        Ok(Some(drawn)) => {
            let msg = ServerMessage::BallDrawn {
                ball: drawn.ball,
                drawn_balls: drawn.drawn_balls,
            };
            state.broadcast_to_all(msg.clone());
            Some(msg)
        }
        Ok(None) => None,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_continue_bingo(state: &Arc<AppState>) -> Option<ServerMessage> {
    let session = match current_session(state).await {
        Ok(s) => s,
        Err(msg) => return Some(msg),
    };
    session_reply(state.continue_bingo(&session.id).await)
}

pub async fn handle_remove_player(
    state: &Arc<AppState>,
    player_id: PlayerId,
) -> Option<ServerMessage> {
    tracing::info!("Display removing player {}", player_id);
    match state.remove_player(&player_id).await {
        Ok(_) => {
            broadcast_roster_to_display(state).await;
            let players = state.list_players().await.iter().map(PlayerInfo::from).collect();
            Some(ServerMessage::Roster { players })
        }
        Err(e) => Some(e.into()),
    }
}
