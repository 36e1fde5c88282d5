//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{display, player};

/// Macro to check display authorization and return early if unauthorized
macro_rules! check_display {
    ($role:expr, $action:expr) => {
        if *$role != Role::Display {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the display can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Roster messages
        ClientMessage::Join { display_name } => player::handle_join(state, display_name).await,

        ClientMessage::Rejoin { player_token } => player::handle_rejoin(state, player_token).await,

        ClientMessage::SetReady {
            player_token,
            ready,
        } => player::handle_set_ready(state, player_token, ready).await,

        ClientMessage::Heartbeat { player_token } => {
            player::handle_heartbeat(state, player_token).await
        }

        // Player game messages
        ClientMessage::SubmitAnswer {
            player_token,
            question_index,
            answer,
        } => player::handle_submit_answer(state, player_token, question_index, answer).await,

        ClientMessage::SubmitGuess {
            player_token,
            guess_id,
            text,
        } => player::handle_submit_guess(state, player_token, guess_id, text).await,

        ClientMessage::SubmitStrokes {
            player_token,
            seq,
            strokes,
        } => player::handle_submit_strokes(state, player_token, seq, strokes).await,

        ClientMessage::SubmitTeamAnswer { player_token, text } => {
            player::handle_submit_team_answer(state, player_token, text).await
        }

        ClientMessage::SubmitSteal { player_token, text } => {
            player::handle_submit_steal(state, player_token, text).await
        }

        ClientMessage::ClaimBingo { player_token } => {
            player::handle_claim_bingo(state, player_token).await
        }

        // Display-only commands (authorization checked before dispatch)
        ClientMessage::DisplayCreateSession {
            game,
            round_count,
            per_round_seconds,
            bingo_mode,
        } => {
            check_display!(role, "create sessions");
            display::handle_create_session(state, game, round_count, per_round_seconds, bingo_mode)
                .await
        }

        ClientMessage::DisplaySetTeams { teams } => {
            check_display!(role, "set teams");
            display::handle_set_teams(state, teams).await
        }

        ClientMessage::DisplayStartRound { index, seconds } => {
            check_display!(role, "start rounds");
            display::handle_start_round(state, index, seconds).await
        }

        ClientMessage::DisplayForceReveal => {
            check_display!(role, "reveal rounds");
            display::handle_force_reveal(state).await
        }

        ClientMessage::DisplayAdvance => {
            check_display!(role, "advance rounds");
            display::handle_advance(state).await
        }

        ClientMessage::DisplayFinish => {
            check_display!(role, "finish sessions");
            display::handle_finish(state).await
        }

        ClientMessage::DisplayDrawBall => {
            check_display!(role, "draw balls");
            display::handle_draw_ball(state).await
        }

        ClientMessage::DisplayContinueBingo => {
            check_display!(role, "continue bingo");
            display::handle_continue_bingo(state).await
        }

        ClientMessage::DisplayRemovePlayer { player_id } => {
            check_display!(role, "remove players");
            display::handle_remove_player(state, player_id).await
        }
    }
}
