use crate::error::SessionError;
use crate::state::{ClaimOutcome, StealOutcome, TeamAnswerOutcome};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        display_name: Option<String>,
    },
    Rejoin {
        player_token: String,
    },
    SetReady {
        player_token: String,
        ready: bool,
    },
    Heartbeat {
        player_token: String,
    },
    SubmitAnswer {
        player_token: String,
        question_index: usize,
        answer: AnswerValue,
    },
    SubmitGuess {
        player_token: String,
        /// Client-generated id so redelivered guesses are recognized
        #[serde(default)]
        guess_id: Option<GuessId>,
        text: String,
    },
    SubmitStrokes {
        player_token: String,
        seq: u64,
        strokes: Vec<Stroke>,
    },
    SubmitTeamAnswer {
        player_token: String,
        text: String,
    },
    SubmitSteal {
        player_token: String,
        text: String,
    },
    ClaimBingo {
        player_token: String,
    },
    // Display-only messages
    DisplayCreateSession {
        game: GameKind,
        #[serde(default)]
        round_count: Option<usize>,
        #[serde(default)]
        per_round_seconds: Option<u32>,
        #[serde(default)]
        bingo_mode: Option<BingoMode>,
    },
    DisplaySetTeams {
        teams: HashMap<PlayerId, Team>,
    },
    DisplayStartRound {
        index: usize,
        #[serde(default)]
        seconds: Option<u32>,
    },
    DisplayForceReveal,
    DisplayAdvance,
    DisplayFinish,
    DisplayDrawBall,
    DisplayContinueBingo,
    DisplayRemovePlayer {
        player_id: PlayerId,
    },
}

/// Public view of a player (never carries the reconnect token)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub display_name: String,
    pub ready: bool,
    pub connected: bool,
}

impl From<&Player> for PlayerInfo {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            display_name: player.display_name.clone(),
            ready: player.ready,
            connected: player.connected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        session: Option<Session>,
        server_now: String,
    },
    SessionState {
        session: Session,
    },
    PlayerJoined {
        player: PlayerInfo,
    },
    /// Private to one player: includes the reconnect token
    PlayerState {
        player: Player,
        card: Option<BingoCard>,
    },
    Roster {
        players: Vec<PlayerInfo>,
    },
    AnswerAccepted {
        question_index: usize,
        answered_count: usize,
        active_count: usize,
    },
    GuessResult {
        guess_id: GuessId,
        correct: bool,
        won_round: bool,
        duplicate: bool,
    },
    TeamAnswerResult {
        outcome: TeamAnswerOutcome,
    },
    StealResult {
        outcome: StealOutcome,
    },
    ClaimResult {
        outcome: ClaimOutcome,
    },
    BallDrawn {
        ball: u8,
        drawn_balls: Vec<u8>,
    },
    LiveDrawing {
        drawing: LiveDrawing,
    },
    Scores {
        session_id: SessionId,
        scores: Vec<ScoreEntry>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl From<SessionError> for ServerMessage {
    fn from(err: SessionError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"t": "submit_answer", "player_token": "ABCDE", "question_index": 2, "answer": 1}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::SubmitAnswer {
                question_index,
                answer,
                ..
            } => {
                assert_eq!(question_index, 2);
                assert_eq!(answer, AnswerValue::Choice(1));
            }
            other => panic!("Expected submit_answer, got {:?}", other),
        }

        let msg: ClientMessage =
            serde_json::from_str(r#"{"t": "display_create_session", "game": "ball-draw"}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::DisplayCreateSession {
                game: GameKind::BallDraw,
                round_count: None,
                ..
            }
        ));
    }

    #[test]
    fn test_error_from_session_error() {
        let msg = ServerMessage::from(SessionError::Exhausted);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "error");
        assert_eq!(json["code"], "EXHAUSTED");
    }
}
