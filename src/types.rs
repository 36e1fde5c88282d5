use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::content::BoardAnswer;
use crate::error::{SessionError, SessionResult};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type PlayerId = String;
pub type ContentId = String;
pub type AnswerId = String;
pub type GuessId = String;

/// Highest ball number in a ball-draw session
pub const BALL_COUNT: u8 = 75;

/// Live drawings keep only the most recent segments
pub const MAX_LIVE_STROKES: usize = 1500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    Quiz,
    PictureGuess,
    PreferencePoll,
    DrawAndGuess,
    TeamBuzzer,
    BallDraw,
}

impl GameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Quiz => "quiz",
            GameKind::PictureGuess => "picture-guess",
            GameKind::PreferencePoll => "preference-poll",
            GameKind::DrawAndGuess => "draw-and-guess",
            GameKind::TeamBuzzer => "team-buzzer",
            GameKind::BallDraw => "ball-draw",
        }
    }

    /// Quiz-family games share the generic answer/reveal round
    pub fn is_question_round(self) -> bool {
        matches!(
            self,
            GameKind::Quiz | GameKind::PictureGuess | GameKind::PreferencePoll
        )
    }

    /// Status a session sits in while answers are being collected
    pub fn round_status(self) -> SessionStatus {
        match self {
            GameKind::Quiz
            | GameKind::PictureGuess
            | GameKind::PreferencePoll
            | GameKind::BallDraw => SessionStatus::InGame,
            GameKind::DrawAndGuess | GameKind::TeamBuzzer => SessionStatus::InRound,
        }
    }

    /// Status a session sits in once a round has been scored
    pub fn reveal_status(self) -> SessionStatus {
        match self {
            GameKind::Quiz
            | GameKind::PictureGuess
            | GameKind::PreferencePoll
            | GameKind::DrawAndGuess => SessionStatus::Reveal,
            GameKind::TeamBuzzer => SessionStatus::RoundReveal,
            GameKind::BallDraw => SessionStatus::Claiming,
        }
    }

    /// Status a freshly created session starts in
    pub fn initial_status(self) -> SessionStatus {
        match self {
            GameKind::TeamBuzzer => SessionStatus::TeamSetup,
            _ => SessionStatus::Intro,
        }
    }

    /// Whether `status` is part of this game's state machine
    pub fn allows(self, status: SessionStatus) -> bool {
        use SessionStatus::*;
        match status {
            Intro | Finished => true,
            TeamSetup | Steal => self == GameKind::TeamBuzzer,
            _ => status == self.round_status() || status == self.reveal_status(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Intro,
    TeamSetup,
    InGame,
    InRound,
    Steal,
    Reveal,
    RoundReveal,
    Claiming,
    Finished,
}

impl SessionStatus {
    /// Statuses during which `reveal_data` is populated
    pub fn is_reveal_class(self) -> bool {
        matches!(
            self,
            SessionStatus::Reveal | SessionStatus::RoundReveal | SessionStatus::Claiming
        )
    }

    /// Statuses during which players are submitting for the current round
    pub fn is_answer_window(self) -> bool {
        matches!(
            self,
            SessionStatus::InGame | SessionStatus::InRound | SessionStatus::Steal
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub fn other(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    /// Even rounds open with team A, odd rounds with team B
    pub fn for_round(index: usize) -> Team {
        if index % 2 == 0 {
            Team::A
        } else {
            Team::B
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamScores {
    pub a: u32,
    pub b: u32,
}

impl TeamScores {
    pub fn add(&mut self, team: Team, points: u32) {
        match team {
            Team::A => self.a += points,
            Team::B => self.b += points,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BingoMode {
    /// Stop at the first winner unless the display chooses to continue
    #[default]
    First,
    /// Keep drawing until three winners are recorded
    Top3,
}

impl BingoMode {
    pub fn capacity(self) -> usize {
        match self {
            BingoMode::First => 1,
            BingoMode::Top3 => 3,
        }
    }
}

/// Team-buzzer round state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuzzerState {
    pub team_mapping: HashMap<PlayerId, Team>,
    pub active_team: Option<Team>,
    pub strikes: u8,
    pub revealed_answer_ids: Vec<AnswerId>,
    pub team_scores: TeamScores,
}

/// Draw-and-guess round state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DrawingState {
    pub drawer_uid: Option<PlayerId>,
    pub previous_drawer_uid: Option<PlayerId>,
}

/// Ball-draw state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BingoState {
    pub drawn_balls: Vec<u8>,
    pub bingo_winners: Vec<PlayerId>,
    pub bingo_mode: BingoMode,
}

/// Game-specific part of a session document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameState {
    Questions,
    Drawing(DrawingState),
    Buzzer(BuzzerState),
    Bingo(BingoState),
}

impl GameState {
    pub fn for_game(game: GameKind, bingo_mode: BingoMode) -> Self {
        match game {
            GameKind::Quiz | GameKind::PictureGuess | GameKind::PreferencePoll => {
                GameState::Questions
            }
            GameKind::DrawAndGuess => GameState::Drawing(DrawingState::default()),
            GameKind::TeamBuzzer => GameState::Buzzer(BuzzerState::default()),
            GameKind::BallDraw => GameState::Bingo(BingoState {
                bingo_mode,
                ..BingoState::default()
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub game: GameKind,
    pub status: SessionStatus,
    /// Bumped on every committed write
    pub version: u64,
    pub question_index: usize,
    pub per_round_seconds: u32,
    /// Insertion ordered; no duplicates
    pub active_player_uids: Vec<PlayerId>,
    pub question_started_at: Option<DateTime<Utc>>,
    pub question_ends_at: Option<DateTime<Utc>>,
    pub reveal_started_at: Option<DateTime<Utc>>,
    pub reveal_data: Option<RevealData>,
    pub created_at: DateTime<Utc>,
    pub state: GameState,
}

impl Session {
    pub fn is_active(&self, uid: &str) -> bool {
        self.active_player_uids.iter().any(|p| p == uid)
    }

    /// Add a player to the active set, returning false if already present
    pub fn add_active(&mut self, uid: &str) -> bool {
        if self.is_active(uid) {
            return false;
        }
        self.active_player_uids.push(uid.to_string());
        true
    }

    /// Enter this game's reveal-class status with the computed payload
    pub fn enter_reveal(&mut self, data: RevealData, now: DateTime<Utc>) {
        self.status = self.game.reveal_status();
        self.reveal_data = Some(data);
        self.reveal_started_at = Some(now);
    }

    pub fn drawing(&self) -> SessionResult<&DrawingState> {
        match &self.state {
            GameState::Drawing(d) => Ok(d),
            _ => Err(self.wrong_game("draw-and-guess")),
        }
    }

    pub fn drawing_mut(&mut self) -> SessionResult<&mut DrawingState> {
        let err = self.wrong_game("draw-and-guess");
        match &mut self.state {
            GameState::Drawing(d) => Ok(d),
            _ => Err(err),
        }
    }

    pub fn buzzer(&self) -> SessionResult<&BuzzerState> {
        match &self.state {
            GameState::Buzzer(b) => Ok(b),
            _ => Err(self.wrong_game("team-buzzer")),
        }
    }

    pub fn buzzer_mut(&mut self) -> SessionResult<&mut BuzzerState> {
        let err = self.wrong_game("team-buzzer");
        match &mut self.state {
            GameState::Buzzer(b) => Ok(b),
            _ => Err(err),
        }
    }

    pub fn bingo(&self) -> SessionResult<&BingoState> {
        match &self.state {
            GameState::Bingo(b) => Ok(b),
            _ => Err(self.wrong_game("ball-draw")),
        }
    }

    pub fn bingo_mut(&mut self) -> SessionResult<&mut BingoState> {
        let err = self.wrong_game("ball-draw");
        match &mut self.state {
            GameState::Bingo(b) => Ok(b),
            _ => Err(err),
        }
    }

    fn wrong_game(&self, expected: &str) -> SessionError {
        SessionError::Forbidden(format!(
            "session {} is a {} game, not {}",
            self.id,
            self.game.as_str(),
            expected
        ))
    }
}

/// Immutable list of content picked for a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionManifest {
    pub session_id: SessionId,
    pub game: GameKind,
    pub content_ids: Vec<ContentId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(usize),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub uid: PlayerId,
    pub question_index: usize,
    pub answer: Option<AnswerValue>,
    pub skipped: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    pub uid: PlayerId,
    pub score: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollCommentary {
    Close,
    Dominant,
    Mixed,
}

/// Game-specific result of a round, computed once at reveal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevealData {
    Quiz {
        correct_index: usize,
        correct_count: usize,
        total: usize,
        correct_uids: Vec<PlayerId>,
        choice_counts: Vec<usize>,
    },
    PictureGuess {
        answer: String,
        correct_count: usize,
        total: usize,
        correct_uids: Vec<PlayerId>,
    },
    Poll {
        votes_a: usize,
        votes_b: usize,
        percent_a: u32,
        percent_b: u32,
        commentary: PollCommentary,
    },
    Drawing {
        correct_uid: Option<PlayerId>,
        correct_name: Option<String>,
        timed_out: bool,
        answer: String,
    },
    Buzzer {
        awarded_team: Team,
        points: u32,
        stolen: bool,
        board: Vec<BoardAnswer>,
    },
    Bingo {
        winner_uid: PlayerId,
        placement: usize,
        winners: Vec<PlayerId>,
    },
}

/// One segment of a live drawing, in normalized 0..1 coordinates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stroke {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub width: f32,
    pub color: String,
}

/// Latest authoritative snapshot of the drawer's canvas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveDrawing {
    pub session_id: SessionId,
    pub round_index: usize,
    pub seq: u64,
    pub strokes: Vec<Stroke>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guess {
    pub id: GuessId,
    pub uid: PlayerId,
    pub round_index: usize,
    pub text: String,
    pub correct: bool,
    pub submitted_at: DateTime<Utc>,
}

/// 5x5 bingo card; `0` marks the free centre square
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BingoCard {
    pub uid: PlayerId,
    pub cells: [[u8; 5]; 5],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingClaim {
    pub id: String,
    pub uid: PlayerId,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    /// Join order
    #[serde(default)]
    pub seq: u64,
    pub token: String,
    pub display_name: String,
    pub ready: bool,
    pub connected: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Display,
    Player,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_per_game() {
        assert!(GameKind::Quiz.allows(SessionStatus::InGame));
        assert!(GameKind::Quiz.allows(SessionStatus::Reveal));
        assert!(!GameKind::Quiz.allows(SessionStatus::Steal));
        assert!(!GameKind::Quiz.allows(SessionStatus::RoundReveal));

        assert!(GameKind::TeamBuzzer.allows(SessionStatus::TeamSetup));
        assert!(GameKind::TeamBuzzer.allows(SessionStatus::Steal));
        assert!(GameKind::TeamBuzzer.allows(SessionStatus::RoundReveal));
        assert!(!GameKind::TeamBuzzer.allows(SessionStatus::InGame));

        assert!(GameKind::BallDraw.allows(SessionStatus::Claiming));
        assert!(!GameKind::BallDraw.allows(SessionStatus::Reveal));
    }

    #[test]
    fn test_team_parity() {
        assert_eq!(Team::for_round(0), Team::A);
        assert_eq!(Team::for_round(1), Team::B);
        assert_eq!(Team::for_round(4), Team::A);
        assert_eq!(Team::A.other(), Team::B);
    }

    #[test]
    fn test_answer_value_wire_format() {
        let choice: AnswerValue = serde_json::from_str("2").unwrap();
        assert_eq!(choice, AnswerValue::Choice(2));

        let text: AnswerValue = serde_json::from_str("\"Eiffel Tower\"").unwrap();
        assert_eq!(text, AnswerValue::Text("Eiffel Tower".to_string()));
    }

    #[test]
    fn test_game_kind_wire_names() {
        let json = serde_json::to_string(&GameKind::DrawAndGuess).unwrap();
        assert_eq!(json, "\"draw-and-guess\"");
        assert_eq!(GameKind::DrawAndGuess.as_str(), "draw-and-guess");
    }
}
