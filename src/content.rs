//! Content catalogs for every game type.
//!
//! A [`ContentPool`] hands out ordered, duplicate-free selections of item ids
//! for a game and resolves ids back to items. The bundled
//! [`StaticContentPool`] is backed by a JSON catalog or the built-in set.

use async_trait::async_trait;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{SessionError, SessionResult};
use crate::types::{ContentId, GameKind};

/// Errors that can occur while loading a content catalog
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to read content catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse content catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate content id: {0}")]
    DuplicateId(ContentId),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub id: ContentId,
    pub question: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PicturePrompt {
    pub id: ContentId,
    pub image_url: String,
    pub answer: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollQuestion {
    pub id: ContentId,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawingPrompt {
    pub id: ContentId,
    pub answer: String,
    /// Alternative spellings and translations
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// One answer on a team-buzzer board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardAnswer {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub points: u32,
}

/// Team-buzzer board; answers are ordered by descending popularity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuzzerBoard {
    pub id: ContentId,
    pub question: String,
    pub answers: Vec<BoardAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Quiz(QuizQuestion),
    Picture(PicturePrompt),
    Poll(PollQuestion),
    Drawing(DrawingPrompt),
    Board(BuzzerBoard),
}

impl ContentItem {
    pub fn id(&self) -> &str {
        match self {
            ContentItem::Quiz(q) => &q.id,
            ContentItem::Picture(p) => &p.id,
            ContentItem::Poll(p) => &p.id,
            ContentItem::Drawing(d) => &d.id,
            ContentItem::Board(b) => &b.id,
        }
    }

    pub fn game(&self) -> GameKind {
        match self {
            ContentItem::Quiz(_) => GameKind::Quiz,
            ContentItem::Picture(_) => GameKind::PictureGuess,
            ContentItem::Poll(_) => GameKind::PreferencePoll,
            ContentItem::Drawing(_) => GameKind::DrawAndGuess,
            ContentItem::Board(_) => GameKind::TeamBuzzer,
        }
    }
}

/// Source of round content, addressed by stable id
#[async_trait]
pub trait ContentPool: Send + Sync {
    /// Pick `count` distinct item ids for `game`
    async fn sample(&self, game: GameKind, count: usize) -> SessionResult<Vec<ContentId>>;

    /// Look up an item by id
    async fn resolve(&self, id: &str) -> SessionResult<ContentItem>;
}

/// In-memory catalog loaded once at startup
#[derive(Debug, Clone)]
pub struct StaticContentPool {
    items: Vec<ContentItem>,
}

impl StaticContentPool {
    pub fn new(items: Vec<ContentItem>) -> Result<Self, ContentError> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id().to_string()) {
                return Err(ContentError::DuplicateId(item.id().to_string()));
            }
        }
        Ok(Self { items })
    }

    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let items: Vec<ContentItem> = serde_json::from_str(json)?;
        Self::new(items)
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Small catalog shipped with the binary
    pub fn builtin() -> Self {
        Self {
            items: builtin_items(),
        }
    }

    pub fn count(&self, game: GameKind) -> usize {
        self.items.iter().filter(|item| item.game() == game).count()
    }
}

#[async_trait]
impl ContentPool for StaticContentPool {
    async fn sample(&self, game: GameKind, count: usize) -> SessionResult<Vec<ContentId>> {
        let ids: Vec<&str> = self
            .items
            .iter()
            .filter(|item| item.game() == game)
            .map(|item| item.id())
            .collect();

        if count > ids.len() {
            return Err(SessionError::InsufficientContent {
                game,
                requested: count,
                available: ids.len(),
            });
        }

        let picked = index::sample(&mut rand::rng(), ids.len(), count);
        Ok(picked.into_iter().map(|i| ids[i].to_string()).collect())
    }

    async fn resolve(&self, id: &str) -> SessionResult<ContentItem> {
        self.items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("content {}", id)))
    }
}

fn quiz(id: &str, question: &str, choices: &[&str], correct_index: usize) -> ContentItem {
    ContentItem::Quiz(QuizQuestion {
        id: id.to_string(),
        question: question.to_string(),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        correct_index,
    })
}

fn picture(id: &str, image_url: &str, answer: &str, aliases: &[&str]) -> ContentItem {
    ContentItem::Picture(PicturePrompt {
        id: id.to_string(),
        image_url: image_url.to_string(),
        answer: answer.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    })
}

fn poll(id: &str, question: &str, option_a: &str, option_b: &str) -> ContentItem {
    ContentItem::Poll(PollQuestion {
        id: id.to_string(),
        question: question.to_string(),
        option_a: option_a.to_string(),
        option_b: option_b.to_string(),
    })
}

fn drawing(id: &str, answer: &str, aliases: &[&str]) -> ContentItem {
    ContentItem::Drawing(DrawingPrompt {
        id: id.to_string(),
        answer: answer.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    })
}

fn board(id: &str, question: &str, answers: &[(&str, u32)]) -> ContentItem {
    ContentItem::Board(BuzzerBoard {
        id: id.to_string(),
        question: question.to_string(),
        answers: answers
            .iter()
            .enumerate()
            .map(|(i, (text, points))| BoardAnswer {
                id: format!("{}-{}", id, i + 1),
                text: text.to_string(),
                aliases: Vec::new(),
                points: *points,
            })
            .collect(),
    })
}

fn builtin_items() -> Vec<ContentItem> {
    vec![
        quiz("quiz-1", "How many reindeer pull Santa's sleigh?", &["6", "8", "9", "12"], 2),
        quiz("quiz-2", "Which country started the Christmas tree tradition?", &["Germany", "Norway", "England", "USA"], 0),
        quiz("quiz-3", "What colour is the Grinch?", &["Red", "Blue", "Green", "Purple"], 2),
        quiz("quiz-4", "In which month is Hanukkah usually celebrated?", &["October", "December", "February", "June"], 1),
        quiz("quiz-5", "What is the name of the snowman in Frozen?", &["Sven", "Kristoff", "Olaf", "Hans"], 2),
        quiz("quiz-6", "Which plant is traditionally kissed under?", &["Holly", "Ivy", "Mistletoe", "Fir"], 2),
        picture("pic-1", "/img/eiffel-tower.jpg", "Eiffel Tower", &["Tour Eiffel"]),
        picture("pic-2", "/img/big-ben.jpg", "Big Ben", &["Elizabeth Tower"]),
        picture("pic-3", "/img/colosseum.jpg", "Colosseum", &["Colosseo", "Coliseum"]),
        picture("pic-4", "/img/statue-of-liberty.jpg", "Statue of Liberty", &["Lady Liberty"]),
        picture("pic-5", "/img/sydney-opera-house.jpg", "Sydney Opera House", &["Opera House"]),
        poll("poll-1", "Real tree or artificial tree?", "Real", "Artificial"),
        poll("poll-2", "Open presents on Christmas Eve or Christmas morning?", "Eve", "Morning"),
        poll("poll-3", "Mince pies or Christmas pudding?", "Mince pies", "Pudding"),
        poll("poll-4", "White lights or coloured lights?", "White", "Coloured"),
        poll("poll-5", "Skiing or a beach holiday?", "Skiing", "Beach"),
        drawing("draw-1", "Snowman", &["Schneemann", "Bonhomme de neige"]),
        drawing("draw-2", "Christmas tree", &["Tannenbaum", "Sapin de Noël"]),
        drawing("draw-3", "Reindeer", &["Rentier", "Renne"]),
        drawing("draw-4", "Santa", &["Weihnachtsmann", "Père Noël"]),
        drawing("draw-5", "Candle", &["Kerze", "Bougie"]),
        drawing("draw-6", "Gingerbread house", &["Lebkuchenhaus"]),
        board("board-1", "Name something people hang on a Christmas tree", &[("Baubles", 35), ("Lights", 25), ("Tinsel", 15), ("Star", 10), ("Candy canes", 8), ("Angel", 7)]),
        board("board-2", "Name a popular Christmas film", &[("Home Alone", 32), ("Elf", 24), ("Love Actually", 18), ("The Grinch", 14), ("Die Hard", 12)]),
        board("board-3", "Name something you eat at Christmas dinner", &[("Turkey", 40), ("Potatoes", 20), ("Sprouts", 15), ("Stuffing", 10), ("Carrots", 8), ("Gravy", 7)]),
        board("board-4", "Name a winter sport", &[("Skiing", 38), ("Snowboarding", 26), ("Ice skating", 18), ("Hockey", 10), ("Sledding", 8)]),
    ]
}
