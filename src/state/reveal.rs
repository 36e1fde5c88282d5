//! Scoring of quiz, picture-guess and preference-poll rounds.
//!
//! [`score_question_round`] is pure: it turns a content item and the round's
//! answers into the reveal payload plus the awards to apply. The controller
//! runs it at most once per round key.

use super::score::{award_key, Award};
use super::{swallow_invalid, AppState, RoundKey};
use crate::content::ContentItem;
use crate::error::{SessionError, SessionResult};
use crate::fuzzy;
use crate::types::*;
use chrono::Utc;

/// Points for a correct quiz or picture answer
pub const CORRECT_ANSWER_POINTS: u32 = 10;

/// Poll splits within this many percentage points are "close"
const CLOSE_GAP: u32 = 10;
/// A poll side at or above this share is "dominant"
const DOMINANT_SHARE: u32 = 70;

#[derive(Debug, Clone, PartialEq)]
pub struct RoundScoring {
    pub reveal: RevealData,
    pub awards: Vec<Award>,
}

pub fn score_question_round(item: &ContentItem, answers: &[Answer]) -> SessionResult<RoundScoring> {
    let total = answers.len();
    match item {
        ContentItem::Quiz(question) => {
            let mut choice_counts = vec![0; question.choices.len()];
            let mut correct_uids = Vec::new();
            for answer in answers {
                if let Some(AnswerValue::Choice(choice)) = answer.answer {
                    if let Some(count) = choice_counts.get_mut(choice) {
                        *count += 1;
                    }
                    if choice == question.correct_index {
                        correct_uids.push(answer.uid.clone());
                    }
                }
            }
            Ok(RoundScoring {
                awards: correct_awards(&correct_uids),
                reveal: RevealData::Quiz {
                    correct_index: question.correct_index,
                    correct_count: correct_uids.len(),
                    total,
                    correct_uids,
                    choice_counts,
                },
            })
        }
        ContentItem::Picture(prompt) => {
            let accepted: Vec<String> = std::iter::once(&prompt.answer)
                .chain(&prompt.aliases)
                .map(|text| fuzzy::normalize(text))
                .collect();
            let correct_uids: Vec<PlayerId> = answers
                .iter()
                .filter(|answer| match &answer.answer {
                    Some(AnswerValue::Text(text)) => accepted.contains(&fuzzy::normalize(text)),
                    _ => false,
                })
                .map(|answer| answer.uid.clone())
                .collect();
            Ok(RoundScoring {
                awards: correct_awards(&correct_uids),
                reveal: RevealData::PictureGuess {
                    answer: prompt.answer.clone(),
                    correct_count: correct_uids.len(),
                    total,
                    correct_uids,
                },
            })
        }
        ContentItem::Poll(_) => {
            let votes_a = count_choice(answers, 0);
            let votes_b = count_choice(answers, 1);
            let (percent_a, percent_b) = poll_split(votes_a, votes_b);
            Ok(RoundScoring {
                awards: Vec::new(),
                reveal: RevealData::Poll {
                    votes_a,
                    votes_b,
                    percent_a,
                    percent_b,
                    commentary: poll_commentary(percent_a, percent_b, votes_a + votes_b),
                },
            })
        }
        other => Err(SessionError::InvalidInput(format!(
            "{} is not a question item",
            other.id()
        ))),
    }
}

fn correct_awards(uids: &[PlayerId]) -> Vec<Award> {
    uids.iter()
        .map(|uid| Award::new(uid.clone(), CORRECT_ANSWER_POINTS))
        .collect()
}

fn count_choice(answers: &[Answer], choice: usize) -> usize {
    answers
        .iter()
        .filter(|a| a.answer == Some(AnswerValue::Choice(choice)))
        .count()
}

/// Whole-number percentages that always sum to 100 when anyone voted
fn poll_split(votes_a: usize, votes_b: usize) -> (u32, u32) {
    let total = votes_a + votes_b;
    if total == 0 {
        return (0, 0);
    }
    let percent_a = ((votes_a as f64 * 100.0) / total as f64).round() as u32;
    (percent_a, 100 - percent_a)
}

pub fn poll_commentary(percent_a: u32, percent_b: u32, votes: usize) -> PollCommentary {
    if votes > 0 && percent_a.abs_diff(percent_b) <= CLOSE_GAP {
        PollCommentary::Close
    } else if percent_a >= DOMINANT_SHARE || percent_b >= DOMINANT_SHARE {
        PollCommentary::Dominant
    } else {
        PollCommentary::Mixed
    }
}

impl AppState {
    /// Backfill skips, score the round, enter reveal and apply awards
    pub(crate) async fn reveal_question_round(
        &self,
        session: &Session,
    ) -> SessionResult<Option<Session>> {
        let key = RoundKey::new(session);
        if !self.claim_reveal(key.clone()).await {
            tracing::debug!(
                "Round {} of session {} already revealed",
                session.question_index,
                session.id
            );
            return Ok(None);
        }

        let result = self.apply_question_reveal(session).await;
        if !matches!(result, Ok(Some(_))) {
            self.release_reveal(&key).await;
        }
        result
    }

    async fn apply_question_reveal(&self, session: &Session) -> SessionResult<Option<Session>> {
        let index = session.question_index;
        let item = self.round_item(session).await?;

        self.ensure_skipped_answers(&session.id, index).await?;
        let answers = self.store.answers_for(&session.id, index).await;
        let scoring = score_question_round(&item, &answers)?;

        let now = Utc::now();
        let reveal = scoring.reveal.clone();
        let committed = swallow_invalid(
            self.store
                .update_session(&session.id, |s| {
                    if !s.status.is_answer_window() || s.question_index != index {
                        return Err(SessionError::InvalidTransition {
                            action: "reveal",
                            status: s.status,
                        });
                    }
                    s.enter_reveal(reveal, now);
                    Ok(())
                })
                .await,
        )?;
        if committed.is_none() {
            return Ok(None);
        }

        let key = award_key(session.game, index);
        let applied = self.apply_awards(&session.id, &key, &scoring.awards).await;
        tracing::info!(
            "Revealed {} round {} of session {}: {} answers, {} awards",
            session.game.as_str(),
            index,
            session.id,
            answers.len(),
            applied
        );

        Ok(Some(self.store.get_session(&session.id).await?))
    }
}
