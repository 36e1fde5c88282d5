use super::score::{award_key, Award};
use super::{swallow_invalid, AppState, RoundKey};
use crate::content::{ContentItem, DrawingPrompt};
use crate::error::{SessionError, SessionResult};
use crate::fuzzy;
use crate::types::*;
use chrono::Utc;

/// Points for the first correct guesser
pub const GUESSER_POINTS: u32 = 15;
/// Points for the drawer when someone guesses correctly
pub const DRAWER_POINTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// This guess id was already processed
    Duplicate,
    Miss,
    /// Correct; `won_round` is false when someone else got there first
    Hit { won_round: bool },
}

impl AppState {
    /// Replace the live canvas with the drawer's latest snapshot.
    /// Returns false for stale sequence numbers.
    pub async fn submit_strokes(
        &self,
        session_id: &str,
        uid: &str,
        seq: u64,
        strokes: Vec<Stroke>,
    ) -> SessionResult<bool> {
        let session = self.store.get_session(session_id).await?;
        let drawing = session.drawing()?;
        if session.status != SessionStatus::InRound {
            return Err(SessionError::Forbidden("the canvas is closed".to_string()));
        }
        if drawing.drawer_uid.as_deref() != Some(uid) {
            return Err(SessionError::Forbidden("only the drawer can draw".to_string()));
        }

        self.touch_player(uid).await;
        Ok(self
            .store
            .replace_drawing(LiveDrawing {
                session_id: session_id.to_string(),
                round_index: session.question_index,
                seq,
                strokes,
            })
            .await)
    }

    /// Check a guess; the first correct one ends the round
    pub async fn submit_guess(
        &self,
        session_id: &str,
        uid: &str,
        guess_id: &str,
        text: &str,
    ) -> SessionResult<GuessOutcome> {
        let session = self.store.get_session(session_id).await?;
        let drawing = session.drawing()?;
        if session.status != SessionStatus::InRound {
            return Err(SessionError::Forbidden("guessing is closed".to_string()));
        }
        if drawing.drawer_uid.as_deref() == Some(uid) {
            return Err(SessionError::Forbidden("the drawer cannot guess".to_string()));
        }

        if !self
            .store
            .mark_guess_processed(session_id, session.question_index, guess_id)
            .await
        {
            tracing::debug!("Duplicate guess {} from {}", guess_id, uid);
            return Ok(GuessOutcome::Duplicate);
        }

        self.include_late_player(session_id, uid).await?;
        self.touch_player(uid).await;

        let prompt = self.round_prompt(&session).await?;
        let correct = fuzzy::matches_any(
            text,
            std::iter::once(prompt.answer.as_str()).chain(prompt.aliases.iter().map(String::as_str)),
        );
        self.store
            .record_guess(
                session_id,
                Guess {
                    id: guess_id.to_string(),
                    uid: uid.to_string(),
                    round_index: session.question_index,
                    text: text.to_string(),
                    correct,
                    submitted_at: Utc::now(),
                },
            )
            .await;

        if !correct {
            return Ok(GuessOutcome::Miss);
        }

        let won_round = self.award_correct_guess(&session, &prompt, uid).await?;
        Ok(GuessOutcome::Hit { won_round })
    }

    async fn award_correct_guess(
        &self,
        session: &Session,
        prompt: &DrawingPrompt,
        uid: &str,
    ) -> SessionResult<bool> {
        let key = RoundKey::new(session);
        if !self.claim_reveal(key.clone()).await {
            return Ok(false);
        }

        let index = session.question_index;
        let drawer = session.drawing()?.drawer_uid.clone();
        let reveal = RevealData::Drawing {
            correct_uid: Some(uid.to_string()),
            correct_name: self.display_name_of(uid).await,
            timed_out: false,
            answer: prompt.answer.clone(),
        };
        let now = Utc::now();

        let result = swallow_invalid(
            self.store
                .update_session(&session.id, |s| {
                    if s.status != SessionStatus::InRound || s.question_index != index {
                        return Err(SessionError::InvalidTransition {
                            action: "reveal drawing",
                            status: s.status,
                        });
                    }
                    s.enter_reveal(reveal, now);
                    Ok(())
                })
                .await,
        );
        match result {
            Ok(Some(())) => {}
            Ok(None) => {
                self.release_reveal(&key).await;
                return Ok(false);
            }
            Err(e) => {
                self.release_reveal(&key).await;
                return Err(e);
            }
        }

        let mut awards = vec![Award::new(uid, GUESSER_POINTS)];
        if let Some(drawer) = drawer {
            awards.push(Award::new(drawer, DRAWER_POINTS));
        }
        self.apply_awards(&session.id, &award_key(session.game, index), &awards)
            .await;

        tracing::info!(
            "{} guessed the drawing in round {} of session {}",
            uid,
            index,
            session.id
        );
        Ok(true)
    }

    /// Round timer ran out with nobody guessing correctly
    pub(crate) async fn reveal_drawing_timeout(
        &self,
        session: &Session,
    ) -> SessionResult<Option<Session>> {
        let key = RoundKey::new(session);
        if !self.claim_reveal(key.clone()).await {
            return Ok(None);
        }

        let prompt = match self.round_prompt(session).await {
            Ok(prompt) => prompt,
            Err(e) => {
                self.release_reveal(&key).await;
                return Err(e);
            }
        };
        let index = session.question_index;
        let now = Utc::now();
        let reveal = RevealData::Drawing {
            correct_uid: None,
            correct_name: None,
            timed_out: true,
            answer: prompt.answer,
        };

        let result = swallow_invalid(
            self.store
                .update_session(&session.id, |s| {
                    if s.status != SessionStatus::InRound || s.question_index != index {
                        return Err(SessionError::InvalidTransition {
                            action: "time out drawing",
                            status: s.status,
                        });
                    }
                    s.enter_reveal(reveal, now);
                    Ok(())
                })
                .await,
        );
        match result {
            Ok(Some(())) => {
                tracing::info!("Drawing round {} of session {} timed out", index, session.id);
                Ok(Some(self.store.get_session(&session.id).await?))
            }
            other => {
                self.release_reveal(&key).await;
                other.map(|_| None)
            }
        }
    }

    async fn round_prompt(&self, session: &Session) -> SessionResult<DrawingPrompt> {
        match self.round_item(session).await? {
            ContentItem::Drawing(prompt) => Ok(prompt),
            other => Err(SessionError::InvalidInput(format!(
                "{} is not a drawing prompt",
                other.id()
            ))),
        }
    }
}
