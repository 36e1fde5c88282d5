use super::AppState;
use crate::content::ContentItem;
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use chrono::Utc;
use serde::Serialize;

/// Acknowledgement for an accepted answer
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub question_index: usize,
    pub answered_count: usize,
    pub active_count: usize,
}

impl AppState {
    /// Record a player's answer for the open question.
    ///
    /// Players may change their answer until the question closes; each
    /// call replaces the previous answer for the same question.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        uid: &str,
        question_index: usize,
        answer: AnswerValue,
    ) -> SessionResult<AnswerReceipt> {
        let session = self.store.get_session(session_id).await?;
        if !session.game.is_question_round() {
            return Err(SessionError::Forbidden(format!(
                "{} rounds do not take answers",
                session.game.as_str()
            )));
        }
        if session.status != SessionStatus::InGame || session.question_index != question_index {
            return Err(SessionError::Forbidden(format!(
                "question {} is not open for answers",
                question_index
            )));
        }

        let item = self.round_item(&session).await?;
        validate_answer(&item, &answer)?;

        self.include_late_player(session_id, uid).await?;
        self.store
            .upsert_answer(
                session_id,
                Answer {
                    uid: uid.to_string(),
                    question_index,
                    answer: Some(answer),
                    skipped: false,
                    submitted_at: Utc::now(),
                },
            )
            .await;
        self.touch_player(uid).await;

        let (answered_count, active_count) = self.answer_progress(session_id).await?;
        tracing::debug!(
            "Answer from {} for question {} ({}/{})",
            uid,
            question_index,
            answered_count,
            active_count
        );
        Ok(AnswerReceipt {
            question_index,
            answered_count,
            active_count,
        })
    }

    /// Backfill a skipped answer for every active player who has none.
    /// Existing answers are never overwritten. Returns how many were written.
    pub async fn ensure_skipped_answers(
        &self,
        session_id: &str,
        question_index: usize,
    ) -> SessionResult<usize> {
        let session = self.store.get_session(session_id).await?;
        let now = Utc::now();
        let mut written = 0;
        for uid in &session.active_player_uids {
            let skipped = Answer {
                uid: uid.clone(),
                question_index,
                answer: None,
                skipped: true,
                submitted_at: now,
            };
            if self.store.insert_answer_if_absent(session_id, skipped).await {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Answers from active players for the current question, and the active count
    pub async fn answer_progress(&self, session_id: &str) -> SessionResult<(usize, usize)> {
        let session = self.store.get_session(session_id).await?;
        let answered = self
            .store
            .answers_for(session_id, session.question_index)
            .await
            .iter()
            .filter(|a| session.is_active(&a.uid))
            .count();
        Ok((answered, session.active_player_uids.len()))
    }

    /// Count a player who submits while outside the active set
    pub(crate) async fn include_late_player(&self, session_id: &str, uid: &str) -> SessionResult<()> {
        let session = self.store.get_session(session_id).await?;
        if session.is_active(uid) {
            return Ok(());
        }

        let uid_owned = uid.to_string();
        self.store
            .update_session(session_id, |s| {
                s.add_active(&uid_owned);
                Ok(())
            })
            .await?;
        tracing::info!("Added late player {} to session {}", uid, session_id);
        Ok(())
    }

    /// Content item for the session's current round
    pub(crate) async fn round_item(&self, session: &Session) -> SessionResult<ContentItem> {
        let manifest = self.store.manifest(&session.id).await?;
        let content_id = manifest
            .content_ids
            .get(session.question_index)
            .ok_or_else(|| {
                SessionError::NotFound(format!(
                    "round {} of session {}",
                    session.question_index, session.id
                ))
            })?;
        self.content.resolve(content_id).await
    }
}

fn validate_answer(item: &ContentItem, answer: &AnswerValue) -> SessionResult<()> {
    match (item, answer) {
        (ContentItem::Quiz(q), AnswerValue::Choice(i)) if *i < q.choices.len() => Ok(()),
        (ContentItem::Poll(_), AnswerValue::Choice(i)) if *i < 2 => Ok(()),
        (ContentItem::Picture(_), AnswerValue::Text(text)) if !text.trim().is_empty() => Ok(()),
        _ => Err(SessionError::InvalidInput(format!(
            "answer {:?} does not fit {}",
            answer,
            item.id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    async fn open_quiz(state: &AppState, players: usize) -> (SessionId, Vec<PlayerId>) {
        let uids = ready_players(state, players).await;
        let id = state
            .create_session(GameKind::Quiz, 2, 20, BingoMode::First)
            .await
            .unwrap();
        state.start_round(&id, 0, None).await.unwrap();
        (id, uids)
    }

    #[tokio::test]
    async fn test_submit_answer_counts_progress() {
        let state = test_state();
        let (id, uids) = open_quiz(&state, 3).await;

        let receipt = state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(1))
            .await
            .unwrap();
        assert_eq!(receipt.answered_count, 1);
        assert_eq!(receipt.active_count, 3);
    }

    #[tokio::test]
    async fn test_changed_answer_replaces_previous() {
        let state = test_state();
        let (id, uids) = open_quiz(&state, 2).await;

        state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(0))
            .await
            .unwrap();
        let receipt = state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(3))
            .await
            .unwrap();
        assert_eq!(receipt.answered_count, 1);

        let answers = state.store.answers_for(&id, 0).await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, Some(AnswerValue::Choice(3)));
    }

    #[tokio::test]
    async fn test_answer_for_wrong_question_forbidden() {
        let state = test_state();
        let (id, uids) = open_quiz(&state, 1).await;

        let result = state
            .submit_answer(&id, &uids[0], 1, AnswerValue::Choice(0))
            .await;
        assert!(matches!(result, Err(SessionError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_answer_before_round_forbidden() {
        let state = test_state();
        let uids = ready_players(&state, 1).await;
        let id = state
            .create_session(GameKind::Quiz, 1, 20, BingoMode::First)
            .await
            .unwrap();

        let result = state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(0))
            .await;
        assert!(matches!(result, Err(SessionError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_choice_rejected() {
        let state = test_state();
        let (id, uids) = open_quiz(&state, 1).await;

        let result = state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(9))
            .await;
        assert!(matches!(result, Err(SessionError::InvalidInput(_))));
        assert!(state.store.answers_for(&id, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_late_player_joins_active_set() {
        let state = test_state();
        let (id, _) = open_quiz(&state, 2).await;
        let late = state.join_player(Some("Late".to_string())).await;

        let receipt = state
            .submit_answer(&id, &late.id, 0, AnswerValue::Choice(1))
            .await
            .unwrap();
        assert_eq!(receipt.active_count, 3);
        assert_eq!(receipt.answered_count, 1);

        let session = state.store.get_session(&id).await.unwrap();
        assert!(session.is_active(&late.id));
    }

    #[tokio::test]
    async fn test_backfill_skips_existing_answers() {
        let state = test_state();
        let (id, uids) = open_quiz(&state, 3).await;
        state
            .submit_answer(&id, &uids[0], 0, AnswerValue::Choice(1))
            .await
            .unwrap();

        assert_eq!(state.ensure_skipped_answers(&id, 0).await.unwrap(), 2);
        // Second backfill writes nothing
        assert_eq!(state.ensure_skipped_answers(&id, 0).await.unwrap(), 0);

        let answers = state.store.answers_for(&id, 0).await;
        assert_eq!(answers.len(), 3);
        let real = answers.iter().find(|a| a.uid == uids[0]).unwrap();
        assert!(!real.skipped);
        assert_eq!(real.answer, Some(AnswerValue::Choice(1)));
        assert_eq!(answers.iter().filter(|a| a.skipped).count(), 2);
    }

    #[tokio::test]
    async fn test_drawing_session_takes_no_answers() {
        let state = test_state();
        let uids = ready_players(&state, 2).await;
        let id = state
            .create_session(GameKind::DrawAndGuess, 1, 20, BingoMode::First)
            .await
            .unwrap();
        state.start_round(&id, 0, None).await.unwrap();

        let result = state
            .submit_answer(&id, &uids[1], 0, AnswerValue::Text("snowman".into()))
            .await;
        assert!(matches!(result, Err(SessionError::Forbidden(_))));
    }
}
